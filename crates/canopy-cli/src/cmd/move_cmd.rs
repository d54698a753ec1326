//! `cnp move`: reparent an entity and rebuild the closure of its subtree.

use super::{open_store, parse_parent};
use crate::output::{OutputMode, render_item};
use anyhow::Result;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Entity id to move.
    pub id: String,

    /// New parent id. Use "--parent none" to make it a root.
    #[arg(long)]
    pub parent: String,
}

pub fn run_move(args: &MoveArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let new_parent = parse_parent(&args.parent);
    let entity = store.move_entity(&args.id, new_parent.as_deref())?;
    render_item(&entity, output)
}
