//! `cnp delete` / `cnp restore`.

use super::open_store;
use crate::output::{OutputMode, render_item};
use anyhow::Result;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Entity id.
    pub id: String,

    /// Remove the row for good. Children become roots.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Entity id.
    pub id: String,
}

pub fn run_delete(args: &DeleteArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let entity = if args.force {
        store.force_delete(&args.id)?
    } else {
        store.delete(&args.id)?
    };
    render_item(&entity, output)
}

pub fn run_restore(args: &RestoreArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let entity = store.restore(&args.id)?;
    render_item(&entity, output)
}
