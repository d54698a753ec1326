//! `cnp update`: patch entity attributes and props.

use super::{open_store, parse_json_value, parse_optional_time, parse_pairs};
use crate::output::{OutputMode, render_item};
use anyhow::Result;
use canopy_core::model::entity::EntityPatch;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Entity id.
    pub id: String,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub view: Option<String>,

    /// Replace all props with this JSON object.
    #[arg(long)]
    pub props: Option<String>,

    /// Set one prop as `path=json` (repeatable); paths use `.` or `->`.
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Replace the available languages (repeatable).
    #[arg(long = "available-lang")]
    pub langs: Vec<String>,

    #[arg(long)]
    pub published: Option<bool>,

    /// Publish date (RFC 3339, or `none` to clear).
    #[arg(long)]
    pub publish_at: Option<String>,

    /// Unpublish date (RFC 3339, or `none` to clear).
    #[arg(long)]
    pub unpublish_at: Option<String>,

    /// Author recorded in `updated_by`.
    #[arg(long)]
    pub by: Option<String>,
}

pub fn run_update(args: &UpdateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;

    let mut props = match &args.props {
        Some(raw) => {
            let value = parse_json_value(raw);
            if !value.is_object() {
                anyhow::bail!("--props must be a JSON object");
            }
            Some(value)
        }
        None => None,
    };
    if !args.set.is_empty() {
        let mut current = store.find(&args.id)?;
        if let Some(replacement) = props.take() {
            current.props = replacement;
        }
        for (path, raw) in parse_pairs(&args.set)? {
            current.set_prop(&path, parse_json_value(&raw));
        }
        props = Some(current.props);
    }

    let patch = EntityPatch {
        model: args.model.clone(),
        view: args.view.clone(),
        props,
        langs: (!args.langs.is_empty()).then(|| args.langs.clone()),
        parent_entity_id: None,
        published: args.published,
        publish_at: args.publish_at.as_deref().map(parse_optional_time).transpose()?,
        unpublish_at: args
            .unpublish_at
            .as_deref()
            .map(parse_optional_time)
            .transpose()?,
        updated_by: args.by.clone(),
    };

    let entity = store.update(&args.id, &patch)?;
    render_item(&entity, output)
}
