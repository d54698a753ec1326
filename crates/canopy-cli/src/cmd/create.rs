//! `cnp create`: create an entity, optionally under a parent and with contents.

use super::{open_store, parse_json_value, parse_optional_time, parse_pairs};
use crate::output::{OutputMode, render_item};
use anyhow::Result;
use canopy_core::model::entity::NewEntity;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Explicit id (truncated to the configured id length). Generated when omitted.
    #[arg(long)]
    pub id: Option<String>,

    /// Model discriminator, e.g. `Page` or `BlogPost`.
    #[arg(long)]
    pub model: Option<String>,

    /// Rendering hint. Defaults to the snake_case model name.
    #[arg(long)]
    pub view: Option<String>,

    /// Parent entity id.
    #[arg(long)]
    pub parent: Option<String>,

    /// Props as a JSON object.
    #[arg(long)]
    pub props: Option<String>,

    /// Languages this entity is available in (repeatable).
    #[arg(long = "available-lang")]
    pub langs: Vec<String>,

    /// Create unpublished, with no publish date.
    #[arg(long, conflicts_with_all = ["publish_at", "unpublish_at"])]
    pub draft: bool,

    /// Publish date (RFC 3339, or `none`). Defaults to now.
    #[arg(long)]
    pub publish_at: Option<String>,

    /// Unpublish date (RFC 3339).
    #[arg(long)]
    pub unpublish_at: Option<String>,

    /// Content field as `field=text` (repeatable).
    #[arg(long = "content")]
    pub contents: Vec<String>,

    /// Language of `--content` values. Defaults to the configured language.
    #[arg(long)]
    pub lang: Option<String>,

    /// Author recorded in `created_by`.
    #[arg(long)]
    pub by: Option<String>,
}

/// Translate CLI flags into a [`NewEntity`].
fn build_new_entity(args: &CreateArgs) -> Result<NewEntity> {
    let mut new = NewEntity::new();
    if let Some(id) = &args.id {
        new = new.with_id(id.clone());
    }
    if let Some(model) = &args.model {
        new = new.model(model.clone());
    }
    if let Some(view) = &args.view {
        new = new.view(view.clone());
    }
    if let Some(parent) = &args.parent {
        new = new.child_of(parent.clone());
    }
    if let Some(props) = &args.props {
        let value = parse_json_value(props);
        if !value.is_object() {
            anyhow::bail!("--props must be a JSON object");
        }
        new = new.props(value);
    }
    if !args.langs.is_empty() {
        new = new.langs(args.langs.iter().cloned());
    }
    if args.draft {
        new = new.draft();
    }
    if let Some(raw) = &args.publish_at {
        new = new.publish_at(parse_optional_time(raw)?);
    }
    if let Some(raw) = &args.unpublish_at {
        new = new.unpublish_at(parse_optional_time(raw)?);
    }
    if let Some(by) = &args.by {
        new = new.created_by(by.clone());
    }
    Ok(new)
}

pub fn run_create(args: &CreateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let new = build_new_entity(args)?;

    let entity = if args.contents.is_empty() {
        store.create(new)?
    } else {
        let fields = parse_pairs(&args.contents)?;
        store.create_with_contents(new, fields, args.lang.as_deref())?
    };

    render_item(&entity, output)
}
