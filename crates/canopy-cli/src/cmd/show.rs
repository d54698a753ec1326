//! `cnp show`: display one entity, optionally with its contents.

use super::open_store;
use crate::output::{OutputMode, Renderable, pretty_section, render};
use anyhow::Result;
use canopy_core::db::content::ContentFilter;
use canopy_core::model::entity::Entity;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Entity id.
    pub id: String,

    /// Include contents, grouped by language.
    #[arg(long)]
    pub with_contents: bool,

    /// Only contents in this language.
    #[arg(long)]
    pub lang: Option<String>,

    /// Also show soft-deleted entities.
    #[arg(long)]
    pub trashed: bool,
}

#[derive(Debug, Serialize)]
struct ShowItem {
    #[serde(flatten)]
    entity: Entity,
    #[serde(skip_serializing_if = "Option::is_none")]
    contents: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

fn render_show_human(item: &ShowItem, w: &mut dyn Write) -> std::io::Result<()> {
    item.entity.render_human(w)?;
    if let Some(contents) = &item.contents {
        pretty_section(w, "Contents")?;
        if contents.is_empty() {
            writeln!(w, "(none)")?;
        }
        for (lang, fields) in contents {
            for (field, text) in fields {
                writeln!(w, "[{lang}] {field}: {text}")?;
            }
        }
    }
    Ok(())
}

pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let entity = if args.trashed {
        store.find_with_trashed(&args.id)?
    } else {
        store.find(&args.id)?
    };

    let contents = if args.with_contents || args.lang.is_some() {
        let filter = ContentFilter {
            lang: args.lang.clone(),
            ..ContentFilter::default()
        };
        Some(store.contents(&entity.id, &filter)?.group_by_lang())
    } else {
        None
    };

    let item = ShowItem { entity, contents };
    render(output, &item, |item, w| {
        if output == OutputMode::Text {
            item.entity.render_row(w)
        } else {
            render_show_human(item, w)
        }
    })
}
