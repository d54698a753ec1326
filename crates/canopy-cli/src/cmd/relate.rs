//! Relation commands: `relate`, `unrelate`, `relation` (edit metadata) and
//! `related` (query by kind, tag and order).

use super::open_store;
use crate::output::{OutputMode, pretty_kv, render, render_list};
use anyhow::Result;
use canopy_core::db::query::{RelationOptions, related_by, relating};
use canopy_core::model::relation::{NewRelation, Relation, RelationPatch};
use clap::Args;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct RelateArgs {
    /// Entity the edge starts from.
    pub caller: String,

    /// Entity the edge points at.
    pub called: String,

    /// Relation kind, e.g. `medium` or `link`.
    #[arg(long, default_value = "relation")]
    pub kind: String,

    #[arg(long, default_value_t = 0)]
    pub position: i64,

    #[arg(long, default_value_t = 0)]
    pub depth: i64,

    /// Tag for the edge (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UnrelateArgs {
    pub relation_id: i64,
}

#[derive(Args, Debug)]
pub struct RelationEditArgs {
    pub relation_id: i64,

    #[arg(long)]
    pub position: Option<i64>,

    #[arg(long)]
    pub depth: Option<i64>,

    /// Replace the tags (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Remove all tags.
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,
}

#[derive(Args, Debug)]
pub struct RelatedArgs {
    pub id: String,

    /// Follow incoming edges (who points at `id`) instead of outgoing ones.
    #[arg(long)]
    pub incoming: bool,

    /// Restrict to these kinds (repeatable).
    #[arg(long = "kind")]
    pub kinds: Vec<String>,

    /// Drop these kinds (repeatable). Wins over `--kind`.
    #[arg(long = "except-kind")]
    pub except_kinds: Vec<String>,

    #[arg(long)]
    pub tag: Option<String>,

    /// `depth asc`, `position_desc`, ... Unrecognized values are ignored.
    #[arg(long)]
    pub order: Option<String>,

    /// Include edge metadata.
    #[arg(long)]
    pub meta: bool,
}

fn render_relation_human(relation: &Relation, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_kv(w, "Relation", relation.relation_id.to_string())?;
    pretty_kv(
        w,
        "Edge",
        format!(
            "{} -[{}]-> {}",
            relation.caller_entity_id, relation.kind, relation.called_entity_id
        ),
    )?;
    pretty_kv(w, "Position", relation.position.to_string())?;
    pretty_kv(w, "Depth", relation.depth.to_string())?;
    if !relation.tags.is_empty() {
        pretty_kv(w, "Tags", relation.tags.join(", "))?;
    }
    Ok(())
}

pub fn run_relate(args: &RelateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let new = NewRelation::new(&args.caller, &args.called)
        .kind(&args.kind)
        .position(args.position)
        .depth(args.depth)
        .tags(args.tags.iter().cloned());
    let relation = store.relate(&new)?;
    render(output, &relation, render_relation_human)
}

pub fn run_unrelate(args: &UnrelateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let relation = store.unrelate(args.relation_id)?;
    render(output, &relation, |r, w| {
        writeln!(
            w,
            "removed relation {} ({} -[{}]-> {})",
            r.relation_id, r.caller_entity_id, r.kind, r.called_entity_id
        )
    })
}

pub fn run_relation_edit(
    args: &RelationEditArgs,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let store = open_store(project_root)?;
    let tags = if args.clear_tags {
        Some(Vec::new())
    } else if args.tags.is_empty() {
        None
    } else {
        Some(args.tags.clone())
    };
    let patch = RelationPatch {
        position: args.position,
        depth: args.depth,
        tags,
    };
    let relation = store.update_relation(args.relation_id, &patch)?;
    render(output, &relation, render_relation_human)
}

/// Translate CLI flags into [`RelationOptions`].
fn relation_options(args: &RelatedArgs) -> RelationOptions {
    let mut options = RelationOptions::new()
        .kinds(args.kinds.iter().cloned())
        .except_kinds(args.except_kinds.iter().cloned());
    if let Some(tag) = &args.tag {
        options = options.tagged(tag.clone());
    }
    if let Some(order) = &args.order {
        options = options.order_str(order);
    }
    if args.meta {
        options = options.with_meta();
    }
    options
}

pub fn run_related(args: &RelatedArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let options = relation_options(args);
    let rows = if args.incoming {
        relating(store.conn(), &args.id, &options)?
    } else {
        related_by(store.conn(), &args.id, &options)?
    };
    render_list(&rows, output)
}
