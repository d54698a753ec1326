//! `cnp list`: filter entities by model, parent, publication and contents.

use super::{open_store, parse_pairs};
use crate::output::{OutputMode, render_list};
use anyhow::Result;
use canopy_core::db::query::{ContentOp, Direction, EntityFilter};
use chrono::Utc;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Exact model match.
    #[arg(long)]
    pub model: Option<String>,

    /// Direct children of this entity.
    #[arg(long)]
    pub parent: Option<String>,

    /// Only entities that are live right now.
    #[arg(long)]
    pub live: bool,

    /// Content equality as `field=text` (repeatable).
    #[arg(long = "where")]
    pub where_eq: Vec<String>,

    /// Content LIKE pattern as `field=pattern` (repeatable).
    #[arg(long = "like")]
    pub where_like: Vec<String>,

    /// Order by the text of this content field.
    #[arg(long)]
    pub order_by: Option<String>,

    /// Direction for `--order-by`.
    #[arg(long, default_value = "asc")]
    pub direction: Direction,

    /// Language for content filters (default: any) and ordering (default:
    /// the store language).
    #[arg(long)]
    pub lang: Option<String>,

    /// Include soft-deleted entities.
    #[arg(long)]
    pub include_deleted: bool,

    #[arg(long)]
    pub limit: Option<u32>,

    #[arg(long)]
    pub offset: Option<u32>,
}

/// Translate CLI flags into an [`EntityFilter`].
fn build_filter(args: &ListArgs) -> Result<EntityFilter> {
    let lang = args.lang.as_deref();
    let mut filter = EntityFilter::new().include_deleted(args.include_deleted);
    if let Some(model) = &args.model {
        filter = filter.of_model(model.clone());
    }
    if let Some(parent) = &args.parent {
        filter = filter.child_of(parent.clone());
    }
    if args.live {
        filter = filter.currently_live(Utc::now());
    }
    for (field, value) in parse_pairs(&args.where_eq)? {
        filter = filter.where_content(field, ContentOp::Eq, value, lang);
    }
    for (field, value) in parse_pairs(&args.where_like)? {
        filter = filter.where_content(field, ContentOp::Like, value, lang);
    }
    if let Some(field) = &args.order_by {
        filter = filter.order_by_content(field.clone(), args.direction, lang);
    }
    if let Some(limit) = args.limit {
        filter = filter.limit(limit);
    }
    if let Some(offset) = args.offset {
        filter = filter.offset(offset);
    }
    Ok(filter)
}

pub fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let filter = build_filter(args)?;
    let entities = store.list(&filter)?;
    render_list(&entities, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ListArgs,
    }

    fn parse(argv: &[&str]) -> ListArgs {
        Wrapper::parse_from(std::iter::once("list").chain(argv.iter().copied())).args
    }

    #[test]
    fn content_flags_become_clauses() {
        let filter = build_filter(&parse(&[
            "--where",
            "title=Home",
            "--like",
            "slug=ho%",
            "--order-by",
            "title",
            "--direction",
            "desc",
            "--lang",
            "es",
        ]))
        .expect("filter");
        assert_eq!(filter.content_matches.len(), 2);
        assert_eq!(filter.content_matches[0].op, ContentOp::Eq);
        assert_eq!(filter.content_matches[1].lang.as_deref(), Some("es"));
        let order = filter.content_order.expect("order");
        assert_eq!(order.field, "title");
        assert_eq!(order.direction, Direction::Desc);
    }

    #[test]
    fn defaults_hide_deleted() {
        let filter = build_filter(&parse(&[])).expect("filter");
        assert!(!filter.include_deleted);
        assert!(filter.live_at.is_none());
        assert!(filter.limit.is_none());
    }
}
