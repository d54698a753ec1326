//! Hierarchy reads: `ancestors`, `descendants`, `children`, `siblings`,
//! `root` and `tree`.

use super::open_store;
use crate::output::{OutputMode, Renderable, render, render_list, write_tree};
use anyhow::Result;
use canopy_core::db::query::Direction;
use canopy_core::graph::hierarchy::{
    self, AncestorOptions, DEFAULT_MAX_DEPTH, DescendantOptions, SiblingOptions,
};
use canopy_core::graph::tree::build_tree;
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct AncestorsArgs {
    pub id: String,

    /// Include the entity itself as a depth-0 row.
    #[arg(long)]
    pub include_self: bool,

    /// Include edge metadata (kind, depth, position, tags).
    #[arg(long)]
    pub meta: bool,

    /// Order by depth: `asc` (parent first) or `desc` (root first).
    #[arg(long, default_value = "asc")]
    pub order: Direction,
}

#[derive(Args, Debug)]
pub struct DescendantsArgs {
    pub id: String,

    /// Deepest level to return.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: u32,

    #[arg(long)]
    pub include_self: bool,

    #[arg(long)]
    pub meta: bool,
}

#[derive(Args, Debug)]
pub struct ChildrenArgs {
    pub id: String,

    /// Only children whose parent edge carries this tag.
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args, Debug)]
pub struct SiblingsArgs {
    pub id: String,

    #[arg(long)]
    pub include_self: bool,

    #[arg(long)]
    pub meta: bool,
}

#[derive(Args, Debug)]
pub struct RootArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Subtree root.
    pub id: String,

    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: u32,
}

pub fn run_ancestors(args: &AncestorsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let rows = hierarchy::ancestors_of(
        store.conn(),
        &args.id,
        &AncestorOptions {
            include_self: args.include_self,
            include_relation_meta: args.meta,
            order: Some(args.order),
        },
    )?;
    render_list(&rows, output)
}

pub fn run_descendants(
    args: &DescendantsArgs,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let rows = hierarchy::descendants_of(
        store.conn(),
        &args.id,
        &DescendantOptions {
            max_depth: args.max_depth,
            include_self: args.include_self,
            include_relation_meta: args.meta,
        },
    )?;
    render_list(&rows, output)
}

pub fn run_children(args: &ChildrenArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let rows = hierarchy::children_of(store.conn(), &args.id, args.tag.as_deref())?;
    render_list(&rows, output)
}

pub fn run_siblings(args: &SiblingsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let rows = hierarchy::siblings_of(
        store.conn(),
        &args.id,
        &SiblingOptions {
            include_self: args.include_self,
            include_relation_meta: args.meta,
        },
    )?;
    render_list(&rows, output)
}

pub fn run_root(args: &RootArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let root = hierarchy::root_of(store.conn(), &args.id)?;
    render(output, &root, |root, w| match root {
        Some(entity) if output == OutputMode::Text => entity.render_row(w),
        Some(entity) => entity.render_human(w),
        None => writeln!(w, "(none: '{}' is a root)", args.id),
    })
}

pub fn run_tree(args: &TreeArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;
    let rows = hierarchy::descendants_of(
        store.conn(),
        &args.id,
        &DescendantOptions {
            max_depth: args.max_depth,
            include_self: true,
            include_relation_meta: false,
        },
    )?;
    let tree = build_tree(rows.into_iter().map(|row| row.entity));
    render(output, &tree, |tree, w| write_tree(w, tree))
}
