//! Rendering of command results and errors for `cnp`.
//!
//! The mode comes from `--format`, then `--json`, then `CANOPY_FORMAT`, and
//! finally from whether stdout is a terminal (pretty) or a pipe (text).

use canopy_core::StoreError;
use canopy_core::db::query::EntityRow;
use canopy_core::graph::tree::TreeNode;
use canopy_core::model::entity::Entity;
use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<72}", "")
}

/// Write a section heading followed by a rule.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Write an aligned `key: value` line.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// How `cnp` prints results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Sections and key/value blocks for a terminal.
    Pretty,
    /// Tab-separated rows for scripts.
    Text,
    /// Stable JSON.
    Json,
}

fn pick_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    format_flag
        .or_else(|| json_flag.then_some(OutputMode::Json))
        .or_else(|| format_env.and_then(|val| OutputMode::from_str(val.trim(), true).ok()))
        .unwrap_or(if is_tty {
            OutputMode::Pretty
        } else {
            OutputMode::Text
        })
}

/// Resolve the output mode from flags, `CANOPY_FORMAT` and the terminal.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("CANOPY_FORMAT").ok();
    pick_mode(
        format_flag,
        json_flag,
        env_val.as_deref(),
        io::stdout().is_terminal(),
    )
}

/// A result with a pretty block and a tab-separated row form.
pub trait Renderable {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()>;

    /// One row, columns in [`Renderable::table_headers`] order.
    fn render_row(&self, w: &mut dyn Write) -> io::Result<()>;

    fn table_headers() -> &'static [&'static str]
    where
        Self: Sized;
}

/// Render one item to stdout.
pub fn render_item<R: Renderable + Serialize>(item: &R, mode: OutputMode) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Pretty => item.render_human(&mut out)?,
        OutputMode::Text => item.render_row(&mut out)?,
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, item)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render a list to stdout; JSON mode emits an array.
pub fn render_list<R: Renderable + Serialize>(items: &[R], mode: OutputMode) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Pretty => {
            if items.is_empty() {
                writeln!(out, "(none)")?;
            }
            for item in items {
                item.render_human(&mut out)?;
            }
        }
        OutputMode::Text => {
            if !items.is_empty() {
                writeln!(out, "{}", R::table_headers().join("\t"))?;
            }
            for item in items {
                item.render_row(&mut out)?;
            }
        }
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, items)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render a serializable value; pretty/text modes call `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2003").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&StoreError> for CliError {
    fn from(err: &StoreError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.hint().map(str::to_string),
            error_code: Some(err.code().code().to_string()),
        }
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        err.downcast_ref::<StoreError>().map_or_else(
            || Self {
                message: format!("{err:#}"),
                suggestion: None,
                error_code: None,
            },
            Self::from,
        )
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entity renderers
// ---------------------------------------------------------------------------

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

impl Renderable for Entity {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_section(w, &format!("{} ({})", self.id, self.model))?;
        pretty_kv(w, "View", or_dash(self.view.as_deref()))?;
        pretty_kv(w, "Parent", or_dash(self.parent_entity_id.as_deref()))?;
        pretty_kv(w, "Status", self.status().as_str())?;
        if let Some(at) = self.publish_at {
            pretty_kv(w, "Publish at", at.to_rfc3339())?;
        }
        if let Some(at) = self.unpublish_at {
            pretty_kv(w, "Unpublish at", at.to_rfc3339())?;
        }
        if !self.langs.is_empty() {
            pretty_kv(w, "Langs", self.langs.join(", "))?;
        }
        if self.props.as_object().is_some_and(|map| !map.is_empty()) {
            pretty_kv(w, "Props", self.props.to_string())?;
        }
        pretty_kv(
            w,
            "Versions",
            format!(
                "{} (tree {}, relations {}, full {})",
                self.version, self.version_tree, self.version_relations, self.version_full
            ),
        )?;
        if let Some(at) = self.deleted_at {
            pretty_kv(w, "Deleted at", at.to_rfc3339())?;
        }
        writeln!(w)
    }

    fn render_row(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            self.id,
            self.model,
            or_dash(self.parent_entity_id.as_deref()),
            self.status()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "model", "parent", "status"]
    }
}

impl Renderable for EntityRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        match &self.relation {
            Some(meta) => writeln!(
                w,
                "{:<14} {:<12} {} depth={} position={}{}",
                self.entity.id,
                self.entity.model,
                meta.kind,
                meta.depth,
                meta.position,
                if meta.tags.is_empty() {
                    String::new()
                } else {
                    format!(" tags={}", meta.tags.join(","))
                }
            ),
            None => writeln!(w, "{:<14} {}", self.entity.id, self.entity.model),
        }
    }

    fn render_row(&self, w: &mut dyn Write) -> io::Result<()> {
        let (kind, depth, position) = self.relation.as_ref().map_or_else(
            || ("-".to_string(), "-".to_string(), "-".to_string()),
            |meta| {
                (
                    meta.kind.clone(),
                    meta.depth.to_string(),
                    meta.position.to_string(),
                )
            },
        );
        writeln!(
            w,
            "{}\t{}\t{}\t{kind}\t{depth}\t{position}",
            self.entity.id,
            self.entity.model,
            or_dash(self.entity.parent_entity_id.as_deref()),
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "model", "parent", "kind", "depth", "position"]
    }
}

/// Write `nodes` as an indented outline.
pub fn write_tree(w: &mut dyn Write, nodes: &[TreeNode]) -> io::Result<()> {
    let mut stack: Vec<(&TreeNode, usize)> = nodes.iter().rev().map(|node| (node, 0)).collect();
    while let Some((node, level)) = stack.pop() {
        writeln!(
            w,
            "{}{} ({})",
            "  ".repeat(level),
            node.entity.id,
            node.entity.model
        )?;
        stack.extend(node.children.iter().rev().map(|child| (child, level + 1)));
    }
    Ok(())
}
