//! `cnp contents`: read or upsert multilingual content fields.

use super::{open_store, parse_pairs};
use crate::output::{OutputMode, render};
use anyhow::Result;
use canopy_core::db::content::ContentFilter;
use clap::{Args, ValueEnum};
use serde_json::Value;
use std::io::Write;
use std::path::Path;

/// Shape of the returned contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ContentShape {
    /// `{lang: {field: text}}`
    #[default]
    Lang,
    /// `{field: {lang: text}}`
    Field,
    /// `{field: text}` (one language expected)
    Flat,
    /// One row per stored value.
    Rows,
}

#[derive(Args, Debug)]
pub struct ContentsArgs {
    /// Entity id.
    pub id: String,

    /// Upsert `field=text` (repeatable) before reading.
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Language for reads and writes. Writes default to the configured language.
    #[arg(long)]
    pub lang: Option<String>,

    /// Only these fields (repeatable).
    #[arg(long = "field")]
    pub fields: Vec<String>,

    #[arg(long, value_enum, default_value_t = ContentShape::Lang)]
    pub shape: ContentShape,
}

fn write_nested(value: &Value, w: &mut dyn Write) -> std::io::Result<()> {
    match value {
        Value::Object(outer) if outer.is_empty() => writeln!(w, "(none)"),
        Value::Object(outer) => {
            for (key, inner) in outer {
                match inner {
                    Value::Object(map) => {
                        writeln!(w, "{key}")?;
                        for (name, text) in map {
                            writeln!(w, "  {name}: {}", text.as_str().unwrap_or_default())?;
                        }
                    }
                    other => writeln!(w, "{key}: {}", other.as_str().unwrap_or_default())?,
                }
            }
            Ok(())
        }
        Value::Array(rows) => {
            for row in rows {
                writeln!(
                    w,
                    "{}\t{}\t{}",
                    row["lang"].as_str().unwrap_or_default(),
                    row["field"].as_str().unwrap_or_default(),
                    row["text"].as_str().unwrap_or_default()
                )?;
            }
            Ok(())
        }
        other => writeln!(w, "{other}"),
    }
}

pub fn run_contents(args: &ContentsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    store.find(&args.id)?;

    if !args.set.is_empty() {
        let pairs = parse_pairs(&args.set)?;
        store.upsert_contents(&args.id, pairs, args.lang.as_deref())?;
    }

    let filter = ContentFilter {
        lang: args.lang.clone(),
        fields: args.fields.clone(),
    };
    let set = store.contents(&args.id, &filter)?;
    let value = match args.shape {
        ContentShape::Lang => serde_json::to_value(set.group_by_lang())?,
        ContentShape::Field => serde_json::to_value(set.group_by_field())?,
        ContentShape::Flat => serde_json::to_value(set.flatten_by_field())?,
        ContentShape::Rows => serde_json::to_value(set.rows())?,
    };

    render(output, &value, write_nested)
}
