//! `cnp archive`: snapshot an entity, or list its snapshots.

use super::open_store;
use crate::output::{OutputMode, pretty_kv, render};
use anyhow::Result;
use canopy_core::archive::{Archive, archives_of};
use clap::Args;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Entity id.
    pub id: String,

    /// List existing snapshots instead of taking one.
    #[arg(long)]
    pub list: bool,

    /// Snapshot kind, e.g. `publish`. Defaults to `snapshot`.
    #[arg(long)]
    pub kind: Option<String>,

    /// Author recorded on the snapshot.
    #[arg(long)]
    pub by: Option<String>,
}

fn write_archive(archive: &Archive, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_kv(w, "Archive", archive.archive_id.to_string())?;
    pretty_kv(w, "Kind", &archive.kind)?;
    pretty_kv(w, "Version", archive.version.to_string())?;
    pretty_kv(w, "Created at", archive.created_at.to_rfc3339())?;
    if let Some(by) = &archive.created_by {
        pretty_kv(w, "Created by", by)?;
    }
    Ok(())
}

pub fn run_archive(args: &ArchiveArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    if args.list {
        store.find_with_trashed(&args.id)?;
        let archives = archives_of(store.conn(), &args.id)?;
        return render(output, &archives, |archives, w| {
            if archives.is_empty() {
                writeln!(w, "(none)")?;
            }
            for archive in archives {
                write_archive(archive, w)?;
                writeln!(w)?;
            }
            Ok(())
        });
    }

    let archive = store.archive(&args.id, args.kind.as_deref(), args.by.as_deref())?;
    render(output, &archive, write_archive)
}
