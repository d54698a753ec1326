#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "canopy: hierarchical entity and content store",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides `CANOPY_FORMAT`).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a canopy store",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    cnp init\n\n    # Spanish as the default content language\n    cnp init --lang es"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Create an entity",
        after_help = "EXAMPLES:\n    # Create a page under `home` with a title\n    cnp create --id about --model Page --parent home --content title=About\n\n    # Emit machine-readable output\n    cnp create --json"
    )]
    Create(cmd::create::CreateArgs),

    #[command(next_help_heading = "Read", about = "Show one entity")]
    Show(cmd::show::ShowArgs),

    #[command(next_help_heading = "Read", about = "List entities")]
    List(cmd::list::ListArgs),

    #[command(next_help_heading = "Lifecycle", about = "Update entity attributes")]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Move an entity under a new parent",
        after_help = "EXAMPLES:\n    # Move under another entity\n    cnp move about --parent company\n\n    # Make it a root\n    cnp move about --parent none"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(next_help_heading = "Lifecycle", about = "Soft-delete (or --force hard-delete) an entity")]
    Delete(cmd::delete::DeleteArgs),

    #[command(next_help_heading = "Lifecycle", about = "Restore a soft-deleted entity")]
    Restore(cmd::delete::RestoreArgs),

    #[command(next_help_heading = "Hierarchy", about = "List ancestors")]
    Ancestors(cmd::hierarchy::AncestorsArgs),

    #[command(next_help_heading = "Hierarchy", about = "List descendants")]
    Descendants(cmd::hierarchy::DescendantsArgs),

    #[command(next_help_heading = "Hierarchy", about = "List direct children")]
    Children(cmd::hierarchy::ChildrenArgs),

    #[command(next_help_heading = "Hierarchy", about = "List siblings")]
    Siblings(cmd::hierarchy::SiblingsArgs),

    #[command(next_help_heading = "Hierarchy", about = "Show the root ancestor")]
    Root(cmd::hierarchy::RootArgs),

    #[command(next_help_heading = "Hierarchy", about = "Print a subtree as an outline")]
    Tree(cmd::hierarchy::TreeArgs),

    #[command(next_help_heading = "Relations", about = "Create a relation")]
    Relate(cmd::relate::RelateArgs),

    #[command(next_help_heading = "Relations", about = "Delete a relation")]
    Unrelate(cmd::relate::UnrelateArgs),

    #[command(next_help_heading = "Relations", about = "Edit relation position, depth or tags")]
    Relation(cmd::relate::RelationEditArgs),

    #[command(
        next_help_heading = "Relations",
        about = "Query related entities",
        after_help = "EXAMPLES:\n    # Media of a page, ordered by position\n    cnp related home --kind medium --order position\n\n    # Who points at an image\n    cnp related img1 --incoming"
    )]
    Related(cmd::relate::RelatedArgs),

    #[command(next_help_heading = "Contents", about = "Read or write contents")]
    Contents(cmd::contents::ContentsArgs),

    #[command(next_help_heading = "Contents", about = "Snapshot an entity")]
    Archive(cmd::archive::ArchiveArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CANOPY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "canopy=debug,canopy_core=debug,info"
        } else {
            "canopy=info,canopy_core=info,warn"
        })
    });

    let format = env::var("CANOPY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli, output: OutputMode) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let root = project_root.as_path();

    match cli.command {
        Commands::Init(args) => cmd::init::run_init(&args, output, root),
        Commands::Create(args) => cmd::create::run_create(&args, output, root),
        Commands::Show(args) => cmd::show::run_show(&args, output, root),
        Commands::List(args) => cmd::list::run_list(&args, output, root),
        Commands::Update(args) => cmd::update::run_update(&args, output, root),
        Commands::Move(args) => cmd::move_cmd::run_move(&args, output, root),
        Commands::Delete(args) => cmd::delete::run_delete(&args, output, root),
        Commands::Restore(args) => cmd::delete::run_restore(&args, output, root),
        Commands::Ancestors(args) => cmd::hierarchy::run_ancestors(&args, output, root),
        Commands::Descendants(args) => cmd::hierarchy::run_descendants(&args, output, root),
        Commands::Children(args) => cmd::hierarchy::run_children(&args, output, root),
        Commands::Siblings(args) => cmd::hierarchy::run_siblings(&args, output, root),
        Commands::Root(args) => cmd::hierarchy::run_root(&args, output, root),
        Commands::Tree(args) => cmd::hierarchy::run_tree(&args, output, root),
        Commands::Relate(args) => cmd::relate::run_relate(&args, output, root),
        Commands::Unrelate(args) => cmd::relate::run_unrelate(&args, output, root),
        Commands::Relation(args) => cmd::relate::run_relation_edit(&args, output, root),
        Commands::Related(args) => cmd::relate::run_related(&args, output, root),
        Commands::Contents(args) => cmd::contents::run_contents(&args, output, root),
        Commands::Archive(args) => cmd::archive::run_archive(&args, output, root),
    }
}

fn main() -> ExitCode {
    init_tracing();
    canopy_core::init();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }
    let output = cli.output_mode();

    match run(cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["cnp", "--json", "list"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["cnp", "list", "--json"]);
        assert!(cli.json);
        assert_eq!(cli.output_mode(), OutputMode::Json);
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["cnp", "--format", "text", "list"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn move_subcommand_parses() {
        let cli = Cli::parse_from(["cnp", "move", "a", "--parent", "none"]);
        assert!(matches!(cli.command, Commands::Move(_)));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["cnp", "init"],
            vec!["cnp", "create", "--id", "x"],
            vec!["cnp", "show", "x"],
            vec!["cnp", "list"],
            vec!["cnp", "update", "x", "--view", "v"],
            vec!["cnp", "move", "x", "--parent", "p"],
            vec!["cnp", "delete", "x", "--force"],
            vec!["cnp", "restore", "x"],
            vec!["cnp", "ancestors", "x", "--order", "desc"],
            vec!["cnp", "descendants", "x", "--max-depth", "2"],
            vec!["cnp", "children", "x"],
            vec!["cnp", "siblings", "x"],
            vec!["cnp", "root", "x"],
            vec!["cnp", "tree", "x"],
            vec!["cnp", "relate", "x", "y", "--kind", "medium"],
            vec!["cnp", "unrelate", "3"],
            vec!["cnp", "relation", "3", "--position", "2"],
            vec!["cnp", "related", "x", "--incoming"],
            vec!["cnp", "contents", "x", "--set", "title=Hi"],
            vec!["cnp", "archive", "x"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn bad_direction_is_rejected() {
        assert!(Cli::try_parse_from(["cnp", "ancestors", "x", "--order", "up"]).is_err());
    }
}
