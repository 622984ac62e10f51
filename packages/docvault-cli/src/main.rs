//! # docvault CLI entry point
//!
//! Parses arguments, installs logging and dispatches to the handler
//! modules. Exit code `1` means the command failed.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docvault_cli::docs::{run_doc, DocArgs};
use docvault_cli::files::{
    run_active, run_delete, run_export, run_history, run_import, run_inspect, run_list,
    run_open, run_rollback, run_verify, ExportArgs, ImportArgs, KeyArgs, ListArgs,
    RevisionArg, RollbackArgs,
};
use docvault_cli::session::{GlobalArgs, Session};

/// Revision store for CNC programs, prints and machine documents.
///
/// Every import is content-hashed; identical bytes are never stored twice
/// for the same document, and each document has at most one active
/// revision.
#[derive(Parser, Debug)]
#[command(name = "docvault", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import files as new revisions (duplicates are skipped).
    Import(ImportArgs),

    /// Show every revision of a document, newest first.
    History(KeyArgs),

    /// Show the active revision of a document.
    Active(KeyArgs),

    /// Reactivate an earlier revision.
    Rollback(RollbackArgs),

    /// Deactivate every revision of a document (history is kept).
    Delete(KeyArgs),

    /// List documents with their current revision.
    List(ListArgs),

    /// Copy a revision out as `<name>_rev<n><ext>`.
    Export(ExportArgs),

    /// Print the on-disk path of a revision's blob.
    Open(RevisionArg),

    /// Re-hash a revision's blob and compare with the recorded hash.
    Verify(RevisionArg),

    /// Reconcile database rows against the blob tree.
    Inspect,

    /// Machine document registry.
    Doc(DocArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match Session::open(&cli.global) {
        Ok(session) => dispatch(&session, &cli.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(session: &Session, command: &Commands) -> anyhow::Result<u8> {
    match command {
        Commands::Import(args) => run_import(session, args).await,
        Commands::History(args) => run_history(session, args).await,
        Commands::Active(args) => run_active(session, args).await,
        Commands::Rollback(args) => run_rollback(session, args).await,
        Commands::Delete(args) => run_delete(session, args).await,
        Commands::List(args) => run_list(session, args).await,
        Commands::Export(args) => run_export(session, args).await,
        Commands::Open(args) => run_open(session, args).await,
        Commands::Verify(args) => run_verify(session, args).await,
        Commands::Inspect => run_inspect(session).await,
        Commands::Doc(args) => run_doc(session, args).await,
    }
}
