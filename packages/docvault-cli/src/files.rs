//! # Keyed file subcommands
//!
//! Program and print files addressed by kind, scope, machine and name.
//!
//! - `import`: store one or more files as new revisions.
//! - `history` / `active`: read a key's chain.
//! - `rollback` / `delete`: move or clear the active revision.
//! - `list`: current revision of every key matching a filter.
//! - `export` / `open` / `verify` / `inspect`: blob access and checks.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use docvault_storage::{
    ArtifactKind, DocumentFilter, DocumentKey, MachineFilter, MachineRef, RevisionId, ScopeType,
};

use crate::render;
use crate::session::Session;
use crate::EXIT_CHECK_FAILED;

/// Which chain a command addresses
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// `program` or `print`.
    #[arg(long)]
    pub kind: ArtifactKind,

    /// `GLOBAL` or `MACHINE`; defaults to MACHINE when `--machine` is given.
    #[arg(long)]
    pub scope: Option<ScopeType>,

    /// Machine id for machine-scoped files.
    #[arg(long)]
    pub machine: Option<i64>,

    /// Document name (the key's filename).
    #[arg(long)]
    pub name: String,
}

impl KeyArgs {
    pub fn key(&self) -> Result<DocumentKey> {
        let scope = infer_scope(self.scope, self.machine);
        Ok(DocumentKey::parse(
            self.kind,
            Some(scope.as_str()),
            self.machine,
            Some(&self.name),
        )?)
    }
}

fn infer_scope(scope: Option<ScopeType>, machine: Option<i64>) -> ScopeType {
    scope.unwrap_or(if machine.is_some() {
        ScopeType::Machine
    } else {
        ScopeType::Global
    })
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    #[arg(long)]
    pub kind: ArtifactKind,

    #[arg(long)]
    pub scope: Option<ScopeType>,

    #[arg(long)]
    pub machine: Option<i64>,

    /// Document name; derived from each file name when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Free-text notes stored on the new revision.
    #[arg(long)]
    pub notes: Option<String>,

    /// Files to import.
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RollbackArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Revision id to reactivate.
    #[arg(long)]
    pub revision: RevisionId,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub kind: Option<ArtifactKind>,

    #[arg(long)]
    pub scope: Option<ScopeType>,

    /// Only keys bound to this machine.
    #[arg(long, conflicts_with = "unassigned")]
    pub machine: Option<i64>,

    /// Only keys without a machine.
    #[arg(long)]
    pub unassigned: bool,

    /// Case-insensitive substring over names and notes.
    #[arg(long)]
    pub search: Option<String>,

    /// Include logically deleted keys.
    #[arg(long)]
    pub all: bool,
}

impl ListArgs {
    pub fn filter(&self) -> Result<DocumentFilter> {
        let mut filter = DocumentFilter::default().include_inactive(self.all);
        if let Some(kind) = self.kind {
            filter = filter.kind(kind);
        }
        if let Some(scope) = self.scope {
            filter = filter.scope(scope);
        }
        if let Some(machine) = self.machine {
            filter = filter.machine(MachineFilter::Only(MachineRef::new(machine)?));
        } else if self.unassigned {
            filter = filter.machine(MachineFilter::Unassigned);
        }
        if let Some(search) = &self.search {
            filter = filter.search(search.clone());
        }
        Ok(filter)
    }
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Revision id to copy out.
    pub revision: RevisionId,

    /// Destination directory.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct RevisionArg {
    pub revision: RevisionId,
}

// ═══════════════════════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════════════════════

pub async fn run_import(session: &Session, args: &ImportArgs) -> Result<u8> {
    if let Some(name) = &args.name {
        if args.sources.len() != 1 {
            bail!("--name applies to a single file; omit it to import several");
        }
        let key = KeyArgs {
            kind: args.kind,
            scope: args.scope,
            machine: args.machine,
            name: name.clone(),
        }
        .key()?;
        let outcome = session
            .manager
            .import(&key, &args.sources[0], args.notes.as_deref(), &session.actor)
            .await?;
        if session.json {
            render::print_json(&outcome)?;
        } else {
            println!("{}", render::outcome_line(key.filename(), &outcome));
        }
        return Ok(0);
    }

    let machine = args.machine.map(MachineRef::new).transpose()?;
    let scope = infer_scope(args.scope, args.machine);
    if args.notes.is_some() {
        tracing::warn!("--notes is ignored when names are derived from file names");
    }
    let results = session
        .manager
        .import_many(args.kind, scope, machine, &args.sources, &session.actor)
        .await;

    let failed = results.iter().filter(|r| r.outcome.is_err()).count();
    if session.json {
        let values: Vec<serde_json::Value> = results
            .iter()
            .map(|r| match &r.outcome {
                Ok(outcome) => serde_json::json!({
                    "source": r.source,
                    "document_name": r.document_name,
                    "outcome": outcome,
                }),
                Err(e) => serde_json::json!({
                    "source": r.source,
                    "document_name": r.document_name,
                    "error": e.message,
                    "kind": e.kind.as_str(),
                }),
            })
            .collect();
        render::print_json(&values)?;
    } else {
        print!("{}", render::batch_lines(&results));
    }
    if failed > 0 {
        bail!("{} of {} imports failed", failed, results.len());
    }
    Ok(0)
}

pub async fn run_history(session: &Session, args: &KeyArgs) -> Result<u8> {
    let revisions = session.manager.list_revisions(&args.key()?).await?;
    if session.json {
        render::print_json(&revisions)?;
    } else {
        print!("{}", render::revision_table(&revisions));
    }
    Ok(0)
}

pub async fn run_active(session: &Session, args: &KeyArgs) -> Result<u8> {
    let active = session.manager.get_active(&args.key()?).await?;
    match (&active, session.json) {
        (_, true) => render::print_json(&active)?,
        (Some(revision), false) => print!("{}", render::revision_detail(revision)),
        (None, false) => println!("no active revision"),
    }
    Ok(0)
}

pub async fn run_rollback(session: &Session, args: &RollbackArgs) -> Result<u8> {
    let key = args.key.key()?;
    let revision = session
        .manager
        .rollback(&key, args.revision, &session.actor)
        .await?;
    if session.json {
        render::print_json(&revision)?;
    } else {
        println!(
            "{}: rev {} (id {}) is active",
            key.filename(), revision.revision_number, revision.id
        );
    }
    Ok(0)
}

pub async fn run_delete(session: &Session, args: &KeyArgs) -> Result<u8> {
    let key = args.key()?;
    let changed = session.manager.deactivate_all(&key, &session.actor).await?;
    if session.json {
        render::print_json(&serde_json::json!({ "deactivated": changed }))?;
    } else {
        println!("{}: deactivated ({} row changed)", key.filename(), changed);
    }
    Ok(0)
}

pub async fn run_list(session: &Session, args: &ListArgs) -> Result<u8> {
    let documents = session.manager.list_documents(args.filter()?).await?;
    if session.json {
        render::print_json(&documents)?;
    } else {
        print!("{}", render::document_table(&documents));
    }
    Ok(0)
}

pub async fn run_export(session: &Session, args: &ExportArgs) -> Result<u8> {
    let path = session.manager.export(args.revision, &args.out).await?;
    if session.json {
        render::print_json(&serde_json::json!({ "path": path }))?;
    } else {
        println!("{}", path.display());
    }
    Ok(0)
}

pub async fn run_open(session: &Session, args: &RevisionArg) -> Result<u8> {
    let path = session.manager.open_revision(args.revision).await?;
    if session.json {
        render::print_json(&serde_json::json!({ "path": path }))?;
    } else {
        println!("{}", path.display());
    }
    Ok(0)
}

pub async fn run_verify(session: &Session, args: &RevisionArg) -> Result<u8> {
    let intact = session.manager.verify_revision(args.revision).await?;
    if session.json {
        render::print_json(&serde_json::json!({ "revision": args.revision, "intact": intact }))?;
    } else if intact {
        println!("revision {}: ok", args.revision);
    } else {
        println!("revision {}: content does not match recorded hash", args.revision);
    }
    Ok(if intact { 0 } else { EXIT_CHECK_FAILED })
}

pub async fn run_inspect(session: &Session) -> Result<u8> {
    let report = session.manager.inspect_blobs().await?;
    if session.json {
        render::print_json(&report)?;
    } else {
        print!("{}", render::blob_report(&report));
    }
    Ok(if report.is_clean() { 0 } else { EXIT_CHECK_FAILED })
}
