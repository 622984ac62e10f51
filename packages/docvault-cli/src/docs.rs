//! # Machine document subcommands (`docvault doc ...`)
//!
//! Registry documents are addressed by id; `doc import` without
//! `--document` finds or creates the document from the file name.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use docvault_storage::{DocumentId, RegistryFilter, RevisionId};

use crate::render;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct DocArgs {
    #[command(subcommand)]
    pub command: DocCommand,
}

#[derive(Subcommand, Debug)]
pub enum DocCommand {
    /// Register a new document.
    Create {
        #[arg(long)]
        line: String,
        #[arg(long)]
        machine: String,
        #[arg(long = "type")]
        doc_type: String,
        #[arg(long)]
        name: String,
    },

    /// Import a file as the next revision of a document.
    Import {
        /// Target document id; otherwise matched or created by line/machine/type.
        #[arg(long, conflicts_with_all = ["line", "machine", "doc_type"])]
        document: Option<DocumentId>,
        #[arg(long)]
        line: Option<String>,
        #[arg(long)]
        machine: Option<String>,
        #[arg(long = "type")]
        doc_type: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        source: PathBuf,
    },

    /// List documents with their current revision.
    List {
        #[arg(long)]
        line: Option<String>,
        #[arg(long)]
        machine: Option<String>,
        #[arg(long = "type")]
        doc_type: Option<String>,
        /// Case-insensitive substring over names, original filenames and notes.
        #[arg(long)]
        search: Option<String>,
        /// Include deactivated documents.
        #[arg(long)]
        all: bool,
    },

    /// Revisions of one document, newest first.
    History { document: DocumentId },

    /// Reactivate a revision of a document.
    Rollback {
        document: DocumentId,
        #[arg(long)]
        revision: RevisionId,
    },

    /// Hide (`false`) or restore (`true`) a document.
    SetActive {
        document: DocumentId,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Copy a revision out as `<doc_name>_rev<n><ext>`.
    Export {
        revision: RevisionId,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

pub async fn run_doc(session: &Session, args: &DocArgs) -> Result<u8> {
    let registry = session.manager.registry();
    let actor = &session.actor;

    match &args.command {
        DocCommand::Create {
            line,
            machine,
            doc_type,
            name,
        } => {
            let id = registry
                .create_document(line, machine, doc_type, name, actor)
                .await?;
            if session.json {
                render::print_json(&registry.get_document(id).await?)?;
            } else {
                println!("document {} created", id);
            }
        }

        DocCommand::Import {
            document,
            line,
            machine,
            doc_type,
            notes,
            source,
        } => {
            let (id, outcome) = match (document, line, machine, doc_type) {
                (Some(id), _, _, _) => {
                    let outcome = registry
                        .import_revision(*id, source, notes.as_deref(), actor)
                        .await?;
                    (*id, outcome)
                }
                (None, Some(line), Some(machine), Some(doc_type)) => {
                    registry
                        .import_file(line, machine, doc_type, source, notes.as_deref(), actor)
                        .await?
                }
                _ => bail!("either --document or all of --line, --machine and --type are required"),
            };
            if session.json {
                render::print_json(&serde_json::json!({ "document_id": id, "outcome": outcome }))?;
            } else {
                println!("{}", render::outcome_line(&format!("document {}", id), &outcome));
            }
        }

        DocCommand::List {
            line,
            machine,
            doc_type,
            search,
            all,
        } => {
            let documents = registry
                .list_documents(RegistryFilter {
                    line: line.clone(),
                    machine: machine.clone(),
                    doc_type: doc_type.clone(),
                    search: search.clone(),
                    include_inactive: *all,
                })
                .await?;
            if session.json {
                render::print_json(&documents)?;
            } else {
                print!("{}", render::machine_document_table(&documents));
            }
        }

        DocCommand::History { document } => {
            let revisions = registry.list_revisions(*document).await?;
            if session.json {
                render::print_json(&revisions)?;
            } else {
                print!(
                    "{}",
                    render::machine_document_detail(&registry.get_document(*document).await?)
                );
                print!("{}", render::revision_table(&revisions));
            }
        }

        DocCommand::Rollback { document, revision } => {
            let restored = registry.rollback(*document, *revision, actor).await?;
            if session.json {
                render::print_json(&restored)?;
            } else {
                println!(
                    "document {}: rev {} (id {}) is active",
                    document, restored.revision_number, restored.id
                );
            }
        }

        DocCommand::SetActive { document, active } => {
            registry.set_active(*document, *active, actor).await?;
            if session.json {
                render::print_json(&serde_json::json!({ "document_id": document, "active": active }))?;
            } else {
                let state = if *active { "restored" } else { "hidden" };
                println!("document {} {}", document, state);
            }
        }

        DocCommand::Export { revision, out } => {
            let path = registry.export(*revision, out).await?;
            if session.json {
                render::print_json(&serde_json::json!({ "path": path }))?;
            } else {
                println!("{}", path.display());
            }
        }
    }
    Ok(0)
}
