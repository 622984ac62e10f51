//! Text and JSON output
//!
//! Text output is a plain aligned listing meant for terminals and `grep`;
//! `--json` prints the library types through `serde_json`.

use anyhow::Result;
use serde::Serialize;

use docvault_storage::{
    BatchImport, BlobReport, DocumentSummary, ImportOutcome, MachineDocument,
    MachineDocumentSummary, Revision,
};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn active_marker(active: bool) -> &'static str {
    if active {
        "*"
    } else {
        " "
    }
}

/// One line per revision, newest first, active row marked with `*`
pub fn revision_table(revisions: &[Revision]) -> String {
    if revisions.is_empty() {
        return "no revisions\n".to_string();
    }
    let mut out = format!(
        "  {:>4} {:>6}  {:<19}  {:<12}  {:<24}  {}\n",
        "REV", "ID", "CREATED", "BY", "ORIGINAL", "NOTES"
    );
    for revision in revisions {
        out.push_str(&format!(
            "{} {:>4} {:>6}  {:<19}  {:<12}  {:<24}  {}\n",
            active_marker(revision.is_active),
            revision.revision_number,
            revision.id,
            revision.created_at.format("%Y-%m-%d %H:%M:%S"),
            revision.created_by,
            revision.original_filename,
            revision.notes.as_deref().unwrap_or("")
        ));
    }
    out
}

pub fn revision_detail(revision: &Revision) -> String {
    format!(
        "lineage:   {}\nrevision:  {} (id {})\nactive:    {}\nstored:    {}\nsha256:    {}\noriginal:  {}\ncreated:   {} by {}\nnotes:     {}\n",
        revision.lineage,
        revision.revision_number,
        revision.id,
        revision.is_active,
        revision.stored_path,
        revision.content_hash,
        revision.original_filename,
        revision.created_at.to_rfc3339(),
        revision.created_by,
        revision.notes.as_deref().unwrap_or("-"),
    )
}

pub fn outcome_line(label: &str, outcome: &ImportOutcome) -> String {
    match outcome {
        ImportOutcome::Created {
            revision_id,
            revision_number,
        } => format!("{}: created rev {} (id {})", label, revision_number, revision_id),
        ImportOutcome::Duplicate {
            existing_revision_id,
            revision_number,
        } => format!(
            "{}: duplicate of rev {} (id {}), nothing stored",
            label, revision_number, existing_revision_id
        ),
    }
}

pub fn batch_lines(results: &[BatchImport]) -> String {
    let mut out = String::new();
    for result in results {
        let line = match &result.outcome {
            Ok(outcome) => outcome_line(&result.document_name, outcome),
            Err(e) => format!("{}: failed: {}", result.source.display(), e),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn document_table(documents: &[DocumentSummary]) -> String {
    if documents.is_empty() {
        return "no documents\n".to_string();
    }
    let mut out = format!(
        "  {:<8} {:<8} {:>8}  {:<32} {:>4} {:>5}\n",
        "KIND", "SCOPE", "MACHINE", "NAME", "REV", "COUNT"
    );
    for summary in documents {
        out.push_str(&format!(
            "{} {:<8} {:<8} {:>8}  {:<32} {:>4} {:>5}\n",
            active_marker(summary.is_active()),
            summary.key.kind(),
            summary.key.scope(),
            summary
                .key
                .machine()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
            summary.key.filename(),
            summary.current.revision_number,
            summary.revision_count
        ));
    }
    out
}

pub fn machine_document_table(documents: &[MachineDocumentSummary]) -> String {
    if documents.is_empty() {
        return "no documents\n".to_string();
    }
    let mut out = format!(
        "  {:>5}  {:<10} {:<10} {:<14} {:<32} {:>4}\n",
        "ID", "LINE", "MACHINE", "TYPE", "NAME", "REV"
    );
    for summary in documents {
        let document = &summary.document;
        out.push_str(&format!(
            "{} {:>5}  {:<10} {:<10} {:<14} {:<32} {:>4}\n",
            active_marker(document.is_active),
            document.id,
            document.line,
            document.machine,
            document.doc_type,
            document.doc_name,
            summary
                .current
                .as_ref()
                .map(|r| r.revision_number.to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    out
}

pub fn machine_document_detail(document: &MachineDocument) -> String {
    format!(
        "document:  {} ({})\nline:      {}\nmachine:   {}\ntype:      {}\nactive:    {}\ncreated:   {} by {}\n",
        document.id,
        document.doc_name,
        document.line,
        document.machine,
        document.doc_type,
        document.is_active,
        document.created_at.to_rfc3339(),
        document.created_by,
    )
}

pub fn blob_report(report: &BlobReport) -> String {
    let mut out = format!(
        "referenced: {}\nmissing:    {}\norphaned:   {}\n",
        report.referenced,
        report.missing.len(),
        report.orphaned.len()
    );
    for missing in &report.missing {
        out.push_str(&format!(
            "  missing  {} (revision {})\n",
            missing.stored_path, missing.revision_id
        ));
    }
    for orphan in &report.orphaned {
        out.push_str(&format!("  orphan   {}\n", orphan));
    }
    out
}
