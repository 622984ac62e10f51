//! Revision lifecycle integration tests
//!
//! Import / dedup / rollback / logical delete against a file-backed store:
//! - Scenarios A, B, C
//! - Numbering after rollback
//! - Cross-key rollback
//! - Listing filters
//! - Blob write failure
//! - Keys deserialized from JSON

mod common;

use common::*;
use docvault_storage::{
    ArtifactKind, DocumentFilter, DocumentKey, ErrorKind, ImportOutcome, MachineFilter,
    ScopeType,
};
use std::fs;

// ═══════════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scenario_a_duplicate_import_is_ignored() {
    let h = Harness::new();
    let key = print_for(7, "drawing");
    let source = h.file("drawing.pdf", b"B1");

    let first = h.manager.import(&key, &source, None, &admin()).await.unwrap();
    assert!(matches!(
        first,
        ImportOutcome::Created {
            revision_number: 1,
            ..
        }
    ));

    let second = h.manager.import(&key, &source, None, &admin()).await.unwrap();
    assert_eq!(
        second,
        ImportOutcome::Duplicate {
            existing_revision_id: first.revision_id(),
            revision_number: 1,
        }
    );
    assert_eq!(h.manager.list_revisions(&key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_b_rollback_keeps_history() {
    let h = Harness::new();
    let key = print_for(7, "drawing");

    let rev1 = h
        .manager
        .import(&key, &h.file("v1.pdf", b"B1"), None, &admin())
        .await
        .unwrap();
    h.manager
        .import(&key, &h.file("v2.pdf", b"B2"), None, &admin())
        .await
        .unwrap();

    h.manager
        .rollback(&key, rev1.revision_id(), &admin())
        .await
        .unwrap();

    let active = h.manager.get_active(&key).await.unwrap().unwrap();
    assert_eq!(active.id, rev1.revision_id());
    assert_eq!(active.stored_path, "storage/prints/MACHINE_7/drawing/rev_1.pdf");

    let history = h.manager.list_revisions(&key).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].revision_number, 2);
    assert!(!history[0].is_active);
    assert!(history[1].is_active);
}

#[tokio::test]
async fn scenario_c_logical_delete() {
    let h = Harness::new();
    let key = print_for(7, "drawing");
    h.manager
        .import(&key, &h.file("d.pdf", b"B1"), None, &admin())
        .await
        .unwrap();

    let changed = h.manager.deactivate_all(&key, &admin()).await.unwrap();
    assert_eq!(changed, 1);
    assert!(h.manager.get_active(&key).await.unwrap().is_none());
    assert_eq!(h.manager.list_revisions(&key).await.unwrap().len(), 1);

    // Blob stays for audit/recovery
    let report = h.manager.inspect_blobs().await.unwrap();
    assert!(report.is_clean());
}

// ═══════════════════════════════════════════════════════════════════════════
// Numbering & rollback
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn import_after_rollback_numbers_from_max() {
    let h = Harness::new();
    let key = program_for(3, "op10");

    let mut ids = Vec::new();
    for (i, bytes) in [b"G1", b"G2", b"G3"].iter().enumerate() {
        let source = h.file(&format!("op10_{}.nc", i), *bytes);
        ids.push(
            h.manager
                .import(&key, &source, None, &admin())
                .await
                .unwrap()
                .revision_id(),
        );
    }

    h.manager.rollback(&key, ids[0], &admin()).await.unwrap();
    let fourth = h
        .manager
        .import(&key, &h.file("op10_new.nc", b"G4"), None, &admin())
        .await
        .unwrap();
    assert_eq!(fourth.revision_number(), 4);

    let history = h.manager.list_revisions(&key).await.unwrap();
    let numbers: Vec<u32> = history.iter().map(|r| r.revision_number).collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);
    assert!(history[0].is_active);
    assert!(!history[3].is_active, "revision 1 gives way to 4");
    assert_eq!(history[0].parent_id, Some(ids[2]), "parent is the max, not the active");
}

#[tokio::test]
async fn rollback_then_get_active_returns_target() {
    let h = Harness::new();
    let key = program_for(3, "op20");
    let mut ids = Vec::new();
    for bytes in [&b"A"[..], b"B", b"C"] {
        let source = h.file("op20.nc", bytes);
        ids.push(
            h.manager
                .import(&key, &source, None, &admin())
                .await
                .unwrap()
                .revision_id(),
        );
    }

    for target in [ids[1], ids[0], ids[2], ids[0]] {
        h.manager.rollback(&key, target, &admin()).await.unwrap();
        let active = h.manager.get_active(&key).await.unwrap().unwrap();
        assert_eq!(active.id, target);
    }
}

#[tokio::test]
async fn cross_key_rollback_is_not_found() {
    let h = Harness::new();
    let seven = print_for(7, "drawing");
    let eight = print_for(8, "drawing");

    let on_seven = h
        .manager
        .import(&seven, &h.file("a.pdf", b"seven"), None, &admin())
        .await
        .unwrap();
    let on_eight = h
        .manager
        .import(&eight, &h.file("b.pdf", b"eight"), None, &admin())
        .await
        .unwrap();

    let err = h
        .manager
        .rollback(&eight, on_seven.revision_id(), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let active_seven = h.manager.get_active(&seven).await.unwrap().unwrap();
    let active_eight = h.manager.get_active(&eight).await.unwrap().unwrap();
    assert_eq!(active_seven.id, on_seven.revision_id());
    assert_eq!(active_eight.id, on_eight.revision_id());
}

#[tokio::test]
async fn unassigned_machine_bucket_is_its_own_key() {
    let h = Harness::new();
    let unassigned =
        DocumentKey::new(ArtifactKind::Print, ScopeType::Machine, None, "drawing").unwrap();
    let bound = print_for(7, "drawing");
    let source = h.file("d.pdf", b"same bytes");

    h.manager.import(&unassigned, &source, None, &admin()).await.unwrap();
    let outcome = h.manager.import(&bound, &source, None, &admin()).await.unwrap();
    assert!(!outcome.is_duplicate(), "no-machine is not a wildcard");

    assert_eq!(h.manager.list_revisions(&unassigned).await.unwrap().len(), 1);
    assert_eq!(h.manager.list_revisions(&bound).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deactivate_unknown_key_is_not_found() {
    let h = Harness::new();
    let err = h
        .manager
        .deactivate_all(&print_for(1, "never-imported"), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

// ═══════════════════════════════════════════════════════════════════════════
// Listing
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn list_documents_filters() {
    let h = Harness::new();
    let spec = DocumentKey::global(ArtifactKind::Print, "Surface Spec").unwrap();
    let drawing = print_for(7, "bracket");
    let program = program_for(7, "bracket");

    h.manager
        .import(&spec, &h.file("spec.pdf", b"s"), Some("Ra 0.8 finish"), &admin())
        .await
        .unwrap();
    h.manager
        .import(&drawing, &h.file("bracket.pdf", b"d"), None, &admin())
        .await
        .unwrap();
    h.manager
        .import(&program, &h.file("bracket.nc", b"p"), None, &admin())
        .await
        .unwrap();

    let prints = h
        .manager
        .list_documents(DocumentFilter::default().kind(ArtifactKind::Print))
        .await
        .unwrap();
    assert_eq!(prints.len(), 2);

    let global = h
        .manager
        .list_documents(DocumentFilter::default().scope(ScopeType::Global))
        .await
        .unwrap();
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].key, spec);

    // Search matches notes case-insensitively
    let by_note = h
        .manager
        .list_documents(DocumentFilter::default().search("RA 0.8"))
        .await
        .unwrap();
    assert_eq!(by_note.len(), 1);
    assert_eq!(by_note[0].key, spec);

    let by_name = h
        .manager
        .list_documents(DocumentFilter::default().search("BRACK"))
        .await
        .unwrap();
    assert_eq!(by_name.len(), 2);
}

#[tokio::test]
async fn list_documents_carries_active_or_newest() {
    let h = Harness::new();
    let key = print_for(2, "fixture");
    let first = h
        .manager
        .import(&key, &h.file("f1.pdf", b"1"), None, &admin())
        .await
        .unwrap();
    h.manager
        .import(&key, &h.file("f2.pdf", b"2"), None, &admin())
        .await
        .unwrap();
    h.manager
        .rollback(&key, first.revision_id(), &admin())
        .await
        .unwrap();

    let listed = h.manager.list_documents(DocumentFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].current.id, first.revision_id());
    assert_eq!(listed[0].revision_count, 2);

    h.manager.deactivate_all(&key, &admin()).await.unwrap();
    assert!(h
        .manager
        .list_documents(DocumentFilter::default())
        .await
        .unwrap()
        .is_empty());

    let with_inactive = h
        .manager
        .list_documents(DocumentFilter::default().include_inactive(true))
        .await
        .unwrap();
    assert_eq!(with_inactive.len(), 1);
    assert_eq!(with_inactive[0].current.revision_number, 2, "newest when none active");
    assert!(!with_inactive[0].is_active());
}

#[tokio::test]
async fn machine_filter_never_leaks_other_buckets() {
    let h = Harness::new();
    let keys = [
        print_for(7, "a"),
        print_for(8, "a"),
        DocumentKey::new(ArtifactKind::Print, ScopeType::Machine, None, "a").unwrap(),
        DocumentKey::global(ArtifactKind::Print, "a").unwrap(),
        program_for(7, "b"),
    ];
    for (i, key) in keys.iter().enumerate() {
        let source = h.file(&format!("f{}.pdf", i), format!("{}", i).as_bytes());
        let source = if key.kind() == ArtifactKind::Program {
            let nc = source.with_extension("nc");
            fs::rename(&source, &nc).unwrap();
            nc
        } else {
            source
        };
        h.manager.import(key, &source, None, &admin()).await.unwrap();
    }

    let listed = h
        .manager
        .list_documents(DocumentFilter::default().machine(MachineFilter::Only(machine(7))))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|s| s.key.machine() == Some(machine(7))));

    let unassigned = h
        .manager
        .list_documents(DocumentFilter::default().machine(MachineFilter::Unassigned))
        .await
        .unwrap();
    assert_eq!(unassigned.len(), 2, "global + machine-scoped without machine");
    assert!(unassigned.iter().all(|s| s.key.machine().is_none()));
}

// ═══════════════════════════════════════════════════════════════════════════
// Failure handling & blob access
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn blob_write_failure_keeps_previous_active() {
    let h = Harness::new();
    let key = print_for(7, "drawing");
    let first = h
        .manager
        .import(&key, &h.file("v1.pdf", b"B1"), None, &admin())
        .await
        .unwrap();

    // Replace the blob directory with a file so the next write fails
    let dir = h.root.path().join("storage/prints/MACHINE_7/drawing");
    fs::remove_dir_all(&dir).unwrap();
    fs::write(&dir, b"in the way").unwrap();

    let err = h
        .manager
        .import(&key, &h.file("v2.pdf", b"B2"), None, &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IO);

    let history = h.manager.list_revisions(&key).await.unwrap();
    assert_eq!(history.len(), 1, "no row for the unwritten blob");
    let active = h.manager.get_active(&key).await.unwrap().unwrap();
    assert_eq!(active.id, first.revision_id());

    // The staged copy is cleaned up with the failed import
    let staging = h.root.path().join("staging");
    assert_eq!(fs::read_dir(staging).unwrap().count(), 0);
}

#[tokio::test]
async fn keys_read_from_json_are_validated() {
    let h = Harness::new();
    h.manager
        .import(&print_for(7, "drawing"), &h.file("d.pdf", b"D1"), None, &admin())
        .await
        .unwrap();

    // A global key carrying a machine never gets built
    let forged = serde_json::from_str::<DocumentKey>(
        r#"{"kind":"print","scope":"GLOBAL","machine":7,"filename":"spec"}"#,
    );
    assert!(forged.is_err());

    let key: DocumentKey = serde_json::from_str(
        r#"{"kind":"print","scope":"GLOBAL","machine":null,"filename":"spec"}"#,
    )
    .unwrap();
    h.manager
        .import(&key, &h.file("spec.pdf", b"S1"), None, &admin())
        .await
        .unwrap();

    // Every stored lineage still reads back as a key
    let listed = h
        .manager
        .list_documents(DocumentFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|s| s.key == key));
}

#[tokio::test]
async fn export_open_and_verify() {
    let h = Harness::new();
    let key = print_for(7, "Bracket Drawing");
    h.manager
        .import(&key, &h.file("v1.PDF", b"one"), None, &admin())
        .await
        .unwrap();
    let second = h
        .manager
        .import(&key, &h.file("v2.PDF", b"two"), None, &admin())
        .await
        .unwrap();

    let out = tempfile::TempDir::new().unwrap();
    let exported = h
        .manager
        .export(second.revision_id(), out.path())
        .await
        .unwrap();
    assert_eq!(exported, out.path().join("Bracket Drawing_rev2.PDF"));
    assert_eq!(fs::read(&exported).unwrap(), b"two");

    let opened = h.manager.open_revision(second.revision_id()).await.unwrap();
    assert!(opened.starts_with(h.root.path()));
    assert!(h.manager.verify_revision(second.revision_id()).await.unwrap());

    fs::remove_file(&opened).unwrap();
    let err = h
        .manager
        .export(second.revision_id(), out.path())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    let err = h.manager.open_revision(second.revision_id()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = h.manager.export(9_999, out.path()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn store_survives_reopen() {
    let h = Harness::new();
    let key = program_for(1, "op10");
    h.manager
        .import(&key, &h.file("op10.nc", b"G0"), None, &admin())
        .await
        .unwrap();

    let reopened = h.second_seat();
    let active = reopened.get_active(&key).await.unwrap().unwrap();
    assert_eq!(active.revision_number, 1);
    assert_eq!(active.created_by, "alice");
}
