//! Shared fixtures for docvault-storage integration tests

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use docvault_storage::{
    Actor, AllowAll, ArtifactKind, Authorizer, DocumentKey, MachineRef, MemoryAuditSink,
    RevisionManager, RolePolicy, SqliteRevisionStore, StoreConfig,
};
use tempfile::TempDir;

/// Data root, source directory, file-backed store and captured audit log
pub struct Harness {
    pub root: TempDir,
    pub sources: TempDir,
    pub audit: MemoryAuditSink,
    pub manager: RevisionManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_authorizer(Arc::new(AllowAll))
    }

    /// Roles from the default configuration (admin, engineer)
    pub fn with_role_policy() -> Self {
        let policy = RolePolicy::from_config(&StoreConfig::new("/unused"));
        Self::with_authorizer(Arc::new(policy))
    }

    pub fn with_authorizer(authorizer: Arc<dyn Authorizer>) -> Self {
        let root = TempDir::new().expect("data root");
        let audit = MemoryAuditSink::new();
        let manager = manager_for(&root, authorizer, &audit);
        Self {
            root,
            sources: TempDir::new().expect("source dir"),
            audit,
            manager,
        }
    }

    /// Second manager on the same database file and blob tree
    pub fn second_seat(&self) -> RevisionManager {
        manager_for(&self.root, Arc::new(AllowAll), &self.audit)
    }

    pub fn config(&self) -> StoreConfig {
        StoreConfig::new(self.root.path())
    }

    /// Write a source file and return its path
    pub fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.sources.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, bytes).unwrap();
        path
    }
}

fn manager_for(
    root: &TempDir,
    authorizer: Arc<dyn Authorizer>,
    audit: &MemoryAuditSink,
) -> RevisionManager {
    let config = StoreConfig::new(root.path());
    let store = SqliteRevisionStore::open(&config).expect("open store");
    RevisionManager::new(config, Arc::new(store), authorizer, Arc::new(audit.clone()))
}

pub fn admin() -> Actor {
    Actor::new("alice", "admin")
}

pub fn operator() -> Actor {
    Actor::new("op1", "operator")
}

pub fn machine(id: i64) -> MachineRef {
    MachineRef::new(id).unwrap()
}

pub fn print_for(machine_id: i64, filename: &str) -> DocumentKey {
    DocumentKey::for_machine(ArtifactKind::Print, machine(machine_id), filename).unwrap()
}

pub fn program_for(machine_id: i64, filename: &str) -> DocumentKey {
    DocumentKey::for_machine(ArtifactKind::Program, machine(machine_id), filename).unwrap()
}
