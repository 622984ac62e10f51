//! Permission and audit collaborators
//!
//! Every mutating operation asks an `Authorizer` first and reports its
//! outcome to an `AuditSink`. Both are ports so callers can plug in their
//! own user management and audit log.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StorageError};

/// Permission required by every mutating operation
pub const MANAGE_DOCUMENTS: &str = "manage_documents";

/// Granted to a role to allow everything
pub const WILDCARD_PERMISSION: &str = "*";

pub const PERMISSION_DENIED_ACTION: &str = "permission.denied";

/// Identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub role: String,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authorization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_allowed(&self, actor: &Actor, permission: &str) -> bool;
}

/// Role name → granted permissions (role names compare case-insensitively)
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    grants: HashMap<String, HashSet<String>>,
}

impl RolePolicy {
    pub fn new(roles: &BTreeMap<String, Vec<String>>) -> Self {
        let mut policy = Self::default();
        for (role, permissions) in roles {
            for permission in permissions {
                policy = policy.grant(role, permission);
            }
        }
        policy
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.roles)
    }

    pub fn grant(mut self, role: &str, permission: &str) -> Self {
        self.grants
            .entry(role.trim().to_lowercase())
            .or_default()
            .insert(permission.to_string());
        self
    }

    pub fn allows(&self, role: &str, permission: &str) -> bool {
        self.grants
            .get(&role.trim().to_lowercase())
            .map(|granted| granted.contains(permission) || granted.contains(WILDCARD_PERMISSION))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Authorizer for RolePolicy {
    async fn is_allowed(&self, actor: &Actor, permission: &str) -> bool {
        self.allows(&actor.role, permission)
    }
}

/// Grants everything (single-user automation, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn is_allowed(&self, _actor: &Actor, _permission: &str) -> bool {
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub actor: String,
    pub details: BTreeMap<String, String>,
    pub success: bool,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, actor: &Actor, success: bool) -> Self {
        Self {
            action: action.into(),
            actor: actor.username.clone(),
            details: BTreeMap::new(),
            success,
        }
    }

    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// `SUCCESS program_file.create | filename=op10, revision=2`
    pub fn summary(&self) -> String {
        let status = if self.success { "SUCCESS" } else { "FAIL" };
        if self.details.is_empty() {
            return format!("{} {}", status, self.action);
        }
        let compact = self
            .details
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {} | {}", status, self.action, compact)
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Emits audit records as `tracing` events on target `docvault::audit`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        if record.success {
            info!(target: "docvault::audit", action = %record.action, actor = %record.actor, "{}", record.summary());
        } else {
            warn!(target: "docvault::audit", action = %record.action, actor = %record.actor, "{}", record.summary());
        }
    }
}

/// Keeps records in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.action.clone()).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Authorizer + audit sink pair shared by the async facades
#[derive(Clone)]
pub struct AccessControl {
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditSink>,
}

impl AccessControl {
    pub fn new(authorizer: Arc<dyn Authorizer>, audit: Arc<dyn AuditSink>) -> Self {
        Self { authorizer, audit }
    }

    /// Fail with `PermissionDenied` (and audit the denial) unless allowed
    pub async fn require(&self, actor: &Actor, permission: &str, action: &str) -> Result<()> {
        if self.authorizer.is_allowed(actor, permission).await {
            return Ok(());
        }
        self.audit
            .record(
                AuditRecord::new(PERMISSION_DENIED_ACTION, actor, false)
                    .detail("permission", permission)
                    .detail("action", action),
            )
            .await;
        Err(StorageError::permission_denied(&actor.username, action))
    }

    /// Audit an operation's outcome with `error` on failure
    pub async fn record_outcome<T>(
        &self,
        action: &str,
        actor: &Actor,
        details: BTreeMap<String, String>,
        outcome: &Result<T>,
    ) {
        let mut record = AuditRecord::new(action, actor, outcome.is_ok());
        record.details = details;
        if let Err(e) = outcome {
            record = record.detail("error", &e.message);
        }
        self.audit.record(record).await;
    }
}
