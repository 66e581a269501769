//! System-state migration engine (component C9).
//!
//! Exports reference every entity by a human-stable key (`orgSlug`, agent
//! `hostname`, `policyName`, `repoName`, `groupName`) rather than an opaque
//! id, so an export can be replayed against a different database without
//! carrying the source's primary keys. Every non-organization entity is
//! scoped to its org by carrying `org_slug` alongside its own local key.
//! Import walks entities in dependency order and records an old-key -> new-id
//! mapping per entity type so cross-references can be rewritten as each
//! stage completes.

pub mod redaction;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::crypto::{self, MasterKey};
use crate::error::MigrationError;
use crate::models::{OrgRole, RepositoryType, RetentionPolicy};

/// Literal header prefixing a symmetrically encrypted export document.
pub const ENCRYPTED_EXPORT_HEADER: &str = "KELDRIS_ENCRYPTED_EXPORT_V1:";

/// The only format version this implementation emits or fully understands.
pub const FORMAT_VERSION: &str = "1.0";

/// Dependency order entities must be imported in.
pub const IMPORT_ORDER: &[&str] = &["organization", "agent_group", "user", "policy", "repository", "agent", "schedule"];

fn scoped_key(org_slug: &str, local_key: &str) -> String {
    format!("{org_slug}/{local_key}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgExport {
    pub org_slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGroupExport {
    pub org_slug: String,
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExport {
    pub org_slug: String,
    pub email: String,
    pub name: String,
    pub role: OrgRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyExport {
    pub org_slug: String,
    pub policy_name: String,
    pub paths: Vec<String>,
    pub excludes: Vec<String>,
    pub retention_policy: RetentionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryExport {
    pub org_slug: String,
    pub repo_name: String,
    pub repo_type: RepositoryType,
    /// Present only when the caller supplied an export key to re-encrypt
    /// credentials under; absent otherwise, with a warning attached.
    pub config_base64: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExport {
    pub org_slug: String,
    pub hostname: String,
    pub group_names: Vec<String>,
    pub os_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleExport {
    pub org_slug: String,
    pub policy_name: Option<String>,
    pub target_hostname: Option<String>,
    pub target_group_name: Option<String>,
    pub cron: String,
    pub repo_names: Vec<String>,
}

/// Per-entity-type counts, in [`IMPORT_ORDER`] order. Used both as the
/// export's `metadata.checksums` and as an import run's result counts, so
/// the two are directly comparable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub organizations: usize,
    pub agent_groups: usize,
    pub users: usize,
    pub policies: usize,
    pub repositories: usize,
    pub agents: usize,
    pub schedules: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub checksums: EntityCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub organizations: Vec<OrgExport>,
    pub agent_groups: Vec<AgentGroupExport>,
    pub users: Vec<UserExport>,
    pub policies: Vec<PolicyExport>,
    pub repositories: Vec<RepositoryExport>,
    pub agents: Vec<AgentExport>,
    pub schedules: Vec<ScheduleExport>,
    /// System settings, already passed through [`redaction::redact_value`].
    pub settings: serde_json::Value,
    pub warnings: Vec<String>,
}

/// Build an export document: redact settings unconditionally, warn on any
/// repository exported without credentials, and compute `metadata.checksums`
/// from the entity lists as given.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn build_export(
    organizations: Vec<OrgExport>,
    agent_groups: Vec<AgentGroupExport>,
    users: Vec<UserExport>,
    policies: Vec<PolicyExport>,
    repositories: Vec<RepositoryExport>,
    agents: Vec<AgentExport>,
    schedules: Vec<ScheduleExport>,
    mut settings: serde_json::Value,
    exported_at: DateTime<Utc>,
) -> ExportDocument {
    redaction::redact_value(&mut settings);

    let mut warnings = Vec::new();
    for repo in &repositories {
        if repo.config_base64.is_none() {
            warnings.push(format!("repository '{}' exported without credentials", repo.repo_name));
        }
    }

    let checksums = EntityCounts {
        organizations: organizations.len(),
        agent_groups: agent_groups.len(),
        users: users.len(),
        policies: policies.len(),
        repositories: repositories.len(),
        agents: agents.len(),
        schedules: schedules.len(),
    };

    ExportDocument {
        metadata: ExportMetadata { version: FORMAT_VERSION.to_owned(), exported_at, checksums },
        organizations,
        agent_groups,
        users,
        policies,
        repositories,
        agents,
        schedules,
        settings,
        warnings,
    }
}

/// Serialize `doc`, symmetrically encrypting under `export_key` if given.
///
/// # Errors
///
/// Returns `MigrationError::Store` only if JSON serialization fails, which
/// does not happen for well-formed `ExportDocument` values.
pub fn serialize(doc: &ExportDocument, export_key: Option<&MasterKey>) -> Result<String, MigrationError> {
    let json = serde_json::to_vec(doc).map_err(|e| MigrationError::Store(e.to_string()))?;

    match export_key {
        None => Ok(String::from_utf8_lossy(&json).into_owned()),
        Some(key) => {
            let ciphertext = crypto::encrypt(key, &json).map_err(|e| MigrationError::Store(e.to_string()))?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(ciphertext);
            Ok(format!("{ENCRYPTED_EXPORT_HEADER}{encoded}"))
        }
    }
}

/// Detect the encryption header, decode, decrypt (requiring `export_key`),
/// and deserialize back into an [`ExportDocument`].
///
/// # Errors
///
/// - `MigrationError::MissingExportKey` if the input is encrypted but no key
///   was supplied.
/// - `MigrationError::DecryptionFailed` if decryption fails.
/// - `MigrationError::BadHeader` if the plaintext is not valid JSON.
pub fn parse(input: &str, export_key: Option<&MasterKey>) -> Result<ExportDocument, MigrationError> {
    let json_bytes = if let Some(encoded) = input.strip_prefix(ENCRYPTED_EXPORT_HEADER) {
        let Some(key) = export_key else { return Err(MigrationError::MissingExportKey) };
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| MigrationError::DecryptionFailed(e.to_string()))?;
        crypto::decrypt(key, &ciphertext).map_err(|e| MigrationError::DecryptionFailed(e.to_string()))?
    } else {
        input.as_bytes().to_vec()
    };

    serde_json::from_slice(&json_bytes).map_err(|_| MigrationError::BadHeader)
}

/// Result of validating a parsed export before import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub version_mismatch: bool,
    pub warnings: Vec<String>,
    pub colliding_org_slugs: Vec<String>,
    pub organization_count: usize,
}

/// Check format version and find org-slug collisions against
/// `existing_org_slugs`. Never fails — always returns a report the caller
/// inspects before deciding whether to proceed.
#[must_use]
pub fn validate(doc: &ExportDocument, existing_org_slugs: &[String]) -> ValidationReport {
    let mut report = ValidationReport {
        version_mismatch: doc.metadata.version != FORMAT_VERSION,
        warnings: doc.warnings.clone(),
        organization_count: doc.organizations.len(),
        ..Default::default()
    };

    if report.version_mismatch {
        report.warnings.push(format!("export format version '{}' does not match supported version '{FORMAT_VERSION}'", doc.metadata.version));
    }

    for org in &doc.organizations {
        if existing_org_slugs.contains(&org.org_slug) {
            report.colliding_org_slugs.push(org.org_slug.clone());
        }
    }

    report
}

/// How an import handles a stable-key collision with an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    Skip,
    Replace,
    Rename,
    Fail,
}

/// What to do for one entity given whether its stable key already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDecision {
    /// Insert a new record under `key` (possibly renamed).
    Insert { key: String },
    /// Skip entirely; keep pointing references at the existing record.
    Skip { existing_id: Uuid },
    /// Overwrite the existing record, reusing its id.
    Replace { existing_id: Uuid },
}

/// Resolve one entity's import decision given a possible existing match.
///
/// # Errors
///
/// Returns `MigrationError::Conflict` when `resolution` is `Fail` and a
/// collision exists — the caller aborts the whole import on this error.
pub fn resolve_conflict(
    entity: &str,
    stable_key: &str,
    existing_id: Option<Uuid>,
    resolution: ConflictResolution,
    now_unixsecs: i64,
) -> Result<ImportDecision, MigrationError> {
    match (existing_id, resolution) {
        (None, _) => Ok(ImportDecision::Insert { key: stable_key.to_owned() }),
        (Some(id), ConflictResolution::Skip) => Ok(ImportDecision::Skip { existing_id: id }),
        (Some(id), ConflictResolution::Replace) => Ok(ImportDecision::Replace { existing_id: id }),
        (Some(_), ConflictResolution::Rename) => Ok(ImportDecision::Insert { key: format!("{stable_key}-imported-{now_unixsecs}") }),
        (Some(_), ConflictResolution::Fail) => {
            Err(MigrationError::Conflict { entity: entity.to_owned(), key: stable_key.to_owned() })
        }
    }
}

/// Records old-stable-key -> new-id per entity type, so later import stages
/// can rewrite cross-references (e.g. a schedule's `policy_name` into the
/// policy's freshly assigned id).
#[derive(Debug, Default)]
pub struct IdMappings {
    by_entity_type: HashMap<String, HashMap<String, Uuid>>,
}

impl IdMappings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entity_type: &str, stable_key: &str, new_id: Uuid) {
        self.by_entity_type.entry(entity_type.to_owned()).or_default().insert(stable_key.to_owned(), new_id);
    }

    #[must_use]
    pub fn get(&self, entity_type: &str, stable_key: &str) -> Option<Uuid> {
        self.by_entity_type.get(entity_type)?.get(stable_key).copied()
    }
}

/// Narrow store interface the import engine needs: look up an entity's id
/// by its stable key scoped to its org, and insert or overwrite one.
/// `id_hint` is `Some` only on replace, where the implementation must reuse
/// that id rather than minting a new one.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    async fn find_org(&self, org_slug: &str) -> Result<Option<Uuid>, String>;
    async fn upsert_org(&self, id_hint: Option<Uuid>, org: &OrgExport) -> Result<Uuid, String>;

    async fn find_agent_group(&self, org_id: Uuid, group_name: &str) -> Result<Option<Uuid>, String>;
    async fn upsert_agent_group(&self, id_hint: Option<Uuid>, org_id: Uuid, group: &AgentGroupExport) -> Result<Uuid, String>;

    async fn find_user(&self, org_id: Uuid, email: &str) -> Result<Option<Uuid>, String>;
    async fn upsert_user(&self, id_hint: Option<Uuid>, org_id: Uuid, user: &UserExport) -> Result<Uuid, String>;

    async fn find_policy(&self, org_id: Uuid, policy_name: &str) -> Result<Option<Uuid>, String>;
    async fn upsert_policy(&self, id_hint: Option<Uuid>, org_id: Uuid, policy: &PolicyExport) -> Result<Uuid, String>;

    async fn find_repository(&self, org_id: Uuid, repo_name: &str) -> Result<Option<Uuid>, String>;
    /// `decrypted_config` is `None` when the export carried no credentials
    /// or no import key was supplied to decrypt them.
    async fn upsert_repository(&self, id_hint: Option<Uuid>, org_id: Uuid, repo: &RepositoryExport, decrypted_config: Option<Vec<u8>>) -> Result<Uuid, String>;

    async fn find_agent(&self, org_id: Uuid, hostname: &str) -> Result<Option<Uuid>, String>;
    async fn upsert_agent(&self, id_hint: Option<Uuid>, org_id: Uuid, agent: &AgentExport, group_ids: &[Uuid]) -> Result<Uuid, String>;

    /// Schedules carry no stable key of their own, so import always inserts
    /// a new one rather than resolving a conflict.
    async fn insert_schedule(
        &self,
        org_id: Uuid,
        schedule: &ScheduleExport,
        policy_id: Option<Uuid>,
        target_agent_id: Option<Uuid>,
        target_group_id: Option<Uuid>,
        repo_ids: &[Uuid],
    ) -> Result<Uuid, String>;
}

/// Outcome of running [`import`]: per-entity-type counts (comparable against
/// the export's `metadata.checksums` when importing into an empty store
/// with no conflicts), any non-fatal warnings, and the old-key -> new-id
/// mappings produced along the way.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub counts: EntityCounts,
    pub warnings: Vec<String>,
    pub mappings: IdMappings,
}

/// Import `doc` against `store`, in [`IMPORT_ORDER`]. Every entity with a
/// stable key goes through [`resolve_conflict`] under `resolution`;
/// schedules have none and are always inserted fresh. Repository
/// credentials are decrypted under `import_key` when both are present; a
/// credentialed repository imported without `import_key` is inserted
/// without credentials and a warning is attached.
///
/// When `dry_run` is `true`, no store writes happen — lookups still run so
/// conflicts are detected and reported, and a fresh id stands in for each
/// would-be insert so cross-reference rewriting during the dry run matches
/// what a real import would produce.
///
/// # Errors
///
/// Returns `MigrationError::Conflict` immediately on the first collision
/// when `resolution` is `Fail`, `MigrationError::UnknownReference` if an
/// entity references a stable key not present earlier in the same import,
/// `MigrationError::DecryptionFailed` if a repository's credentials fail to
/// decrypt, and `MigrationError::Store` if the store itself errors.
pub async fn import(
    store: &dyn MigrationStore,
    doc: &ExportDocument,
    resolution: ConflictResolution,
    import_key: Option<&MasterKey>,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<ImportReport, MigrationError> {
    let now_unixsecs = now.timestamp();
    let mut mappings = IdMappings::new();
    let mut counts = EntityCounts::default();
    let mut warnings = Vec::new();

    for org in &doc.organizations {
        let existing = store.find_org(&org.org_slug).await.map_err(MigrationError::Store)?;
        let decision = resolve_conflict("organization", &org.org_slug, existing, resolution, now_unixsecs)?;
        let id = match &decision {
            ImportDecision::Skip { existing_id } => *existing_id,
            ImportDecision::Replace { existing_id } => {
                if !dry_run {
                    store.upsert_org(Some(*existing_id), org).await.map_err(MigrationError::Store)?;
                }
                *existing_id
            }
            ImportDecision::Insert { key } => {
                let renamed = OrgExport { org_slug: key.clone(), ..org.clone() };
                if dry_run { Uuid::new_v4() } else { store.upsert_org(None, &renamed).await.map_err(MigrationError::Store)? }
            }
        };
        mappings.record("organization", &org.org_slug, id);
        counts.organizations += 1;
    }

    for group in &doc.agent_groups {
        let Some(org_id) = mappings.get("organization", &group.org_slug) else {
            return Err(MigrationError::UnknownReference { entity: "agent_group".to_owned(), referenced_entity: "organization".to_owned(), key: group.org_slug.clone() });
        };
        let existing = store.find_agent_group(org_id, &group.group_name).await.map_err(MigrationError::Store)?;
        let decision = resolve_conflict("agent_group", &group.group_name, existing, resolution, now_unixsecs)?;
        let id = match &decision {
            ImportDecision::Skip { existing_id } => *existing_id,
            ImportDecision::Replace { existing_id } => {
                if !dry_run {
                    store.upsert_agent_group(Some(*existing_id), org_id, group).await.map_err(MigrationError::Store)?;
                }
                *existing_id
            }
            ImportDecision::Insert { key } => {
                let renamed = AgentGroupExport { group_name: key.clone(), ..group.clone() };
                if dry_run { Uuid::new_v4() } else { store.upsert_agent_group(None, org_id, &renamed).await.map_err(MigrationError::Store)? }
            }
        };
        mappings.record("agent_group", &scoped_key(&group.org_slug, &group.group_name), id);
        counts.agent_groups += 1;
    }

    for user in &doc.users {
        let Some(org_id) = mappings.get("organization", &user.org_slug) else {
            return Err(MigrationError::UnknownReference { entity: "user".to_owned(), referenced_entity: "organization".to_owned(), key: user.org_slug.clone() });
        };
        let existing = store.find_user(org_id, &user.email).await.map_err(MigrationError::Store)?;
        let decision = resolve_conflict("user", &user.email, existing, resolution, now_unixsecs)?;
        let id = match &decision {
            ImportDecision::Skip { existing_id } => *existing_id,
            ImportDecision::Replace { existing_id } => {
                if !dry_run {
                    store.upsert_user(Some(*existing_id), org_id, user).await.map_err(MigrationError::Store)?;
                }
                *existing_id
            }
            ImportDecision::Insert { key } => {
                let renamed = UserExport { email: key.clone(), ..user.clone() };
                if dry_run { Uuid::new_v4() } else { store.upsert_user(None, org_id, &renamed).await.map_err(MigrationError::Store)? }
            }
        };
        mappings.record("user", &scoped_key(&user.org_slug, &user.email), id);
        counts.users += 1;
    }

    for policy in &doc.policies {
        let Some(org_id) = mappings.get("organization", &policy.org_slug) else {
            return Err(MigrationError::UnknownReference { entity: "policy".to_owned(), referenced_entity: "organization".to_owned(), key: policy.org_slug.clone() });
        };
        let existing = store.find_policy(org_id, &policy.policy_name).await.map_err(MigrationError::Store)?;
        let decision = resolve_conflict("policy", &policy.policy_name, existing, resolution, now_unixsecs)?;
        let id = match &decision {
            ImportDecision::Skip { existing_id } => *existing_id,
            ImportDecision::Replace { existing_id } => {
                if !dry_run {
                    store.upsert_policy(Some(*existing_id), org_id, policy).await.map_err(MigrationError::Store)?;
                }
                *existing_id
            }
            ImportDecision::Insert { key } => {
                let renamed = PolicyExport { policy_name: key.clone(), ..policy.clone() };
                if dry_run { Uuid::new_v4() } else { store.upsert_policy(None, org_id, &renamed).await.map_err(MigrationError::Store)? }
            }
        };
        mappings.record("policy", &scoped_key(&policy.org_slug, &policy.policy_name), id);
        counts.policies += 1;
    }

    for repo in &doc.repositories {
        let Some(org_id) = mappings.get("organization", &repo.org_slug) else {
            return Err(MigrationError::UnknownReference { entity: "repository".to_owned(), referenced_entity: "organization".to_owned(), key: repo.org_slug.clone() });
        };

        let decrypted_config = match (&repo.config_base64, import_key) {
            (Some(encoded), Some(key)) => {
                let ciphertext = base64::engine::general_purpose::STANDARD.decode(encoded).map_err(|e| MigrationError::DecryptionFailed(e.to_string()))?;
                Some(crypto::decrypt(key, &ciphertext).map_err(|e| MigrationError::DecryptionFailed(e.to_string()))?)
            }
            (Some(_), None) => {
                warnings.push(format!("repository '{}' imported without credentials", repo.repo_name));
                None
            }
            (None, _) => None,
        };

        let existing = store.find_repository(org_id, &repo.repo_name).await.map_err(MigrationError::Store)?;
        let decision = resolve_conflict("repository", &repo.repo_name, existing, resolution, now_unixsecs)?;
        let id = match &decision {
            ImportDecision::Skip { existing_id } => *existing_id,
            ImportDecision::Replace { existing_id } => {
                if !dry_run {
                    store.upsert_repository(Some(*existing_id), org_id, repo, decrypted_config.clone()).await.map_err(MigrationError::Store)?;
                }
                *existing_id
            }
            ImportDecision::Insert { key } => {
                let renamed = RepositoryExport { repo_name: key.clone(), ..repo.clone() };
                if dry_run {
                    Uuid::new_v4()
                } else {
                    store.upsert_repository(None, org_id, &renamed, decrypted_config.clone()).await.map_err(MigrationError::Store)?
                }
            }
        };
        mappings.record("repository", &scoped_key(&repo.org_slug, &repo.repo_name), id);
        counts.repositories += 1;
    }

    for agent in &doc.agents {
        let Some(org_id) = mappings.get("organization", &agent.org_slug) else {
            return Err(MigrationError::UnknownReference { entity: "agent".to_owned(), referenced_entity: "organization".to_owned(), key: agent.org_slug.clone() });
        };

        let mut group_ids = Vec::with_capacity(agent.group_names.len());
        for group_name in &agent.group_names {
            let Some(group_id) = mappings.get("agent_group", &scoped_key(&agent.org_slug, group_name)) else {
                return Err(MigrationError::UnknownReference { entity: "agent".to_owned(), referenced_entity: "agent_group".to_owned(), key: group_name.clone() });
            };
            group_ids.push(group_id);
        }

        let existing = store.find_agent(org_id, &agent.hostname).await.map_err(MigrationError::Store)?;
        let decision = resolve_conflict("agent", &agent.hostname, existing, resolution, now_unixsecs)?;
        let id = match &decision {
            ImportDecision::Skip { existing_id } => *existing_id,
            ImportDecision::Replace { existing_id } => {
                if !dry_run {
                    store.upsert_agent(Some(*existing_id), org_id, agent, &group_ids).await.map_err(MigrationError::Store)?;
                }
                *existing_id
            }
            ImportDecision::Insert { key } => {
                let renamed = AgentExport { hostname: key.clone(), ..agent.clone() };
                if dry_run { Uuid::new_v4() } else { store.upsert_agent(None, org_id, &renamed, &group_ids).await.map_err(MigrationError::Store)? }
            }
        };
        mappings.record("agent", &scoped_key(&agent.org_slug, &agent.hostname), id);
        counts.agents += 1;
    }

    for schedule in &doc.schedules {
        let Some(org_id) = mappings.get("organization", &schedule.org_slug) else {
            return Err(MigrationError::UnknownReference { entity: "schedule".to_owned(), referenced_entity: "organization".to_owned(), key: schedule.org_slug.clone() });
        };

        let policy_id = match &schedule.policy_name {
            Some(name) => {
                let Some(id) = mappings.get("policy", &scoped_key(&schedule.org_slug, name)) else {
                    return Err(MigrationError::UnknownReference { entity: "schedule".to_owned(), referenced_entity: "policy".to_owned(), key: name.clone() });
                };
                Some(id)
            }
            None => None,
        };

        let target_agent_id = match &schedule.target_hostname {
            Some(hostname) => {
                let Some(id) = mappings.get("agent", &scoped_key(&schedule.org_slug, hostname)) else {
                    return Err(MigrationError::UnknownReference { entity: "schedule".to_owned(), referenced_entity: "agent".to_owned(), key: hostname.clone() });
                };
                Some(id)
            }
            None => None,
        };

        let target_group_id = match &schedule.target_group_name {
            Some(name) => {
                let Some(id) = mappings.get("agent_group", &scoped_key(&schedule.org_slug, name)) else {
                    return Err(MigrationError::UnknownReference { entity: "schedule".to_owned(), referenced_entity: "agent_group".to_owned(), key: name.clone() });
                };
                Some(id)
            }
            None => None,
        };

        let mut repo_ids = Vec::with_capacity(schedule.repo_names.len());
        for repo_name in &schedule.repo_names {
            let Some(id) = mappings.get("repository", &scoped_key(&schedule.org_slug, repo_name)) else {
                return Err(MigrationError::UnknownReference { entity: "schedule".to_owned(), referenced_entity: "repository".to_owned(), key: repo_name.clone() });
            };
            repo_ids.push(id);
        }

        if !dry_run {
            store.insert_schedule(org_id, schedule, policy_id, target_agent_id, target_group_id, &repo_ids).await.map_err(MigrationError::Store)?;
        }
        counts.schedules += 1;
    }

    Ok(ImportReport { counts, warnings, mappings })
}
