//! Domain entities shared across every component.
//!
//! All IDs are UUIDs. Timestamps are `DateTime<Utc>`. Every row type derives
//! `sqlx::FromRow` so the Postgres store implementations can `SELECT *`
//! directly into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Tenancy ──────────────────────────────────────────────────────────

/// The root of tenancy. Every other entity except superusers belongs to
/// exactly one organization.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub max_concurrent_backups: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Org membership role. Ordered from least to most privileged for comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OrgRole {
    Readonly,
    Member,
    Admin,
    Owner,
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Readonly => "readonly",
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        };
        write!(f, "{s}")
    }
}

/// A user's membership in an organization. `(user_id, org_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrgMembership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: OrgRole,
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
    PendingVerification,
}

/// A platform user. Exactly one of `oidc_subject`/`password_hash` is set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: OrgRole,
    pub status: UserStatus,
    pub is_superuser: bool,
    pub oidc_subject: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub email_verified: bool,
}

// ── Agents ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Active,
    Disabled,
}

/// A backup client installed on a target host.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agent {
    pub id: Uuid,
    pub org_id: Uuid,
    pub hostname: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub status: AgentStatus,
    pub os_info: String,
    pub debug_mode: bool,
    pub network_mounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentGroup {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
}

// ── Repositories, policies, schedules ───────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RepositoryType {
    Local,
    S3,
    B2,
    Dropbox,
    Sftp,
    Rest,
}

/// A named backup destination. `config_encrypted` is AES-256-GCM ciphertext
/// of backend credentials under the process master key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Repository {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    #[sqlx(rename = "type_")]
    pub repo_type: RepositoryType,
    #[serde(skip_serializing)]
    pub config_encrypted: Vec<u8>,
}

/// `{keepLast, keepHourly, keepDaily, keepWeekly, keepMonthly, keepYearly}`.
/// At least one field must be non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub keep_last: u32,
    pub keep_hourly: u32,
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
    pub keep_yearly: u32,
}

impl RetentionPolicy {
    /// True when at least one field is non-zero.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.keep_last != 0
            || self.keep_hourly != 0
            || self.keep_daily != 0
            || self.keep_weekly != 0
            || self.keep_monthly != 0
            || self.keep_yearly != 0
    }

    /// Merge rule: "non-zero/non-empty in override wins".
    #[must_use]
    pub fn merge_override(base: &Self, over: &Self) -> Self {
        Self {
            keep_last: if over.keep_last != 0 { over.keep_last } else { base.keep_last },
            keep_hourly: if over.keep_hourly != 0 { over.keep_hourly } else { base.keep_hourly },
            keep_daily: if over.keep_daily != 0 { over.keep_daily } else { base.keep_daily },
            keep_weekly: if over.keep_weekly != 0 { over.keep_weekly } else { base.keep_weekly },
            keep_monthly: if over.keep_monthly != 0 { over.keep_monthly } else { base.keep_monthly },
            keep_yearly: if over.keep_yearly != 0 { over.keep_yearly } else { base.keep_yearly },
        }
    }
}

/// `{startHour, endHour, daysOfWeek}`. Hours are 0-23, days 0 (Sunday) - 6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub days_of_week: Vec<u8>,
}

/// Reusable template composed into schedules.
///
/// Not derived as `sqlx::FromRow` because `retention_policy` is stored as six
/// flat integer columns in Postgres; `keldris-core::store::policy` maps rows
/// to this type by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub paths: Vec<String>,
    pub excludes: Vec<String>,
    pub retention_policy: RetentionPolicy,
    pub bandwidth_limit_kb: Option<i32>,
    pub excluded_hours: Vec<i16>,
    pub cron_expression: Option<String>,
}

/// Either `agent_id` or `agent_group_id` is set, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleTarget {
    Agent(Uuid),
    AgentGroup(Uuid),
}

/// Priority-ordered candidate repository for a schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleRepository {
    pub repo_id: Uuid,
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
}

/// A cron-driven association of a policy, an agent-or-group, and an ordered
/// list of candidate repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub org_id: Uuid,
    pub target: ScheduleTarget,
    pub policy_id: Option<Uuid>,
    pub cron: String,
    pub paths: Vec<String>,
    pub excludes: Vec<String>,
    pub retention_policy: RetentionPolicy,
    pub repositories: Vec<ScheduleRepository>,
    pub enabled: bool,
    pub backup_type: BackupType,
}

impl Schedule {
    /// Effective paths/excludes/retention after composing with `policy`.
    /// Non-zero/non-empty fields on the schedule win over the policy.
    #[must_use]
    pub fn effective(&self, policy: Option<&Policy>) -> EffectiveScheduleConfig {
        let Some(policy) = policy else {
            return EffectiveScheduleConfig {
                paths: self.paths.clone(),
                excludes: self.excludes.clone(),
                retention_policy: self.retention_policy,
                bandwidth_limit_kb: None,
                excluded_hours: Vec::new(),
            };
        };

        EffectiveScheduleConfig {
            paths: if self.paths.is_empty() { policy.paths.clone() } else { self.paths.clone() },
            excludes: if self.excludes.is_empty() { policy.excludes.clone() } else { self.excludes.clone() },
            retention_policy: RetentionPolicy::merge_override(&policy.retention_policy, &self.retention_policy),
            bandwidth_limit_kb: policy.bandwidth_limit_kb,
            excluded_hours: policy.excluded_hours.clone(),
        }
    }
}

/// Result of composing a schedule with its (optional) policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveScheduleConfig {
    pub paths: Vec<String>,
    pub excludes: Vec<String>,
    pub retention_policy: RetentionPolicy,
    pub bandwidth_limit_kb: Option<i32>,
    pub excluded_hours: Vec<i16>,
}

// ── Backups ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum BackupStatus {
    Running,
    Completed,
    Failed,
    Canceled,
}

impl BackupStatus {
    /// Status transitions honor `running -> {completed, failed, canceled}`
    /// only; once terminal, a backup never returns to running.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completed | Self::Failed | Self::Canceled)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub agent_id: Uuid,
    pub repo_id: Uuid,
    pub status: BackupStatus,
    pub snapshot_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub size_bytes: Option<i64>,
    pub error_message: Option<String>,
}

impl Backup {
    /// Attempt a status transition, honoring the monotonic invariant.
    ///
    /// # Errors
    ///
    /// Returns the attempted `next` status back as `Err` if the transition
    /// is not allowed (e.g. a terminal backup being re-transitioned).
    pub fn transition(&mut self, next: BackupStatus) -> Result<(), BackupStatus> {
        if !self.status.can_transition_to(next) {
            return Err(next);
        }
        self.status = next;
        Ok(())
    }
}

// ── Registration codes & password/email tokens ──────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationCode {
    pub id: Uuid,
    pub org_id: Uuid,
    pub issuer_user_id: Uuid,
    pub code: String,
    pub hostname: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by_agent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: u32,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_number: bool,
    pub require_special: bool,
    pub history_count: u32,
    pub expiration_days: Option<u32>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_upper: true,
            require_lower: true,
            require_number: true,
            require_special: true,
            history_count: 5,
            expiration_days: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoGroupMapping {
    pub id: Uuid,
    pub org_id: Uuid,
    pub oidc_group_name: String,
    pub role: OrgRole,
}

// ── Maintenance windows ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notify_before_minutes: i32,
    pub notification_sent: bool,
}

impl MaintenanceWindow {
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    #[must_use]
    pub fn should_notify_at(&self, now: DateTime<Utc>) -> bool {
        !self.notification_sent
            && now + chrono::Duration::minutes(i64::from(self.notify_before_minutes)) >= self.starts_at
    }
}

// ── Webhooks ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub org_id: Uuid,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret_encrypted: Vec<u8>,
    pub events: Vec<String>,
    pub headers: std::collections::HashMap<String, String>,
    pub retry_count: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum WebhookDeliveryStatus {
    Pending,
    Delivered,
    Retrying,
    Failed,
}

impl WebhookDeliveryStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempt_number: i32,
    pub max_attempts: i32,
    pub status: WebhookDeliveryStatus,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

// ── Database backups ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DatabaseBackupStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseBackup {
    pub id: Uuid,
    pub status: DatabaseBackupStatus,
    pub file_path: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

// ── SLA ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaDefinition {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub rpo_minutes: Option<i64>,
    pub rto_minutes: Option<i64>,
    pub uptime_percentage: Option<f64>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaCompliance {
    pub id: Uuid,
    pub sla_id: Uuid,
    pub assignment_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub rpo_compliant: bool,
    pub rto_compliant: bool,
    pub uptime_compliant: bool,
}

impl SlaCompliance {
    #[must_use]
    pub fn is_fully_compliant(&self) -> bool {
        self.rpo_compliant && self.rto_compliant && self.uptime_compliant
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaBreach {
    pub id: Uuid,
    pub compliance_id: Uuid,
    pub dimension: String,
    pub expected_value: f64,
    pub actual_value: f64,
    pub description: String,
}

// ── Audit ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    /// If this action happened during an impersonated session, the id of
    /// the original (superuser) identity who initiated it.
    pub acted_on_behalf_of: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub result: String,
    pub ip: String,
    pub user_agent: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

// ── Session state ────────────────────────────────────────────────────

/// Impersonation fields, kept as a single sub-struct so session state and
/// the original identity never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpersonationState {
    pub original_user_id: Uuid,
    pub impersonation_log_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user_id: Uuid,
    pub oidc_subject: Option<String>,
    pub email: String,
    pub name: String,
    pub current_org_id: Uuid,
    pub current_org_role: OrgRole,
    pub authenticated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_superuser: bool,
    pub impersonating: Option<Uuid>,
    pub impersonation: Option<ImpersonationState>,
}
