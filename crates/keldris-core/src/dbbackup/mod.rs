//! Database-backup engine (component C10).
//!
//! One run: `pg_dump` (subprocess) → gzip → AES-256-GCM encrypt under the
//! process master key → checksum → persist. Verification reverses the
//! pipeline and asserts a recognizable marker survives in the decompressed
//! SQL text.

use std::io::{Read, Write};
use std::process::Stdio;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::crypto::{self, MasterKey};
use crate::error::DbBackupError;
use crate::models::{DatabaseBackup, DatabaseBackupStatus};

/// Markers that must survive decompression+decryption, any one of which
/// proves the file is a genuine `pg_dump` plaintext.
const VERIFICATION_MARKERS: &[&str] = &["PostgreSQL", "pg_dump", "CREATE"];
const HEALTH_STALE_HOURS: i64 = 25;

#[derive(Debug, Clone)]
pub struct DbBackupConfig {
    pub cron: String,
    pub retention_days: i64,
    pub max_backups: Option<u32>,
    pub gzip_level: u32,
    pub include_blobs: bool,
    pub backup_dir: String,
}

impl Default for DbBackupConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 2 * * *".to_owned(),
            retention_days: 30,
            max_backups: None,
            gzip_level: 6,
            include_blobs: false,
            backup_dir: "/var/lib/keldris/db-backups".to_owned(),
        }
    }
}

/// Store interface for database-backup records.
#[async_trait]
pub trait DbBackupStore: Send + Sync {
    async fn insert(&self, record: DatabaseBackup) -> Result<(), String>;
    async fn update(&self, record: &DatabaseBackup) -> Result<(), String>;
    async fn latest(&self) -> Result<Option<DatabaseBackup>, String>;
    async fn older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<DatabaseBackup>, String>;
    async fn all_ordered_by_age_desc(&self) -> Result<Vec<DatabaseBackup>, String>;
    async fn delete(&self, id: Uuid) -> Result<(), String>;
}

/// Runs `pg_dump` and returns its stdout. Boundary so the engine never
/// depends on `tokio::process` directly in its core logic path.
#[async_trait]
pub trait PgDumpRunner: Send + Sync {
    async fn dump(&self, include_blobs: bool) -> Result<Vec<u8>, DbBackupError>;
}

/// Shells out to `pg_dump --format=plain --no-owner --no-acl --clean --if-exists`.
pub struct ProcessPgDumpRunner {
    pub database_url: String,
}

#[async_trait]
impl PgDumpRunner for ProcessPgDumpRunner {
    async fn dump(&self, include_blobs: bool) -> Result<Vec<u8>, DbBackupError> {
        let mut command = tokio::process::Command::new("pg_dump");
        command
            .arg(&self.database_url)
            .arg("--format=plain")
            .arg("--no-owner")
            .arg("--no-acl")
            .arg("--clean")
            .arg("--if-exists")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if include_blobs {
            command.arg("--blobs");
        }

        let output = command.output().await.map_err(|e| DbBackupError::DumpFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(DbBackupError::DumpFailed(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(output.stdout)
    }
}

/// Gzip-compress `data` at `level` (0-9, clamped).
///
/// # Errors
///
/// Returns `DbBackupError::Io` if the in-memory encoder fails.
pub fn gzip_compress(data: &[u8], level: u32) -> Result<Vec<u8>, DbBackupError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress gzip bytes.
///
/// # Errors
///
/// Returns `DbBackupError::Io` if the stream is not valid gzip.
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>, DbBackupError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Run one full database-backup pipeline: dump, compress, encrypt, checksum,
/// then persist to `config.backup_dir` at `keldris-backup-<timestamp>.sql.gz.enc`.
///
/// # Errors
///
/// Returns the first pipeline-stage error; the caller is expected to have
/// already persisted the `running` record and will mark it `failed` on
/// `Err`, per the component's contract.
pub async fn run_backup(
    runner: &dyn PgDumpRunner,
    config: &DbBackupConfig,
    master_key: &MasterKey,
    now: DateTime<Utc>,
) -> Result<DatabaseBackup, DbBackupError> {
    let dump = runner.dump(config.include_blobs).await?;
    let compressed = gzip_compress(&dump, config.gzip_level)?;
    let encrypted = crypto::encrypt(master_key, &compressed).map_err(|e| DbBackupError::DumpFailed(e.to_string()))?;
    let checksum = format!("sha256:{}", crypto::sha256_hex(&encrypted));

    let filename = format!("keldris-backup-{}.sql.gz.enc", now.format("%Y%m%d-%H%M%S"));
    let file_path = format!("{}/{filename}", config.backup_dir.trim_end_matches('/'));

    write_backup_file(&config.backup_dir, &file_path, &encrypted).await?;

    Ok(DatabaseBackup {
        id: Uuid::new_v4(),
        status: DatabaseBackupStatus::Completed,
        file_path,
        size_bytes: encrypted.len() as i64,
        checksum,
        started_at: now,
        finished_at: Some(now),
        error_message: None,
    })
}

/// Create `backup_dir` (mode `0750`) if needed, then write `bytes` to
/// `file_path` (mode `0600`).
async fn write_backup_file(backup_dir: &str, file_path: &str, bytes: &[u8]) -> Result<(), DbBackupError> {
    tokio::fs::create_dir_all(backup_dir).await?;
    #[cfg(unix)]
    tokio::fs::set_permissions(backup_dir, std::fs::Permissions::from_mode(0o750)).await?;

    let mut file = tokio::fs::OpenOptions::new().write(true).create(true).truncate(true).open(file_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    #[cfg(unix)]
    tokio::fs::set_permissions(file_path, std::fs::Permissions::from_mode(0o600)).await?;

    Ok(())
}

/// Re-derive the checksum over `encrypted_bytes` and confirm it matches the
/// recorded value, then decrypt, decompress, and assert one of the
/// verification markers appears in the first 1 KiB of plaintext.
///
/// # Errors
///
/// - `DbBackupError::ChecksumMismatch` if the recomputed checksum differs.
/// - `DbBackupError::DecryptionFailed` if decryption fails.
/// - `DbBackupError::VerificationMarkerMissing` if no marker is found.
pub fn verify_backup_bytes(encrypted_bytes: &[u8], expected_checksum: &str, master_key: &MasterKey) -> Result<(), DbBackupError> {
    let actual = format!("sha256:{}", crypto::sha256_hex(encrypted_bytes));
    if actual != expected_checksum {
        return Err(DbBackupError::ChecksumMismatch { expected: expected_checksum.to_owned(), actual });
    }

    let compressed = crypto::decrypt(master_key, encrypted_bytes).map_err(|e| DbBackupError::DecryptionFailed(e.to_string()))?;
    let plaintext = gzip_decompress(&compressed)?;

    let prefix_len = plaintext.len().min(1024);
    let prefix = String::from_utf8_lossy(&plaintext[..prefix_len]);
    if VERIFICATION_MARKERS.iter().any(|marker| prefix.contains(marker)) {
        Ok(())
    } else {
        Err(DbBackupError::VerificationMarkerMissing)
    }
}

/// Read the backup file at `path` and run [`verify_backup_bytes`] against
/// its contents. The store lookup from a backup id to its `file_path` is
/// the caller's job; this takes the path directly.
///
/// # Errors
///
/// Returns `DbBackupError::Io` if the file cannot be read, plus every error
/// `verify_backup_bytes` can return.
pub async fn verify_backup(path: &str, expected_checksum: &str, master_key: &MasterKey) -> Result<(), DbBackupError> {
    let encrypted_bytes = tokio::fs::read(path).await?;
    verify_backup_bytes(&encrypted_bytes, expected_checksum, master_key)
}

/// Delete records (and, best-effort, their files) older than
/// `config.retention_days`, then enforce `max_backups` by deleting
/// oldest-first if the count still exceeds the cap. File-removal errors are
/// logged but never block record deletion.
pub async fn run_retention_sweep(store: &dyn DbBackupStore, config: &DbBackupConfig, now: DateTime<Utc>) -> Result<u32, String> {
    let cutoff = now - chrono::Duration::days(config.retention_days);
    let expired = store.older_than(cutoff).await?;
    let mut deleted = 0u32;

    for record in expired {
        if let Err(e) = tokio::fs::remove_file(&record.file_path).await {
            tracing::warn!(error = %e, path = %record.file_path, "failed to remove expired database backup file");
        }
        store.delete(record.id).await?;
        deleted += 1;
    }

    if let Some(max) = config.max_backups {
        let remaining = store.all_ordered_by_age_desc().await?;
        for record in remaining.into_iter().skip(max as usize) {
            if let Err(e) = tokio::fs::remove_file(&record.file_path).await {
                tracing::warn!(error = %e, path = %record.file_path, "failed to remove over-cap database backup file");
            }
            store.delete(record.id).await?;
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Unhealthy if no record exists, the latest record failed, or it is older
/// than `HEALTH_STALE_HOURS`.
#[must_use]
pub fn is_healthy(latest: Option<&DatabaseBackup>, now: DateTime<Utc>) -> bool {
    match latest {
        None => false,
        Some(record) => record.status != DatabaseBackupStatus::Failed && now - record.started_at <= chrono::Duration::hours(HEALTH_STALE_HOURS),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct FakeRunner {
        dump: Vec<u8>,
    }

    #[async_trait]
    impl PgDumpRunner for FakeRunner {
        async fn dump(&self, _include_blobs: bool) -> Result<Vec<u8>, DbBackupError> {
            Ok(self.dump.clone())
        }
    }

    fn sample_key() -> MasterKey {
        MasterKey::from_bytes(&[9u8; 32]).unwrap()
    }

    fn temp_backup_dir(name: &str) -> String {
        std::env::temp_dir().join(format!("keldris-dbbackup-test-{name}-{}", Uuid::new_v4())).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn full_pipeline_produces_verifiable_backup() {
        let runner = FakeRunner { dump: b"-- PostgreSQL database dump\n-- pg_dump version\nCREATE TABLE foo (id int);".to_vec() };
        let config = DbBackupConfig { backup_dir: temp_backup_dir("full-pipeline"), ..DbBackupConfig::default() };
        let key = sample_key();
        let now = Utc::now();

        let record = run_backup(&runner, &config, &key, now).await.unwrap();
        assert_eq!(record.status, DatabaseBackupStatus::Completed);
        assert!(record.file_path.ends_with(".sql.gz.enc"));
        assert!(record.file_path.starts_with(&config.backup_dir));

        verify_backup(&record.file_path, &record.checksum, &key).await.unwrap();

        tokio::fs::remove_dir_all(&config.backup_dir).await.unwrap();
    }

    #[tokio::test]
    async fn run_backup_creates_dir_and_file_with_restrictive_permissions() {
        let runner = FakeRunner { dump: b"-- PostgreSQL database dump\nCREATE TABLE foo (id int);".to_vec() };
        let config = DbBackupConfig { backup_dir: temp_backup_dir("permissions"), ..DbBackupConfig::default() };
        let key = sample_key();

        let record = run_backup(&runner, &config, &key, Utc::now()).await.unwrap();

        let file_meta = tokio::fs::metadata(&record.file_path).await.unwrap();
        assert!(file_meta.is_file());

        #[cfg(unix)]
        {
            let dir_meta = tokio::fs::metadata(&config.backup_dir).await.unwrap();
            assert_eq!(dir_meta.permissions().mode() & 0o777, 0o750);
            assert_eq!(file_meta.permissions().mode() & 0o777, 0o600);
        }

        tokio::fs::remove_dir_all(&config.backup_dir).await.unwrap();
    }

    #[tokio::test]
    async fn verify_backup_reads_persisted_file() {
        let runner = FakeRunner { dump: b"-- PostgreSQL database dump\nCREATE TABLE bar (id int);".to_vec() };
        let config = DbBackupConfig { backup_dir: temp_backup_dir("verify"), ..DbBackupConfig::default() };
        let key = sample_key();

        let record = run_backup(&runner, &config, &key, Utc::now()).await.unwrap();
        verify_backup(&record.file_path, &record.checksum, &key).await.unwrap();

        let other_key = MasterKey::from_bytes(&[1u8; 32]).unwrap();
        let err = verify_backup(&record.file_path, &record.checksum, &other_key).await.unwrap_err();
        assert!(matches!(err, DbBackupError::DecryptionFailed(_)));

        tokio::fs::remove_dir_all(&config.backup_dir).await.unwrap();
    }

    #[tokio::test]
    async fn verify_backup_missing_file_is_io_error() {
        let key = sample_key();
        let err = verify_backup("/nonexistent/keldris-backup-missing.sql.gz.enc", "sha256:x", &key).await.unwrap_err();
        assert!(matches!(err, DbBackupError::Io(_)));
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let key = sample_key();
        let compressed = gzip_compress(b"CREATE TABLE x();", 6).unwrap();
        let encrypted = crypto::encrypt(&key, &compressed).unwrap();
        let err = verify_backup_bytes(&encrypted, "sha256:deadbeef", &key).unwrap_err();
        assert!(matches!(err, DbBackupError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_marker_fails_verification() {
        let key = sample_key();
        let compressed = gzip_compress(b"just some random bytes with no markers", 6).unwrap();
        let encrypted = crypto::encrypt(&key, &compressed).unwrap();
        let checksum = format!("sha256:{}", crypto::sha256_hex(&encrypted));
        let err = verify_backup_bytes(&encrypted, &checksum, &key).unwrap_err();
        assert!(matches!(err, DbBackupError::VerificationMarkerMissing));
    }

    #[test]
    fn health_signal_reflects_status_and_staleness() {
        let now = Utc::now();
        assert!(!is_healthy(None, now));

        let failed = DatabaseBackup {
            id: Uuid::new_v4(),
            status: DatabaseBackupStatus::Failed,
            file_path: "x".to_owned(),
            size_bytes: 0,
            checksum: "x".to_owned(),
            started_at: now,
            finished_at: Some(now),
            error_message: Some("boom".to_owned()),
        };
        assert!(!is_healthy(Some(&failed), now));

        let stale = DatabaseBackup { status: DatabaseBackupStatus::Completed, started_at: now - chrono::Duration::hours(30), ..failed.clone() };
        assert!(!is_healthy(Some(&stale), now));

        let fresh = DatabaseBackup { status: DatabaseBackupStatus::Completed, started_at: now - chrono::Duration::hours(1), ..failed };
        assert!(is_healthy(Some(&fresh), now));
    }

    #[tokio::test]
    async fn gzip_round_trips() {
        let data = b"some plaintext data to compress".to_vec();
        let compressed = gzip_compress(&data, 6).unwrap();
        let decompressed = gzip_decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }
}
