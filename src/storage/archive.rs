/*!
 * Result archive
 *
 * Directory-backed store of named result artifacts. Saving over an existing
 * artifact first copies it into the backup directory; old backups are
 * pruned per name. Loading never falls back to a backup on its own.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs as async_fs;
use tracing::{debug, error, warn};

use crate::result::OptimizeResult;
use crate::storage::decoder::ResultDecoder;
use crate::storage::encoder::{write_atomic, ResultEncoder};
use crate::storage::error::{ArchiveError, ArchiveResult};
use crate::storage::options::{DecodeOptions, PersistenceOptions};
use crate::storage::{ARTIFACT_EXTENSION, BACKUPS_DIR_NAME, BACKUP_EXTENSION, RESULTS_DIR_NAME};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveOptions {
    pub persistence: PersistenceOptions,
    pub decode: DecodeOptions,
    /// Backups kept per result name
    pub backup_count: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            persistence: PersistenceOptions::default(),
            decode: DecodeOptions::default(),
            backup_count: 3,
        }
    }
}

pub struct ResultArchive {
    results_dir: PathBuf,
    backups_dir: PathBuf,
    encoder: ResultEncoder,
    decoder: ResultDecoder,
    backup_count: usize,
}

impl ResultArchive {
    pub async fn new(root: impl Into<PathBuf>, options: ArchiveOptions) -> ArchiveResult<Self> {
        let root = root.into();
        let archive = Self {
            results_dir: root.join(RESULTS_DIR_NAME),
            backups_dir: root.join(BACKUPS_DIR_NAME),
            encoder: ResultEncoder::new(options.persistence)?,
            decoder: ResultDecoder::new(options.decode),
            backup_count: options.backup_count,
        };

        archive.ensure_directories().await?;

        debug!(
            "result archive at {}: backup_count={}",
            root.display(),
            archive.backup_count
        );

        Ok(archive)
    }

    pub fn artifact_path(&self, name: &str) -> ArchiveResult<PathBuf> {
        validate_name(name)?;
        Ok(self
            .results_dir
            .join(format!("{}.{}", name, ARTIFACT_EXTENSION)))
    }

    pub async fn save(&self, name: &str, result: &OptimizeResult) -> ArchiveResult<()> {
        let target = self.artifact_path(name)?;
        let artifact = self.encoder.encode_to_vec(result)?;

        self.ensure_directories().await?;

        if async_fs::try_exists(&target)
            .await
            .map_err(|e| ArchiveError::io(format!("checking {}", target.display()), e))?
        {
            self.create_backup(name, &target).await?;
        }

        let size = artifact.len();
        tokio::task::spawn_blocking(move || write_atomic(&target, &artifact))
            .await
            .map_err(|e| ArchiveError::io(format!("writing {}", name), e.into()))??;
        self.cleanup_old_backups(name).await?;

        debug!("archived {} ({} bytes)", name, size);
        Ok(())
    }

    /// `None` when nothing is stored under `name`. Decode failures are
    /// returned as-is; see `restore_from_backup`.
    pub async fn load(&self, name: &str) -> ArchiveResult<Option<OptimizeResult>> {
        let target = self.artifact_path(name)?;

        let data = match async_fs::read(&target).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no archived result: {}", target.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(ArchiveError::io(format!("reading {}", target.display()), e));
            }
        };

        Ok(Some(self.decoder.decode_slice(&data)?))
    }

    /// Newest backup of `name` that still decodes.
    pub async fn restore_from_backup(&self, name: &str) -> ArchiveResult<OptimizeResult> {
        validate_name(name)?;

        for (backup_path, _) in self.list_backups(name, Order::NewestFirst).await? {
            match async_fs::read(&backup_path).await {
                Ok(data) => match self.decoder.decode_slice(&data) {
                    Ok(result) => {
                        debug!("restored {} from {}", name, backup_path.display());
                        return Ok(result);
                    }
                    Err(e) => {
                        warn!(
                            "backup unreadable, trying next: {} - {}",
                            backup_path.display(),
                            e
                        );
                    }
                },
                Err(e) => {
                    warn!("failed to read backup: {} - {}", backup_path.display(), e);
                }
            }
        }

        error!("no backup of {} could be restored", name);
        Err(ArchiveError::NoBackup {
            name: name.to_string(),
            dir: self.backups_dir.clone(),
        })
    }

    /// Delete the artifact stored under `name`; returns whether one existed.
    pub async fn remove(&self, name: &str) -> ArchiveResult<bool> {
        let target = self.artifact_path(name)?;
        match async_fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ArchiveError::io(format!("removing {}", target.display()), e)),
        }
    }

    /// Names of all stored results, sorted.
    pub async fn list(&self) -> ArchiveResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = async_fs::read_dir(&self.results_dir).await.map_err(|e| {
            ArchiveError::io(format!("reading {}", self.results_dir.display()), e)
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ArchiveError::io(format!("walking {}", self.results_dir.display()), e)
        })? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some(ARTIFACT_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    pub async fn stats(&self) -> ArchiveResult<ArchiveStats> {
        let mut stats = ArchiveStats::default();

        for name in self.list().await? {
            let path = self
                .results_dir
                .join(format!("{}.{}", name, ARTIFACT_EXTENSION));
            if let Ok(metadata) = async_fs::metadata(&path).await {
                stats.result_count += 1;
                stats.result_total_size += metadata.len();
            }
        }

        let mut entries = async_fs::read_dir(&self.backups_dir).await.map_err(|e| {
            ArchiveError::io(format!("reading {}", self.backups_dir.display()), e)
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ArchiveError::io(format!("walking {}", self.backups_dir.display()), e)
        })? {
            if entry.path().extension().and_then(|s| s.to_str()) == Some(BACKUP_EXTENSION) {
                stats.backup_count += 1;
                if let Ok(metadata) = entry.metadata().await {
                    stats.backup_total_size += metadata.len();
                }
            }
        }

        stats.compression_level = self.encoder.options().compression_level;
        stats.include_callable_field = self.encoder.options().include_callable_field;
        Ok(stats)
    }

    async fn create_backup(&self, name: &str, source_file: &Path) -> ArchiveResult<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.6f");
        let backup_file = self
            .backups_dir
            .join(format!(
                "{}_{}.{}.{}",
                name, timestamp, ARTIFACT_EXTENSION, BACKUP_EXTENSION
            ));

        async_fs::copy(source_file, &backup_file)
            .await
            .map_err(|e| ArchiveError::io(format!("creating backup {}", backup_file.display()), e))?;

        debug!("backup created: {}", backup_file.display());
        Ok(backup_file)
    }

    async fn cleanup_old_backups(&self, name: &str) -> ArchiveResult<()> {
        let backups = self.list_backups(name, Order::OldestFirst).await?;
        if backups.len() <= self.backup_count {
            return Ok(());
        }

        let to_remove = backups.len() - self.backup_count;
        for (old_backup, _) in backups.iter().take(to_remove) {
            match async_fs::remove_file(old_backup).await {
                Ok(_) => debug!("removed old backup: {}", old_backup.display()),
                Err(e) => warn!("failed to remove old backup: {} - {}", old_backup.display(), e),
            }
        }

        Ok(())
    }

    async fn list_backups(&self, name: &str, order: Order) -> ArchiveResult<Vec<(PathBuf, SystemTime)>> {
        let prefix = format!("{}_", name);
        let mut backups = Vec::new();

        let mut entries = async_fs::read_dir(&self.backups_dir).await.map_err(|e| {
            ArchiveError::io(format!("reading {}", self.backups_dir.display()), e)
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ArchiveError::io(format!("walking {}", self.backups_dir.display()), e)
        })? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_backup_of(file_name, &prefix) {
                continue;
            }
            if let Ok(metadata) = entry.metadata().await {
                if let Ok(modified) = metadata.modified() {
                    backups.push((path, modified));
                }
            }
        }

        // Timestamped names sort chronologically; mtime breaks ties only.
        backups.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        if order == Order::NewestFirst {
            backups.reverse();
        }
        Ok(backups)
    }

    async fn ensure_directories(&self) -> ArchiveResult<()> {
        for dir in [&self.results_dir, &self.backups_dir] {
            async_fs::create_dir_all(dir)
                .await
                .map_err(|e| ArchiveError::io(format!("creating {}", dir.display()), e))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    OldestFirst,
    NewestFirst,
}

fn validate_name(name: &str) -> ArchiveResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(ArchiveError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// `<name>_<YYYYmmdd>_<HHMMSS.ffffff>.optr.bak`, without matching backups
/// of other names that merely share the prefix (e.g. `run` vs `run_2`).
fn is_backup_of(file_name: &str, prefix: &str) -> bool {
    let suffix = format!(".{}.{}", ARTIFACT_EXTENSION, BACKUP_EXTENSION);
    let Some(rest) = file_name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(&suffix))
    else {
        return false;
    };
    let mut parts = rest.splitn(2, '_');
    let date = parts.next().unwrap_or_default();
    let time = parts.next().unwrap_or_default();
    date.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && !time.is_empty()
        && time.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub result_count: usize,
    pub result_total_size: u64,
    pub backup_count: usize,
    pub backup_total_size: u64,
    pub compression_level: u32,
    pub include_callable_field: bool,
}

impl ArchiveStats {
    pub fn result_total_size_formatted(&self) -> String {
        format_bytes(self.result_total_size)
    }

    pub fn backup_total_size_formatted(&self) -> String {
        format_bytes(self.backup_total_size)
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
