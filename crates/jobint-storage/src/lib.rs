//! Layer table storage: tables are written into a run-scoped staging area and
//! only become visible under the data root when the whole run is committed.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobint-storage";

const STAGING_DIR: &str = ".staging";
const BACKUP_DIR: &str = ".replaced";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table path {} must be relative and stay inside the data root", .0.display())]
    InvalidPath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTable {
    pub relative_path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

#[derive(Debug, Clone)]
pub struct TableStore {
    root: PathBuf,
}

impl TableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn staging_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(STAGING_DIR).join(run_id.to_string())
    }

    /// Open a fresh staging area for `run_id`, clearing leftovers of an earlier
    /// attempt with the same id.
    pub async fn begin(&self, run_id: Uuid) -> anyhow::Result<StagedPublish> {
        let staging = self.staging_dir(run_id);
        if fs::try_exists(&staging)
            .await
            .with_context(|| format!("checking staging dir {}", staging.display()))?
        {
            fs::remove_dir_all(&staging)
                .await
                .with_context(|| format!("clearing stale staging dir {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .await
            .with_context(|| format!("creating staging dir {}", staging.display()))?;
        Ok(StagedPublish {
            root: self.root.clone(),
            staging,
            tables: Vec::new(),
            retired: Vec::new(),
        })
    }
}

/// Tables written for one run but not yet visible to readers.
#[derive(Debug)]
pub struct StagedPublish {
    root: PathBuf,
    staging: PathBuf,
    tables: Vec<StagedTable>,
    /// Published paths this run no longer produces; removed on commit.
    retired: Vec<PathBuf>,
}

impl StagedPublish {
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn tables(&self) -> &[StagedTable] {
        &self.tables
    }

    /// Mark a previously published file or directory for removal. It is moved
    /// aside during commit and restored with everything else if commit fails.
    pub fn retire(&mut self, relative_path: impl AsRef<Path>) -> Result<(), StoreError> {
        let relative_path = validate_relative(relative_path.as_ref())?;
        if !self.retired.contains(&relative_path) {
            self.retired.push(relative_path);
        }
        Ok(())
    }

    /// Write `bytes` to the staging area via a temp file + rename.
    pub async fn stage_bytes(
        &mut self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StagedTable> {
        let relative_path = validate_relative(relative_path.as_ref())?;
        let target = self.staging.join(&relative_path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.staging.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating staging directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp table file {}", temp_path.display()))?;
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| format!("writing temp table file {}", temp_path.display()));
        }

        if let Err(err) = fs::rename(&temp_path, &target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp table {} -> {}",
                    temp_path.display(),
                    target.display()
                )
            });
        }

        let staged = StagedTable {
            relative_path,
            content_hash: TableStore::sha256_hex(bytes),
            byte_size: bytes.len(),
        };
        self.tables.retain(|t| t.relative_path != staged.relative_path);
        self.tables.push(staged.clone());
        Ok(staged)
    }

    /// Move every staged table into place under the data root. Tables already
    /// present are moved aside first; if any move fails, every table replaced
    /// so far is restored and the data root is left as it was.
    pub async fn commit(self) -> anyhow::Result<Vec<StagedTable>> {
        let backup_root = self.staging.join(BACKUP_DIR);
        let mut moved = Vec::with_capacity(self.tables.len());
        let published = self.move_into_place(&backup_root, &mut moved).await;
        if let Err(err) = published {
            warn!(error = %err, replaced = moved.len(), "publish failed, restoring previous tables");
            if rollback(&moved).await {
                remove_staging(&self.staging).await;
            } else {
                warn!(staging = %self.staging.display(), "previous tables kept in staging dir");
            }
            return Err(err);
        }
        remove_staging(&self.staging).await;
        info!(
            tables = self.tables.len(),
            retired = self.retired.len(),
            root = %self.root.display(),
            "published tables"
        );
        Ok(self.tables)
    }

    async fn move_into_place(
        &self,
        backup_root: &Path,
        moved: &mut Vec<MovedTable>,
    ) -> anyhow::Result<()> {
        for table in &self.tables {
            let from = self.staging.join(&table.relative_path);
            let to = self.root.join(&table.relative_path);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating table directory {}", parent.display()))?;
            }

            let backup = match fs::symlink_metadata(&to).await {
                Ok(meta) if meta.is_dir() => {
                    anyhow::bail!("table path {} is a directory", to.display())
                }
                Ok(_) => {
                    let backup = backup_root.join(&table.relative_path);
                    if let Some(parent) = backup.parent() {
                        fs::create_dir_all(parent).await.with_context(|| {
                            format!("creating backup directory {}", parent.display())
                        })?;
                    }
                    fs::rename(&to, &backup).await.with_context(|| {
                        format!("moving aside {} -> {}", to.display(), backup.display())
                    })?;
                    Some(backup)
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => {
                    return Err(err).with_context(|| format!("inspecting table {}", to.display()))
                }
            };
            moved.push(MovedTable {
                target: to.clone(),
                backup,
            });

            fs::rename(&from, &to).await.with_context(|| {
                format!("publishing table {} -> {}", from.display(), to.display())
            })?;
        }

        for relative_path in &self.retired {
            let target = self.root.join(relative_path);
            match fs::symlink_metadata(&target).await {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("inspecting retired path {}", target.display()))
                }
            }
            let backup = backup_root.join(relative_path);
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating backup directory {}", parent.display()))?;
            }
            fs::rename(&target, &backup).await.with_context(|| {
                format!("retiring {} -> {}", target.display(), backup.display())
            })?;
            moved.push(MovedTable {
                target,
                backup: Some(backup),
            });
        }
        Ok(())
    }

    /// Drop everything staged; previously published tables are untouched.
    pub async fn discard(self) {
        remove_staging(&self.staging).await;
    }
}

/// A table whose target path was touched during commit.
#[derive(Debug)]
struct MovedTable {
    target: PathBuf,
    /// Where the previously published table was moved to, if there was one.
    backup: Option<PathBuf>,
}

/// Undo a partial commit in reverse order. Returns false when some previous
/// table could not be put back.
async fn rollback(moved: &[MovedTable]) -> bool {
    let mut restored = true;
    for table in moved.iter().rev() {
        if let Err(err) = fs::remove_file(&table.target).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %err, table = %table.target.display(), "failed to remove new table");
            }
        }
        if let Some(backup) = &table.backup {
            if let Err(err) = fs::rename(backup, &table.target).await {
                warn!(error = %err, table = %table.target.display(), "failed to restore table");
                restored = false;
            }
        }
    }
    restored
}

async fn remove_staging(staging: &Path) {
    if let Err(err) = fs::remove_dir_all(staging).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %err, staging = %staging.display(), "failed to remove staging dir");
        }
    }
    // the per-run dir is gone; drop the shared parent too when nothing else is staged
    if let Some(parent) = staging.parent() {
        let _ = fs::remove_dir(parent).await;
    }
}

fn validate_relative(path: &Path) -> Result<PathBuf, StoreError> {
    let valid = !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if valid {
        Ok(path.to_path_buf())
    } else {
        Err(StoreError::InvalidPath(path.to_path_buf()))
    }
}
