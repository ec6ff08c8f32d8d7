use std::{
    path::{Path, PathBuf},
    sync::Weak,
    time::Duration,
};

use chrono::Utc;

use crate::{database::Database, error::BotResult};

const BACKUP_EXTENSION: &str = "sqlite";

/// Snapshot the database into a new timestamped file in `dir`, then delete all but
/// the newest `keep` snapshots. Returns the path of the new one.
pub async fn backup_once(db: &Database, dir: &Path, keep: usize) -> BotResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(format!(
        "{}.{BACKUP_EXTENSION}",
        Utc::now().format("%Y%m%d_%H%M%S_%3f")
    ));
    db.backup_to(&path).await?;
    log::info!("Database backed up to {}.", path.display());

    for old in old_backups(dir, keep).await? {
        match tokio::fs::remove_file(&old).await {
            Ok(()) => log::debug!("Deleted old backup {}.", old.display()),
            Err(e) => log::warn!("Failed to delete old backup {}: {e}", old.display()),
        }
    }

    Ok(path)
}

/// Backups in `dir` beyond the newest `keep` ones. The timestamped names sort
/// chronologically.
async fn old_backups(dir: &Path, keep: usize) -> BotResult<Vec<PathBuf>> {
    let mut backups = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|x| x == BACKUP_EXTENSION) && path.is_file() {
            backups.push(path);
        }
    }

    backups.sort();
    let excess = backups.len().saturating_sub(keep);
    backups.truncate(excess);
    Ok(backups)
}

pub async fn backup_spinloop(
    database: Weak<Database>,
    interval: Duration,
    dir: PathBuf,
    keep: usize,
) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(database) = database.upgrade() else {
            // No more database!
            return;
        };

        if let Err(e) = backup_once(&database, &dir, keep).await {
            log::error!("Database backup failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn keeps_the_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");
        let source = dir.path().join("source.sqlite");
        let db = Database::new(source.to_str().unwrap()).await.unwrap();

        let mut made = Vec::new();
        for _ in 0..3 {
            made.push(backup_once(&db, &backups, 2).await.unwrap());
            // Timestamps have millisecond resolution.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Unrelated files are left alone.
        std::fs::write(backups.join("notes.txt"), "hi").unwrap();
        assert!(old_backups(&backups, 2).await.unwrap().is_empty());

        assert!(!made[0].exists());
        assert!(made[1].exists());
        assert!(made[2].exists());
        assert!(backups.join("notes.txt").exists());
    }
}
