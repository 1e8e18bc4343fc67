//! Removal of stored image objects that no `images` row references.
//!
//! Uploads put the object before the row is inserted, so an object written
//! moments ago may still be waiting for its row. Only objects older than the
//! grace window are treated as orphans.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::storage::ObjectStorage;
use crate::store::AlbumStore;

pub const IMAGE_PREFIX: &str = "images/";
pub const DEFAULT_GRACE_MINUTES: i64 = 60;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub stored: usize,
    pub recent: usize,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn prune_orphans(
    storage: &dyn ObjectStorage,
    store: &dyn AlbumStore,
    grace: Duration,
) -> Result<PruneReport> {
    let cutoff = Utc::now() - grace;

    // Rows are read after the listing so every listed key that already has
    // a committed row is seen.
    let objects = storage.list_objects(IMAGE_PREFIX).await?;
    let referenced: HashSet<String> = store
        .image_storage_keys()
        .context("failed to load image storage keys")?
        .into_iter()
        .collect();

    let mut report = PruneReport {
        stored: objects.len(),
        ..PruneReport::default()
    };

    for object in objects {
        if referenced.contains(&object.key) {
            continue;
        }
        if object.last_modified.map_or(true, |at| at > cutoff) {
            report.recent += 1;
            continue;
        }

        match storage.delete_object(&object.key).await {
            Ok(()) => report.deleted.push(object.key),
            Err(err) => {
                warn!(key = %object.key, error = %err, "failed to delete orphaned object");
                report.failed.push(object.key);
            }
        }
    }

    info!(
        stored = report.stored,
        recent = report.recent,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "orphan prune finished"
    );
    Ok(report)
}
