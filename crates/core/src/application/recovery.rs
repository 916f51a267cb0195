// Recovery Scanner - light_clean sweep for abandoned leases
use crate::domain::KeySpace;
use crate::error::Result;
use crate::port::{decode_item_id, AtomicStore};
use std::sync::Arc;
use tracing::{debug, info};

/// What one sweep found and repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Ids inspected in the processing list
    pub scanned: usize,
    /// Ids without a lease moved back to the main list
    pub requeued: usize,
    /// Ids without a lease that another actor removed first
    pub already_removed: usize,
    /// Ids left in the cleaning list by an interrupted sweep
    pub forgotten: usize,
    /// Forgotten ids found in no list and requeued
    pub recovered: usize,
}

impl CleanReport {
    /// Number of ids this sweep pushed back onto the main list
    pub fn repaired(&self) -> usize {
        self.requeued + self.recovered
    }
}

/// Recovery scanner
///
/// Finds ids sitting in the processing list with no lease record (the
/// worker died between transfer and lease, or the lease expired) and puts
/// them back on the main list. The cleaning list marks ids mid-repair so a
/// sweep that dies halfway is finished by the next one.
///
/// Safe to run concurrently with itself and with lease/complete traffic.
/// A sweep can requeue an id whose completion lands concurrently, which
/// yields a duplicate delivery, never a lost item.
pub struct RecoveryScanner {
    store: Arc<dyn AtomicStore>,
    keys: KeySpace,
}

impl RecoveryScanner {
    pub fn new(store: Arc<dyn AtomicStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Run one sweep over the processing list, then the cleaning list.
    ///
    /// Store errors abort the sweep. Whatever id was in flight stays in the
    /// cleaning list and is handled by the next sweep.
    pub async fn light_clean(&self) -> Result<CleanReport> {
        let mut report = CleanReport::default();

        self.sweep_processing(&mut report).await?;
        self.sweep_cleaning(&mut report).await?;

        debug!(
            queue = %self.keys.queue_name(),
            scanned = report.scanned,
            requeued = report.requeued,
            forgotten = report.forgotten,
            recovered = report.recovered,
            "Light clean finished"
        );
        Ok(report)
    }

    async fn sweep_processing(&self, report: &mut CleanReport) -> Result<()> {
        let processing = self.keys.processing_list();
        let snapshot = self.store.list_all(processing).await?;

        for raw in snapshot {
            let item_id = decode_item_id(processing, raw)?;
            report.scanned += 1;

            if self.lease_exists(&item_id).await? {
                continue;
            }

            info!(queue = %self.keys.queue_name(), item_id = %item_id, "Item has no lease");

            // Marker first: if we die after the removal below, the id is
            // still reachable through the cleaning list
            self.store
                .push_head(self.keys.cleaning_list(), item_id.as_bytes())
                .await?;

            let removed = self
                .store
                .remove_all_matching(processing, item_id.as_bytes())
                .await?;
            if removed > 0 {
                self.store
                    .push_head(self.keys.main_list(), item_id.as_bytes())
                    .await?;
                report.requeued += 1;
                info!(
                    queue = %self.keys.queue_name(),
                    item_id = %item_id,
                    "Item was still in processing, requeued"
                );
            } else {
                report.already_removed += 1;
                info!(
                    queue = %self.keys.queue_name(),
                    item_id = %item_id,
                    "Item was no longer in processing"
                );
            }

            self.store
                .remove_all_matching(self.keys.cleaning_list(), item_id.as_bytes())
                .await?;
        }

        Ok(())
    }

    async fn sweep_cleaning(&self, report: &mut CleanReport) -> Result<()> {
        let cleaning = self.keys.cleaning_list();
        let forgotten = self.store.list_all(cleaning).await?;

        for raw in forgotten {
            let item_id = decode_item_id(cleaning, raw)?;
            report.forgotten += 1;

            info!(
                queue = %self.keys.queue_name(),
                item_id = %item_id,
                "Item was left behind by an interrupted clean"
            );

            if !self.lease_exists(&item_id).await?
                && !self.in_list(self.keys.main_list(), &item_id).await?
                && !self.in_list(self.keys.processing_list(), &item_id).await?
            {
                // Races with a complete() landing right now: the item may be
                // delivered again, but it is never lost
                self.store
                    .push_head(self.keys.main_list(), item_id.as_bytes())
                    .await?;
                report.recovered += 1;
                info!(
                    queue = %self.keys.queue_name(),
                    item_id = %item_id,
                    "Item was in no list, requeued"
                );
            }

            self.store
                .remove_all_matching(cleaning, item_id.as_bytes())
                .await?;
        }

        Ok(())
    }

    async fn lease_exists(&self, item_id: &str) -> Result<bool> {
        self.store.exists(&self.keys.lease_key(item_id)).await
    }

    async fn in_list(&self, list: &str, item_id: &str) -> Result<bool> {
        Ok(self
            .store
            .find_index(list, item_id.as_bytes())
            .await?
            .is_some())
    }
}
