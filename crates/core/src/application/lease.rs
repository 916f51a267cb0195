// Lease Protocol - add / lease / complete
//
// Each step is one atomic store operation. The gaps between steps are
// deliberate crash windows that the recovery scanner tolerates:
// - add: data written, id never pushed -> orphan data record (leaked)
// - lease: id in processing, lease record never written -> swept as abandoned
// - complete: id removed, records never deleted -> lease expires on its own

use crate::domain::{Item, KeySpace};
use crate::error::{AppError, Result};
use crate::port::{decode_item_id, AtomicStore};
use std::time::Duration;
use tracing::{debug, warn};

/// Add an item: write its data, then make its id visible in the main list
pub async fn add(store: &dyn AtomicStore, keys: &KeySpace, item: &Item) -> Result<()> {
    // Data first, otherwise a worker can lease the id before the data exists
    store.set(&keys.item_key(item.id()), item.data()).await?;
    store
        .push_head(keys.main_list(), item.id().as_bytes())
        .await?;

    debug!(
        queue = %keys.queue_name(),
        item_id = %item.id(),
        bytes = item.data().len(),
        "Item added"
    );
    Ok(())
}

/// Add several items, each one data-before-id
pub async fn add_all(store: &dyn AtomicStore, keys: &KeySpace, items: &[Item]) -> Result<()> {
    for item in items {
        add(store, keys, item).await?;
    }
    Ok(())
}

/// Lease one item for `visibility_timeout`.
///
/// With `block` the call waits for an item until `timeout` elapses
/// (`Duration::ZERO` waits forever); without it the call returns at once.
/// `Ok(None)` means no item was available.
pub async fn lease(
    store: &dyn AtomicStore,
    keys: &KeySpace,
    session: &str,
    visibility_timeout: Duration,
    block: bool,
    timeout: Duration,
) -> Result<Option<Item>> {
    // Stores count lease TTLs in whole milliseconds
    if visibility_timeout.as_millis() == 0 {
        return Err(AppError::Validation(
            "visibility timeout must be at least one millisecond".to_string(),
        ));
    }

    let raw = if block {
        store
            .atomic_transfer_blocking(keys.main_list(), keys.processing_list(), timeout)
            .await?
    } else {
        store
            .atomic_transfer(keys.main_list(), keys.processing_list())
            .await?
    };

    let Some(raw) = raw else {
        return Ok(None);
    };
    let item_id = decode_item_id(keys.main_list(), raw)?;

    let data = match store.get(&keys.item_key(&item_id)).await? {
        Some(data) => data,
        None => {
            // add() crashed between writing data and pushing the id, or the
            // data was deleted by a concurrent complete()
            warn!(
                queue = %keys.queue_name(),
                item_id = %item_id,
                "Item data missing, leasing with empty payload"
            );
            Vec::new()
        }
    };

    // Racing another worker for the same lease record is fine: the value is
    // only an owner tag, never checked for exclusivity
    store
        .set_with_ttl(
            &keys.lease_key(&item_id),
            visibility_timeout,
            session.as_bytes(),
        )
        .await?;

    debug!(
        queue = %keys.queue_name(),
        item_id = %item_id,
        lease_ms = %visibility_timeout.as_millis(),
        "Item leased"
    );
    Ok(Some(Item::from_store(item_id, data)))
}

/// Complete an item.
///
/// Returns true only for the first completer across all workers; every
/// other call, before or after, returns false.
pub async fn complete(store: &dyn AtomicStore, keys: &KeySpace, item: &Item) -> Result<bool> {
    let removed = store
        .remove_all_matching(keys.processing_list(), item.id().as_bytes())
        .await?;

    if removed == 0 {
        debug!(
            queue = %keys.queue_name(),
            item_id = %item.id(),
            "Item not in processing, already completed or reclaimed"
        );
        return Ok(false);
    }

    // Best effort: the item is ours now, a failed delete only leaks a record
    if let Err(e) = store.delete(&keys.item_key(item.id())).await {
        warn!(item_id = %item.id(), error = %e, "Failed to delete item data");
    }
    if let Err(e) = store.delete(&keys.lease_key(item.id())).await {
        warn!(item_id = %item.id(), error = %e, "Failed to delete lease record");
    }

    debug!(queue = %keys.queue_name(), item_id = %item.id(), "Item completed");
    Ok(true)
}
