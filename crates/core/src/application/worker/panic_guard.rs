// Panic isolation for item handlers
use crate::domain::Item;
use crate::error::{AppError, Result};
use crate::port::ItemHandler;
use std::any::Any;
use std::sync::Arc;
use tracing::error;

/// Run the handler on its own task so a panic fails this item instead of
/// killing the worker loop.
///
/// A panic is reported as `AppError::Handler`; the worker treats it like
/// any other handler failure and leaves the item for recovery.
pub async fn handle_guarded(handler: Arc<dyn ItemHandler>, item: Item) -> Result<()> {
    let item_id = item.id().to_string();
    let task = tokio::spawn(async move { handler.handle(&item).await });

    match task.await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            let panic_msg = panic_message(join_err.into_panic());
            error!(item_id = %item_id, panic_msg = %panic_msg, "Item handler panicked");
            Err(AppError::Handler(format!("handler panicked: {}", panic_msg)))
        }
        Err(join_err) => Err(AppError::Internal(format!(
            "handler task cancelled: {}",
            join_err
        ))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
