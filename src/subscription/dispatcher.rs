use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::SubscriptionHandler;
use crate::models::SubscriptionEvent;

/// Drain `event_rx` into `handler`, one event at a time.
///
/// Each invocation runs in its own task and is awaited before the next
/// event is taken, which isolates panics without giving up ordering. The
/// dispatcher ends when the transport drops the sending side.
pub(crate) fn spawn_dispatcher(
    request_id: String,
    handler: Arc<dyn SubscriptionHandler>,
    mut event_rx: mpsc::UnboundedReceiver<SubscriptionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut delivered: u64 = 0;
        while let Some(event) = event_rx.recv().await {
            let kind = event.kind();
            let handler = handler.clone();
            let invocation = tokio::spawn(async move { handler.handle(event).await });
            match invocation.await {
                Ok(()) => delivered += 1,
                Err(e) if e.is_panic() => {
                    log::warn!("[SUB] Callback for '{}' panicked on a {} event; continuing", request_id, kind);
                },
                Err(e) => {
                    log::warn!("[SUB] Callback for '{}' was cancelled: {}", request_id, e);
                },
            }
        }
        log::debug!("[SUB] Dispatcher for '{}' finished after {} event(s)", request_id, delivered);
    })
}
