//! Subscription callbacks and their delivery.
//!
//! Each subscription gets its own event queue drained by a dedicated
//! dispatcher task, so one subscription's callbacks run strictly in arrival
//! order and never overlap each other, while different subscriptions
//! proceed independently.

mod dispatcher;

use std::future::Future;
use std::pin::Pin;

use crate::models::SubscriptionEvent;

pub(crate) use dispatcher::spawn_dispatcher;

/// Boxed future returned by [`SubscriptionHandler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Receives a subscription's events.
///
/// Implemented for any `Fn(SubscriptionEvent) -> impl Future<Output = ()>`,
/// so an async closure works directly:
///
/// ```rust,no_run
/// use vantiq_link::{resources, SubscriptionEvent, VantiqClient};
///
/// # async fn example(client: VantiqClient) -> vantiq_link::Result<()> {
/// client
///     .subscribe(resources::TOPICS, "/orders", None, |event: SubscriptionEvent| async move {
///         println!("{}: {:?}", event.kind(), event.message().body);
///     }, None)
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// A panicking handler is logged and the subscription keeps receiving.
pub trait SubscriptionHandler: Send + Sync + 'static {
    fn handle(&self, event: SubscriptionEvent) -> HandlerFuture;
}

impl<F, Fut> SubscriptionHandler for F
where
    F: Fn(SubscriptionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, event: SubscriptionEvent) -> HandlerFuture {
        Box::pin(self(event))
    }
}
