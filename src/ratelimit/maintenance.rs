//! Periodic background cleanup of limiter state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::backend::Maintain;

/// Spawn a tokio task that calls [`Maintain::sweep`] on `target` every
/// `every`.
///
/// The task only holds a weak reference and exits on the first tick after
/// the last strong reference to `target` is dropped.
///
/// # Panics
///
/// Panics if `every` is zero, or if called outside a tokio runtime.
pub fn spawn_sweeper<T>(target: &Arc<T>, every: Duration) -> JoinHandle<()>
where
    T: Maintain + 'static,
{
    let target = Arc::downgrade(target);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;

            let Some(target) = target.upgrade() else {
                debug!("Limiter dropped, stopping sweeper");
                break;
            };

            let removed = target.sweep();
            if removed > 0 {
                debug!(removed = removed, "Swept stale keys");
            } else {
                trace!("Sweep found nothing to remove");
            }
        }
    })
}
