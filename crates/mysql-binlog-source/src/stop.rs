//! Predicates that end [`crate::EventsStreamer::stream_events`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Evaluated after every handled frame and, when an idle interval is
/// configured, whenever the stream has been quiet for that long.
pub trait StopCondition: Send + Sync {
    fn should_stop(&self) -> bool;
}

impl<F> StopCondition for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_stop(&self) -> bool {
        self()
    }
}

impl StopCondition for CancellationToken {
    fn should_stop(&self) -> bool {
        self.is_cancelled()
    }
}

impl StopCondition for Arc<AtomicBool> {
    fn should_stop(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}
