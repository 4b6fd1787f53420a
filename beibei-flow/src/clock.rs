use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Injectable time source so polling loops are testable without wall-clock
/// delays. Production code uses [`TokioClock`]; tests drive a manual clock.
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by the tokio timer
#[derive(Debug, Default, Clone)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
