//! Fixed-rate tick loop

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::behavior::{BehaviorNode, Status, TickContext};
use crate::blackboard::Blackboard;

/// Ticks the root node at a fixed frequency
///
/// A root `Failure` is reported when it starts and ends; it never stops
/// the loop.
pub struct Engine {
    root: BehaviorNode,
    blackboard: Arc<Blackboard>,
    period: Duration,
    ticks: u64,
    last: Option<Status>,
}

impl Engine {
    pub fn new(root: BehaviorNode, blackboard: Arc<Blackboard>, tick_hz: u32) -> Self {
        let period = Duration::from_secs(1) / tick_hz.max(1);
        Self {
            root,
            blackboard,
            period,
            ticks: 0,
            last: None,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tick once at the current time
    pub fn tick(&mut self) -> Status {
        let ctx = TickContext::new(self.ticks);
        self.tick_with(&ctx)
    }

    /// Tick once with an explicit context
    pub fn tick_with(&mut self, ctx: &TickContext) -> Status {
        let status = self.root.tick(ctx, &self.blackboard);
        self.ticks += 1;

        if self.last != Some(status) {
            match (self.last, status) {
                (_, Status::Failure) => warn!(tick = ctx.tick, "device tree failing"),
                (Some(Status::Failure), _) => {
                    info!(tick = ctx.tick, status = %status, "device tree recovered");
                }
                _ => debug!(tick = ctx.tick, status = %status, "device tree status"),
            }
            self.last = Some(status);
        }
        status
    }

    /// Tick until `cancel` fires; late ticks are skipped, not bunched
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_ms = self.period.as_millis(), "engine started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        info!(ticks = self.ticks, "engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[test]
    fn test_period_from_frequency() {
        let engine = Engine::new(BehaviorNode::parallel(vec![]), Arc::new(Blackboard::new()), 10);
        assert_eq!(engine.period(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_cancelled() {
        let count = Arc::new(AtomicU64::new(0));
        let seen = count.clone();
        let root = BehaviorNode::parallel(vec![BehaviorNode::from_fn("count", move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Status::Failure
        })]);

        let cancel = CancellationToken::new();
        let engine = Engine::new(root, Arc::new(Blackboard::new()), 10);
        let handle = tokio::spawn(engine.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        cancel.cancel();
        handle.await.unwrap();

        // first tick fires immediately, then every 100ms; failure never stops it
        let ticks = count.load(Ordering::SeqCst);
        assert!((10..=11).contains(&ticks), "ticked {ticks} times");
    }
}
