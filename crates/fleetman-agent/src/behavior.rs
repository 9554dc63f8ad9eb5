//! Behavior tree
//!
//! - `Sequence` ticks children in order and returns the first non-Success,
//!   or Success when all succeed.
//! - `Selector` ticks children in order and returns the first non-Failure,
//!   or Failure when all fail.
//! - `Parallel` ticks every child on every tick. It returns Failure if any
//!   child failed, otherwise Running if any child is running, otherwise
//!   Success.
//! - `Action` returns whatever its duty returns.
//!
//! `tick` must not block. Duties that start slow work hand it to the job
//! manager or a background task and return immediately.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::blackboard::Blackboard;

/// Result of ticking a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Running,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Running => "running",
        };
        f.write_str(s)
    }
}

/// Per-tick information handed to every node
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    /// Tick counter, starting at 0
    pub tick: u64,
    /// Monotonic time of the tick
    pub now: Instant,
    /// Wall-clock time of the tick
    pub wall: DateTime<Utc>,
}

impl TickContext {
    #[must_use]
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            now: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// A leaf's unit of work
pub trait Duty: Send {
    fn name(&self) -> &str;

    fn tick(&mut self, ctx: &TickContext, blackboard: &Blackboard) -> Status;
}

struct FnDuty<F> {
    name: String,
    f: F,
}

impl<F> Duty for FnDuty<F>
where
    F: FnMut(&TickContext, &Blackboard) -> Status + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, ctx: &TickContext, blackboard: &Blackboard) -> Status {
        (self.f)(ctx, blackboard)
    }
}

/// A node in a behavior tree
pub enum BehaviorNode {
    Sequence(Vec<BehaviorNode>),
    Selector(Vec<BehaviorNode>),
    Parallel(Vec<BehaviorNode>),
    Action(Box<dyn Duty>),
}

impl BehaviorNode {
    #[must_use]
    pub fn sequence(children: Vec<BehaviorNode>) -> Self {
        BehaviorNode::Sequence(children)
    }

    #[must_use]
    pub fn selector(children: Vec<BehaviorNode>) -> Self {
        BehaviorNode::Selector(children)
    }

    #[must_use]
    pub fn parallel(children: Vec<BehaviorNode>) -> Self {
        BehaviorNode::Parallel(children)
    }

    pub fn action(duty: impl Duty + 'static) -> Self {
        BehaviorNode::Action(Box::new(duty))
    }

    /// Leaf backed by a closure
    pub fn from_fn(
        name: impl Into<String>,
        f: impl FnMut(&TickContext, &Blackboard) -> Status + Send + 'static,
    ) -> Self {
        BehaviorNode::Action(Box::new(FnDuty {
            name: name.into(),
            f,
        }))
    }

    pub fn tick(&mut self, ctx: &TickContext, blackboard: &Blackboard) -> Status {
        match self {
            BehaviorNode::Action(duty) => duty.tick(ctx, blackboard),

            BehaviorNode::Sequence(children) => {
                for child in children {
                    match child.tick(ctx, blackboard) {
                        Status::Success => continue,
                        other => return other,
                    }
                }
                Status::Success
            }

            BehaviorNode::Selector(children) => {
                for child in children {
                    match child.tick(ctx, blackboard) {
                        Status::Failure => continue,
                        other => return other,
                    }
                }
                Status::Failure
            }

            BehaviorNode::Parallel(children) => {
                let mut failed = false;
                let mut running = false;
                for child in children {
                    match child.tick(ctx, blackboard) {
                        Status::Failure => failed = true,
                        Status::Running => running = true,
                        Status::Success => {}
                    }
                }
                if failed {
                    Status::Failure
                } else if running {
                    Status::Running
                } else {
                    Status::Success
                }
            }
        }
    }

    /// Name of an `Action` leaf
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            BehaviorNode::Action(duty) => Some(duty.name()),
            _ => None,
        }
    }
}
