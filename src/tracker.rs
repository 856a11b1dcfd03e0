//! Traversal observation: the tracker hook around every node execution.
//!
//! A [`Tracker`]'s `enter`/`exit` hooks are the only places a traversal may
//! cooperatively suspend for an unbounded time; this is where a debugger
//! pauses a run and single-steps it. The default [`NoopTracker`] never
//! suspends. Exactly one tracker is active per engine at a time; trackers
//! compose via the engine's save/restore stack, so entering and leaving a
//! debug session preserves whatever tracker was active before it.
//!
//! Host-side integration (pausing an external clock, driving a UI) lives in
//! tracker implementations as side effects, never in the traversal
//! algorithm.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::types::{GraphId, NodeId};

/// Identifies the node a hook fires for: graph guid plus node id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRef {
    pub graph: GraphId,
    pub node: NodeId,
}

/// Observer hook invoked around every node execution.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Called before a node executes. May suspend the whole run.
    async fn enter(&self, at: &NodeRef);

    /// Called after a node executes. May suspend the whole run.
    async fn exit(&self, at: &NodeRef);
}

/// The default tracker: observes nothing, never suspends.
pub struct NoopTracker;

#[async_trait]
impl Tracker for NoopTracker {
    async fn enter(&self, _at: &NodeRef) {}
    async fn exit(&self, _at: &NodeRef) {}
}

/// Which side of a node execution a trace event records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracePhase {
    Enter,
    Exit,
}

/// Timestamped record of one tracker hook firing.
#[derive(Clone, Debug)]
pub struct TraceEvent {
    pub at: NodeRef,
    pub phase: TracePhase,
    pub when: DateTime<Utc>,
}

/// Streams trace events to an async channel for external debugger UIs.
///
/// Sending never blocks the traversal; events are silently dropped once the
/// receiver goes away.
pub struct ChannelTracker {
    tx: mpsc::UnboundedSender<TraceEvent>,
}

impl ChannelTracker {
    pub fn new(tx: mpsc::UnboundedSender<TraceEvent>) -> Self {
        Self { tx }
    }

    fn emit(&self, at: &NodeRef, phase: TracePhase) {
        let _ = self.tx.send(TraceEvent {
            at: at.clone(),
            phase,
            when: Utc::now(),
        });
    }
}

#[async_trait]
impl Tracker for ChannelTracker {
    async fn enter(&self, at: &NodeRef) {
        self.emit(at, TracePhase::Enter);
    }

    async fn exit(&self, at: &NodeRef) {
        self.emit(at, TracePhase::Exit);
    }
}

/// Debugger command consumed at the next suspension point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepCommand {
    /// Run one node, then pause again.
    Step,
    /// Clear the pause and run freely.
    Resume,
    /// Stay suspended.
    Pause,
}

/// Single-stepping tracker: pauses the whole run at `enter` while the pause
/// flag is set or a breakpoint is hit, then waits for [`DebugHandle`]
/// commands.
///
/// If the debug handle is dropped, any suspended run resumes rather than
/// deadlocking.
pub struct StepTracker {
    commands: flume::Receiver<StepCommand>,
    paused: Arc<AtomicBool>,
    breakpoints: Arc<RwLock<FxHashSet<NodeId>>>,
}

/// Control handle paired with a [`StepTracker`].
#[derive(Clone)]
pub struct DebugHandle {
    commands: flume::Sender<StepCommand>,
    paused: Arc<AtomicBool>,
    breakpoints: Arc<RwLock<FxHashSet<NodeId>>>,
}

impl StepTracker {
    /// Create a tracker and its control handle.
    #[must_use]
    pub fn new() -> (Self, DebugHandle) {
        let (tx, rx) = flume::unbounded();
        let paused = Arc::new(AtomicBool::new(false));
        let breakpoints = Arc::new(RwLock::new(FxHashSet::default()));
        (
            Self {
                commands: rx,
                paused: paused.clone(),
                breakpoints: breakpoints.clone(),
            },
            DebugHandle {
                commands: tx,
                paused,
                breakpoints,
            },
        )
    }
}

#[async_trait]
impl Tracker for StepTracker {
    async fn enter(&self, at: &NodeRef) {
        let hit_breakpoint = self.breakpoints.read().unwrap().contains(&at.node);
        if hit_breakpoint {
            tracing::debug!(node = %at.node, "breakpoint hit, suspending run");
            self.paused.store(true, Ordering::Release);
        }
        if !self.paused.load(Ordering::Acquire) {
            return;
        }
        loop {
            match self.commands.recv_async().await {
                Ok(StepCommand::Step) => {
                    // Run this one node; the pause flag stays set so the
                    // next enter suspends again.
                    self.paused.store(true, Ordering::Release);
                    break;
                }
                Ok(StepCommand::Resume) => {
                    self.paused.store(false, Ordering::Release);
                    break;
                }
                Ok(StepCommand::Pause) => {
                    self.paused.store(true, Ordering::Release);
                }
                Err(_) => {
                    tracing::debug!("debug handle dropped, resuming suspended run");
                    self.paused.store(false, Ordering::Release);
                    break;
                }
            }
        }
    }

    async fn exit(&self, _at: &NodeRef) {}
}

impl DebugHandle {
    /// Suspend at the next `enter` hook. Takes effect immediately.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Let the currently suspended run execute exactly one node.
    pub fn step(&self) {
        let _ = self.commands.send(StepCommand::Step);
    }

    /// Clear the pause; the suspended run (or the next one to suspend)
    /// continues freely.
    pub fn resume(&self) {
        let _ = self.commands.send(StepCommand::Resume);
    }

    /// Suspend whenever the named node is about to execute.
    pub fn add_breakpoint(&self, node: NodeId) {
        self.breakpoints.write().unwrap().insert(node);
    }

    /// Remove a breakpoint.
    pub fn clear_breakpoint(&self, node: &NodeId) {
        self.breakpoints.write().unwrap().remove(node);
    }

    /// Whether the tracker is currently holding runs at `enter`.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(node: &str) -> NodeRef {
        NodeRef {
            graph: GraphId::random(),
            node: NodeId::new(node),
        }
    }

    #[tokio::test]
    async fn unpaused_tracker_does_not_suspend() {
        let (tracker, _handle) = StepTracker::new();
        tracker.enter(&at("a")).await;
    }

    #[tokio::test]
    async fn dropped_handle_releases_suspended_run() {
        let (tracker, handle) = StepTracker::new();
        handle.pause();
        drop(handle);
        // recv fails immediately; enter must return instead of hanging.
        tracker.enter(&at("a")).await;
        assert!(!tracker.paused.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn queued_resume_is_consumed_by_next_suspension() {
        let (tracker, handle) = StepTracker::new();
        handle.pause();
        handle.resume();
        tracker.enter(&at("a")).await;
        assert!(!handle.is_paused());
    }
}
