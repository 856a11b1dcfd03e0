//! Pooling for execution contexts.
//!
//! Flows are acquired when an event fires and released when the traversal
//! finishes, on *every* exit path, including errors and cancellation, which
//! is why acquisition goes through the RAII [`FlowGuard`]. Release fully
//! resets the flow (retaining allocation capacity) so no forward-path log,
//! next-node pointer, payload, or cancellation state can leak into the next
//! reuse.

use std::sync::{Arc, Mutex};

use crate::graph::CompiledGraph;

use super::Flow;

/// Free-list pool of reusable [`Flow`] objects.
///
/// # Examples
///
/// ```rust
/// use wireflow::flow::FlowPool;
///
/// let pool = FlowPool::new();
/// let flow = pool.acquire();
/// assert!(flow.is_pristine());
/// pool.release(flow);
/// assert_eq!(pool.idle(), 1);
/// ```
#[derive(Default)]
pub struct FlowPool {
    free: Mutex<Vec<Flow>>,
}

impl FlowPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a flow from the free list, or allocate a fresh one.
    #[must_use]
    pub fn acquire(&self) -> Flow {
        self.free.lock().unwrap().pop().unwrap_or_default()
    }

    /// Reset a flow and return it to the free list.
    pub fn release(&self, mut flow: Flow) {
        flow.reset();
        self.free.lock().unwrap().push(flow);
    }

    /// Number of flows currently parked in the free list.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

/// Scoped acquisition of a pooled flow.
///
/// Holds the flow for the duration of one triggered run and, in `Drop` and therefore
/// on every exit path, pops the owning graph's active-flow stack and returns
/// the reset flow to the pool.
pub(crate) struct FlowGuard<'p> {
    pool: &'p FlowPool,
    flow: Option<Flow>,
    active_on: Option<Arc<CompiledGraph>>,
}

impl<'p> FlowGuard<'p> {
    pub(crate) fn new(pool: &'p FlowPool) -> Self {
        Self {
            pool,
            flow: Some(pool.acquire()),
            active_on: None,
        }
    }

    /// Push this run onto `graph`'s active-flow stack; popped on drop.
    pub(crate) fn attach(&mut self, graph: Arc<CompiledGraph>) {
        if let Some(flow) = &self.flow {
            graph.push_active(flow.run_id());
        }
        self.active_on = Some(graph);
    }

    pub(crate) fn flow_mut(&mut self) -> &mut Flow {
        self.flow.as_mut().expect("flow released before guard drop")
    }
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        if let Some(flow) = self.flow.take() {
            if let Some(graph) = self.active_on.take() {
                graph.pop_active(flow.run_id());
            }
            self.pool.release(flow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reuses_released_flows() {
        let pool = FlowPool::new();
        pool.release(pool.acquire());
        assert_eq!(pool.idle(), 1);
        let _flow = pool.acquire();
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn guard_returns_flow_on_drop() {
        let pool = FlowPool::new();
        {
            let mut guard = FlowGuard::new(&pool);
            let _ = guard.flow_mut();
        }
        assert_eq!(pool.idle(), 1);
    }
}
