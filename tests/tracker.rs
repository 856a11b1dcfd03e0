mod common;
use common::*;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use wireflow::engine::Engine;
use wireflow::tracker::{ChannelTracker, StepTracker, TracePhase};
use wireflow::types::NodeId;

fn engine() -> (Arc<Engine>, CallLog, ValueLog) {
    let calls = new_call_log();
    let values = new_value_log();
    let engine = Arc::new(Engine::new(test_registry(&calls, &values)));
    (engine, calls, values)
}

fn drain<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

#[tokio::test]
async fn channel_tracker_sees_enter_exit_pairs_in_order() {
    let (engine, _, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    engine.activate_tracker(Arc::new(ChannelTracker::new(tx)));
    engine
        .execute_event(&graph, owner, "on_start", vec![])
        .await
        .unwrap();
    engine.deactivate_tracker();

    let events = drain(&mut rx);
    let trace: Vec<(String, TracePhase)> = events
        .iter()
        .map(|e| (e.at.node.to_string(), e.phase))
        .collect();
    assert_eq!(
        trace,
        vec![
            ("start".to_string(), TracePhase::Enter),
            ("start".to_string(), TracePhase::Exit),
            ("a".to_string(), TracePhase::Enter),
            ("a".to_string(), TracePhase::Exit),
            ("b".to_string(), TracePhase::Enter),
            ("b".to_string(), TracePhase::Exit),
        ]
    );
}

#[tokio::test]
async fn tracker_stack_restores_the_previous_tracker() {
    let (engine, _, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    let (tx_outer, mut rx_outer) = tokio::sync::mpsc::unbounded_channel();
    let (tx_debug, mut rx_debug) = tokio::sync::mpsc::unbounded_channel();

    engine.activate_tracker(Arc::new(ChannelTracker::new(tx_outer)));
    engine.activate_tracker(Arc::new(ChannelTracker::new(tx_debug)));

    engine
        .execute_event(&graph, owner, "on_start", vec![])
        .await
        .unwrap();
    assert_eq!(drain(&mut rx_debug).len(), 6, "active tracker observes the run");
    assert!(drain(&mut rx_outer).is_empty(), "saved tracker stays silent");

    // Leaving the debug session restores the saved tracker.
    engine.deactivate_tracker();
    engine
        .execute_event(&graph, owner, "on_start", vec![])
        .await
        .unwrap();
    assert_eq!(drain(&mut rx_outer).len(), 6);
}

#[tokio::test]
async fn paused_run_executes_nothing_until_stepped() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    let (tracker, debug) = StepTracker::new();
    engine.activate_tracker(Arc::new(tracker));
    debug.pause();

    let run = {
        let engine = engine.clone();
        let graph = graph.clone();
        tokio::spawn(async move {
            engine.execute_event(&graph, owner, "on_start", vec![]).await
        })
    };

    // Suspended at the entry node's enter hook.
    sleep(Duration::from_millis(50)).await;
    assert!(logged(&calls).is_empty());
    assert!(!run.is_finished());

    // One step runs the event node only.
    debug.step();
    sleep(Duration::from_millis(50)).await;
    assert!(logged(&calls).is_empty(), "entry node records nothing");
    assert!(!run.is_finished());

    // Next step runs "a", then we release the run.
    debug.step();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(logged(&calls), vec!["a"]);

    debug.resume();
    run.await.unwrap().unwrap();
    assert_eq!(logged(&calls), vec!["a", "b"]);
}

#[tokio::test]
async fn breakpoints_suspend_mid_graph() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    let (tracker, debug) = StepTracker::new();
    engine.activate_tracker(Arc::new(tracker));
    debug.add_breakpoint(NodeId::new("b"));

    let run = {
        let engine = engine.clone();
        let graph = graph.clone();
        tokio::spawn(async move {
            engine.execute_event(&graph, owner, "on_start", vec![]).await
        })
    };

    sleep(Duration::from_millis(50)).await;
    // Ran freely up to the breakpoint; "b" has not executed.
    assert_eq!(logged(&calls), vec!["a"]);
    assert!(!run.is_finished());

    debug.resume();
    run.await.unwrap().unwrap();
    assert_eq!(logged(&calls), vec!["a", "b"]);
}

#[tokio::test]
async fn default_tracker_never_suspends() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    // No tracker activated: the run completes without external prodding.
    engine
        .execute_event(&graph, owner, "on_start", vec![])
        .await
        .unwrap();
    assert_eq!(logged(&calls), vec!["a", "b"]);
}
