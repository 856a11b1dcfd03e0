mod common;
use common::*;

use wireflow::engine::Engine;
use wireflow::flow::FlowError;
use wireflow::types::NodeId;
use wireflow::value::Value;

fn engine() -> (Engine, CallLog, ValueLog) {
    let calls = new_call_log();
    let values = new_value_log();
    let engine = Engine::new(test_registry(&calls, &values));
    (engine, calls, values)
}

#[tokio::test]
async fn unknown_event_probe_returns_false_and_runs_nothing() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    let dispatched = engine
        .try_execute_event(&graph, owner, "DoesNotExist", vec![])
        .await;
    assert!(!dispatched);
    assert!(logged(&calls).is_empty());

    // The non-probing entry point reports the same condition as an error.
    let result = engine
        .execute_event(&graph, owner, "DoesNotExist", vec![])
        .await;
    assert!(matches!(result, Err(FlowError::UnknownEvent { .. })));
}

#[tokio::test]
async fn find_event_maps_names_to_entry_nodes() {
    let (engine, _, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    assert_eq!(graph.find_event("on_start"), Some(&NodeId::new("start")));
    assert_eq!(graph.find_event("nope"), None);
}

#[tokio::test]
async fn one_event_fire_executes_the_action_exactly_once() {
    // Spec scenario: OnStart wired to Log("hi"); a second unrelated event
    // causes zero re-executions.
    let (engine, calls, _) = engine();
    let doc = chain_document().with_node(wireflow::document::NodeSpec::event(
        "other",
        "on_other",
    ));
    let graph = engine.compile(&doc).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    assert!(engine.try_execute_event(&graph, owner, "on_start", vec![]).await);
    assert_eq!(logged(&calls), vec!["a", "b"]);

    assert!(engine.try_execute_event(&graph, owner, "on_other", vec![]).await);
    assert_eq!(logged(&calls), vec!["a", "b"], "no re-execution on an unrelated event");
}

#[tokio::test]
async fn woven_bridge_dispatch_resolves_the_owner_graph() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    assert!(engine.dispatch(owner, None, "on_start").await);
    assert_eq!(logged(&calls), vec!["a", "b"]);

    assert!(!engine.dispatch(owner, None, "DoesNotExist").await);
}

#[tokio::test]
async fn dispatch_without_attached_graph_fails_softly() {
    let (engine, calls, _) = engine();
    let _graph = engine.compile(&chain_document()).unwrap();
    let detached = engine.register_host("Agent", None);

    assert!(!engine.dispatch(detached, None, "on_start").await);
    assert!(logged(&calls).is_empty());
}

#[tokio::test]
async fn concurrent_flows_share_one_compiled_graph() {
    // Two event fires against the same graph; bindings and dependency paths
    // are shared read-only, each run keeps its own forward log.
    let (engine, calls, _) = engine();
    let graph = engine.compile(&diamond_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    let (first, second) = tokio::join!(
        engine.execute_event(&graph, owner, "on_start", vec![]),
        engine.execute_event(&graph, owner, "on_start", vec![]),
    );
    first.unwrap();
    second.unwrap();

    let mut counts = std::collections::HashMap::new();
    for tag in logged(&calls) {
        *counts.entry(tag).or_insert(0usize) += 1;
    }
    for tag in ["A", "B", "C", "D"] {
        assert_eq!(counts.get(tag), Some(&2), "each run executes {tag} once");
    }

    engine
        .execute_event(&graph, owner, "on_start", vec![Value::Null])
        .await
        .unwrap();
    assert_eq!(graph.active_flows(), 0, "all runs popped the active stack");
}
