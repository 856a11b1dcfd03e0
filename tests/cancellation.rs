mod common;
use common::*;

use wireflow::document::{GraphDocument, NodeSpec};
use wireflow::engine::{Engine, EngineConfig};
use wireflow::flow::FlowError;

fn engine() -> (Engine, CallLog, ValueLog) {
    let calls = new_call_log();
    let values = new_value_log();
    let engine = Engine::new(test_registry(&calls, &values));
    (engine, calls, values)
}

/// Chain document plus a teardown handler: `on_teardown -> bye`.
fn doc_with_teardown() -> GraphDocument {
    chain_document()
        .with_node(NodeSpec::event("down", "on_teardown").with_next("bye"))
        .with_node(mark_node("bye", &[]))
}

#[tokio::test]
async fn cancelled_context_fails_before_any_node_executes() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    engine.hosts().cancel(owner);

    let result = engine.execute_event(&graph, owner, "on_start", vec![]).await;
    assert!(matches!(result, Err(FlowError::Cancelled)));
    assert!(logged(&calls).is_empty(), "cancellation precedes execution");
}

#[tokio::test]
async fn teardown_event_suppresses_cancellation() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&doc_with_teardown()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    engine.hosts().cancel(owner);

    // Ordinary events are refused...
    assert!(matches!(
        engine.execute_event(&graph, owner, "on_start", vec![]).await,
        Err(FlowError::Cancelled)
    ));
    // ...but the teardown notification still runs to completion.
    engine
        .execute_event(&graph, owner, "on_teardown", vec![])
        .await
        .unwrap();
    assert_eq!(logged(&calls), vec!["bye"]);
}

#[tokio::test]
async fn destroy_host_runs_teardown_then_removes_the_entry() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&doc_with_teardown()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    engine.destroy_host(owner).await;

    assert_eq!(logged(&calls), vec!["bye"]);
    assert!(!engine.hosts().is_alive(owner));

    // Runs for the dead owner are cancelled from birth.
    assert!(matches!(
        engine.execute_event(&graph, owner, "on_start", vec![]).await,
        Err(FlowError::Cancelled)
    ));
}

#[tokio::test]
async fn destroy_host_without_teardown_handler_is_quiet() {
    let (engine, calls, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    engine.destroy_host(owner).await;
    assert!(logged(&calls).is_empty());
    assert!(!engine.hosts().is_alive(owner));
}

#[tokio::test]
async fn custom_teardown_event_name_is_honored() {
    let calls = new_call_log();
    let values = new_value_log();
    let engine = Engine::with_config(
        test_registry(&calls, &values),
        EngineConfig::default().with_teardown_event("on_despawn"),
    );
    let doc = chain_document()
        .with_node(NodeSpec::event("down", "on_despawn").with_next("bye"))
        .with_node(mark_node("bye", &[]));
    let graph = engine.compile(&doc).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));

    engine.destroy_host(owner).await;
    assert_eq!(logged(&calls), vec!["bye"]);
}

#[tokio::test]
async fn probe_dispatch_treats_cancellation_as_found() {
    let (engine, _, _) = engine();
    let graph = engine.compile(&chain_document()).unwrap();
    let owner = engine.register_host("Agent", Some(&graph));
    engine.hosts().cancel(owner);

    // The event exists; cancellation is a silent early termination, not an
    // unknown-name condition.
    assert!(engine.try_execute_event(&graph, owner, "on_start", vec![]).await);
}
