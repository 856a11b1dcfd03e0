//! Randomized dependency-ordering properties over layered DAG documents.

mod common;
use common::*;

use proptest::prelude::*;
use rustc_hash::FxHashSet;
use wireflow::document::{GraphDocument, NodeSpec};
use wireflow::engine::Engine;
use wireflow::types::NodeId;

fn block_on<F: std::future::Future<Output = ()>>(fut: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(fut);
}

/// For each node `i`, a set of upstream links drawn from nodes `0..i`, a DAG
/// by construction.
fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2usize..10).prop_flat_map(|n| {
        let links = (1..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i.min(3)))
            .collect::<Vec<_>>();
        links.prop_map(move |mut per_node| {
            per_node.insert(0, Vec::new());
            per_node
        })
    })
}

fn dag_document(links: &[Vec<usize>]) -> GraphDocument {
    let last = format!("n{}", links.len() - 1);
    let mut doc = GraphDocument::new()
        .with_node(NodeSpec::event("start", "on_start").with_next(last.as_str()));
    for (i, upstream) in links.iter().enumerate() {
        let name = format!("n{i}");
        let sources: Vec<String> = upstream.iter().map(|u| format!("n{u}")).collect();
        let source_refs: Vec<&str> = sources.iter().map(String::as_str).collect();
        doc = doc.with_node(mark_node(&name, &source_refs));
    }
    doc
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Forwarding the last node of a random DAG yields a duplicate-free log
    /// in which every upstream link appears strictly before its reader.
    #[test]
    fn prop_forward_log_respects_dependencies(links in dag_strategy()) {
        block_on(async move {
            let calls = new_call_log();
            let values = new_value_log();
            let engine = Engine::new(test_registry(&calls, &values));
            let graph = engine.compile(&dag_document(&links)).unwrap();
            let owner = engine.register_host("Agent", Some(&graph));

            engine
                .execute_event(&graph, owner, "on_start", vec![])
                .await
                .unwrap();

            let log = logged(&calls);

            // At-most-once: no tag repeats.
            let unique: FxHashSet<_> = log.iter().collect();
            assert_eq!(unique.len(), log.len(), "duplicate execution in {log:?}");

            // Every executed node's upstream links executed strictly earlier.
            let position = |tag: &str| log.iter().position(|t| t == tag);
            for (i, upstream) in links.iter().enumerate() {
                let reader = format!("n{i}");
                let Some(reader_pos) = position(&reader) else { continue };
                for u in upstream {
                    let source = format!("n{u}");
                    let source_pos = position(&source)
                        .unwrap_or_else(|| panic!("{source} missing though {reader} ran"));
                    assert!(
                        source_pos < reader_pos,
                        "{source} must precede {reader} in {log:?}"
                    );
                }
            }

            // The traversal target executed, and last.
            let last = format!("n{}", links.len() - 1);
            assert_eq!(log.last(), Some(&last));
        });
    }

    /// Dependency paths are stable across recompiles of the same document.
    #[test]
    fn prop_dependency_paths_are_deterministic(links in dag_strategy()) {
        let calls = new_call_log();
        let values = new_value_log();
        let engine = Engine::new(test_registry(&calls, &values));
        let doc = dag_document(&links);

        let first = engine.compile(&doc).unwrap();
        let second = engine.compile(&doc).unwrap();
        for i in 0..links.len() {
            let id = NodeId::new(format!("n{i}"));
            assert_eq!(first.dependency_path(&id), second.dependency_path(&id));
        }
    }
}
