//! Retrieval pipeline behavior: mode selection, neighbor expansion,
//! projection, and hybrid merging
//!
//! Run with: cargo test --test retrieval_tests

mod helpers;

use std::collections::HashMap;

use serde_json::json;

use helpers::{payload, service};
use mnemon::pipeline::retrieval::{NEIGHBOR_DECAY, NEIGHBOR_FLOOR};
use mnemon::types::{DetailLevel, ResultSource, SearchMode, SearchRequest};

// ============================================================================
// MODE SELECTION
// ============================================================================

#[test]
fn query_alone_selects_vector_mode() {
    let service = service();
    service
        .add("note", payload(&[("statement", json!("vector mode wins"))]), "u1", None)
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("vector mode wins".to_string()),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results.iter().all(|r| r.source == ResultSource::Vector));
}

#[test]
fn structural_filter_alone_selects_graph_mode() {
    let service = service();
    service
        .add("note", payload(&[("statement", json!("structural"))]), "u1", None)
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                memory_type: Some("note".to_string()),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, ResultSource::Graph);
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn explicit_mode_is_honored() {
    let service = service();
    service
        .add("note", payload(&[("statement", json!("forced graph"))]), "u1", None)
        .unwrap();

    // Query present but mode forced to graph: candidates get reranked
    let results = service
        .search(
            &SearchRequest {
                query: Some("forced graph".to_string()),
                mode: Some(SearchMode::Graph),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, ResultSource::Graph);
    // Reranked by actual vector similarity, so well above the 0.5 default
    assert!(results[0].score > 0.5);
}

#[test]
fn vector_mode_without_query_is_rejected() {
    let service = service();
    let err = service
        .search(
            &SearchRequest {
                mode: Some(SearchMode::Vector),
                memory_type: Some("note".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn unknown_memo_type_fails_before_any_store_call() {
    let service = service();
    let err = service
        .search(
            &SearchRequest {
                memory_type: Some("calendar".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("note"));
}

// ============================================================================
// HYBRID
// ============================================================================

#[test]
fn hybrid_merges_by_id_with_max_score() {
    let service = service();
    service
        .add("note", payload(&[("statement", json!("hybrid search target"))]), "u1", None)
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("hybrid search target".to_string()),
                mode: Some(SearchMode::Hybrid),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();

    // One record found by both paths comes back once, tagged hybrid
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, ResultSource::Hybrid);
}

// ============================================================================
// NEIGHBOR EXPANSION
// ============================================================================

#[test]
fn neighbors_inherit_decayed_score() {
    let service = service();
    let seed = service
        .add("note", payload(&[("statement", json!("seed statement about databases"))]), "u1", None)
        .unwrap();
    let doc = service
        .add("document", payload(&[("statement", json!("entirely unrelated topic"))]), "u1", None)
        .unwrap();
    service
        .add_relationship(
            seed.hrid.as_deref().unwrap(),
            doc.hrid.as_deref().unwrap(),
            "ANNOTATES",
            None,
            None,
            "u1",
        )
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("seed statement about databases".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();

    let seed_hit = results.iter().find(|r| r.memory.id == seed.id).unwrap();
    let neighbor_hit = results.iter().find(|r| r.memory.id == doc.id).unwrap();

    assert_eq!(neighbor_hit.source, ResultSource::Neighbor("ANNOTATES".to_string()));
    let expected = (seed_hit.score * NEIGHBOR_DECAY).max(NEIGHBOR_FLOOR);
    assert!((neighbor_hit.score - expected).abs() < 1e-6);
    assert_eq!(neighbor_hit.metadata["relation_type"], json!("ANNOTATES"));
}

#[test]
fn direct_hit_keeps_its_own_higher_score() {
    let service = service();
    let a = service
        .add("note", payload(&[("statement", json!("shared postgres wisdom"))]), "u1", None)
        .unwrap();
    let b = service
        .add("document", payload(&[("statement", json!("more postgres wisdom here"))]), "u1", None)
        .unwrap();
    service
        .add_relationship(
            a.hrid.as_deref().unwrap(),
            b.hrid.as_deref().unwrap(),
            "ANNOTATES",
            None,
            None,
            "u1",
        )
        .unwrap();

    // Query b's exact text: its direct score dominates any decayed
    // neighbor copy seeded from a
    let results = service
        .search(
            &SearchRequest {
                query: Some("more postgres wisdom here".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();

    let b_hit = results.iter().find(|r| r.memory.id == b.id).unwrap();
    assert_eq!(b_hit.source, ResultSource::Vector);
    assert!(b_hit.score > 0.9);
}

#[test]
fn relation_filter_restricts_expansion() {
    let service = service();
    let a = service
        .add("task", payload(&[("statement", json!("first task step"))]), "u1", None)
        .unwrap();
    let b = service
        .add("task", payload(&[("statement", json!("second task step"))]), "u1", None)
        .unwrap();
    service
        .add_relationship(
            a.hrid.as_deref().unwrap(),
            b.hrid.as_deref().unwrap(),
            "BLOCKS",
            None,
            None,
            "u1",
        )
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("first task step".to_string()),
                relation_names: Some(vec!["ANNOTATES".to_string()]),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results
        .iter()
        .all(|r| !matches!(r.source, ResultSource::Neighbor(_))));
}

#[test]
fn undirected_relations_traverse_both_ways() {
    let service = service();
    let a = service
        .add("note", payload(&[("statement", json!("origin of the link"))]), "u1", None)
        .unwrap();
    let b = service
        .add("note", payload(&[("statement", json!("completely different words"))]), "u1", None)
        .unwrap();
    // RELATES_TO is declared undirected; store it a -> b
    service
        .add_relationship(
            a.hrid.as_deref().unwrap(),
            b.hrid.as_deref().unwrap(),
            "RELATES_TO",
            None,
            None,
            "u1",
        )
        .unwrap();

    // Searching for b should surface a through the reverse edge
    let results = service
        .search(
            &SearchRequest {
                query: Some("completely different words".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results.iter().any(|r| {
        r.memory.id == a.id && matches!(&r.source, ResultSource::Neighbor(p) if p == "RELATES_TO")
    }));
}

#[test]
fn directed_relations_do_not_traverse_backwards() {
    let service = service();
    let blocker = service
        .add("task", payload(&[("statement", json!("the blocking work item"))]), "u1", None)
        .unwrap();
    let blocked = service
        .add("task", payload(&[("statement", json!("waiting on something else"))]), "u1", None)
        .unwrap();
    service
        .add_relationship(
            blocker.hrid.as_deref().unwrap(),
            blocked.hrid.as_deref().unwrap(),
            "BLOCKS",
            None,
            None,
            "u1",
        )
        .unwrap();

    // Seed on the target side; BLOCKS is directed, so the blocker must
    // not appear via a reverse hop
    let results = service
        .search(
            &SearchRequest {
                query: Some("waiting on something else".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results.iter().all(|r| {
        !(r.memory.id == blocker.id && matches!(r.source, ResultSource::Neighbor(_)))
    }));
}

// ============================================================================
// PROJECTION
// ============================================================================

#[test]
fn default_projection_returns_anchor_only() {
    let service = service();
    service
        .add(
            "task",
            payload(&[
                ("statement", json!("projected task")),
                ("status", json!("todo")),
                ("priority", json!(3)),
            ]),
            "u1",
            None,
        )
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("projected task".to_string()),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    let memory = &results[0].memory;
    assert_eq!(memory.get("statement"), Some(&json!("projected task")));
    assert!(memory.get("status").is_none());
    assert!(memory.get("priority").is_none());
}

#[test]
fn self_projection_honors_allow_list() {
    let service = service();
    service
        .add(
            "task",
            payload(&[
                ("statement", json!("allow listed")),
                ("status", json!("todo")),
                ("priority", json!(3)),
            ]),
            "u1",
            None,
        )
        .unwrap();

    let mut projection = HashMap::new();
    projection.insert("task".to_string(), vec!["status".to_string()]);
    // Unknown projected types are ignored
    projection.insert("calendar".to_string(), vec!["when".to_string()]);

    let results = service
        .search(
            &SearchRequest {
                query: Some("allow listed".to_string()),
                include_details: DetailLevel::SelfFields,
                projection,
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    let memory = &results[0].memory;
    assert_eq!(memory.get("statement"), Some(&json!("allow listed")));
    assert_eq!(memory.get("status"), Some(&json!("todo")));
    assert!(memory.get("priority").is_none());
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn identical_searches_return_identical_sequences() {
    let service = service();
    for i in 0..6 {
        service
            .add(
                "note",
                payload(&[("statement", json!(format!("note about databases number {i}")))]),
                "u1",
                None,
            )
            .unwrap();
    }

    let request = SearchRequest {
        query: Some("databases".to_string()),
        limit: Some(4),
        ..SearchRequest::default()
    };
    let first = service.search(&request, "u1").unwrap();
    let second = service.search(&request, "u1").unwrap();

    let sequence = |results: &[mnemon::types::SearchResult]| {
        results
            .iter()
            .map(|r| (r.memory.id.clone(), r.score.to_bits(), r.source.as_str()))
            .collect::<Vec<_>>()
    };
    assert_eq!(sequence(&first), sequence(&second));
    assert!(first.len() <= 4);
}
