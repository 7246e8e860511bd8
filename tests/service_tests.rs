//! End-to-end service scenarios over in-memory stores
//!
//! Run with: cargo test --test service_tests

mod helpers;

use std::sync::Arc;

use serde_json::json;

use helpers::{payload, service, service_with_stores, REGISTRY};
use mnemon::store::{GraphStore, VectorStore};
use mnemon::types::{ListRequest, ResultSource, SearchMode, SearchRequest};

// ============================================================================
// CREATE AND SEARCH
// ============================================================================

#[test]
fn create_then_vector_search_finds_it() {
    let service = service();
    let memory = service
        .add(
            "note",
            payload(&[("statement", json!("Set up Postgres with Docker"))]),
            "u1",
            None,
        )
        .unwrap();
    assert_eq!(memory.hrid.as_deref(), Some("NOTE_AAA000"));

    let results = service
        .search(
            &SearchRequest {
                query: Some("postgres docker".to_string()),
                limit: Some(5),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();

    assert_eq!(results.len(), 1);
    let hit = &results[0];
    assert_eq!(
        hit.memory.get("statement"),
        Some(&json!("Set up Postgres with Docker"))
    );
    assert_eq!(hit.source, ResultSource::Vector);
    assert!(hit.score >= 0.3, "expected score >= 0.3, got {}", hit.score);
}

#[test]
fn search_is_scoped_per_user() {
    let service = service();
    service
        .add(
            "note",
            payload(&[("statement", json!("private to user one"))]),
            "u1",
            None,
        )
        .unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("private user one".to_string()),
                ..SearchRequest::default()
            },
            "u2",
        )
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn add_then_get_round_trips_payload() {
    let service = service();
    let created = service
        .add(
            "task",
            payload(&[
                ("statement", json!("Ship the release")),
                ("status", json!("todo")),
                ("priority", json!(1)),
            ]),
            "u1",
            Some(vec!["release".to_string()]),
        )
        .unwrap();

    let fetched = service.get(created.hrid.as_deref().unwrap(), "u1").unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.get("statement"), Some(&json!("Ship the release")));
    assert_eq!(fetched.get("status"), Some(&json!("todo")));
    assert_eq!(fetched.get("priority"), Some(&json!(1)));
    assert_eq!(fetched.tags, vec!["release"]);
}

#[test]
fn get_unknown_hrid_is_not_found() {
    let service = service();
    let err = service.get("NOTE_AAA042", "u1").unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn enum_violation_lists_legal_choices() {
    let service = service();
    let err = service
        .add(
            "task",
            payload(&[("statement", json!("X")), ("status", json!("completed"))]),
            "u1",
            None,
        )
        .unwrap_err();

    assert_eq!(err.kind(), "validation");
    let message = err.to_string();
    for choice in ["backlog", "todo", "in_progress", "in_review", "done", "cancelled"] {
        assert!(message.contains(choice), "missing '{choice}' in: {message}");
    }
}

#[test]
fn unknown_type_lists_known_types() {
    let service = service();
    let err = service
        .add("meeting", payload(&[("statement", json!("x"))]), "u1", None)
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    let message = err.to_string();
    for known in ["note", "document", "task"] {
        assert!(message.contains(known), "missing '{known}' in: {message}");
    }
}

#[test]
fn blank_anchor_is_rejected() {
    let service = service();
    let err = service
        .add("note", payload(&[("statement", json!("   "))]), "u1", None)
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn system_fields_cannot_be_injected() {
    let registry = r#"
entities:
  note:
    anchor: statement
    fields:
      statement: {type: string, required: true}
      rank: {type: float, system: true}
"#;
    let service = helpers::service_with_registry(registry);
    let memory = service
        .add(
            "note",
            payload(&[("statement", json!("hello")), ("rank", json!(0.99))]),
            "u1",
            None,
        )
        .unwrap();
    assert!(memory.get("rank").is_none());
}

// ============================================================================
// RELATIONSHIPS
// ============================================================================

#[test]
fn same_predicate_different_target_types() {
    let (service, _, graph) = service_with_stores(
        REGISTRY,
        Arc::new(VectorStore::open_in_memory().unwrap()),
        Arc::new(GraphStore::open_in_memory().unwrap()),
    );

    let n1 = service
        .add("note", payload(&[("statement", json!("annotating note"))]), "u1", None)
        .unwrap();
    let d1 = service
        .add("document", payload(&[("statement", json!("a document"))]), "u1", None)
        .unwrap();
    let t1 = service
        .add(
            "task",
            payload(&[("statement", json!("a task")), ("status", json!("todo"))]),
            "u1",
            None,
        )
        .unwrap();

    let n1_hrid = n1.hrid.as_deref().unwrap();
    service
        .add_relationship(n1_hrid, d1.hrid.as_deref().unwrap(), "ANNOTATES", None, None, "u1")
        .unwrap();
    service
        .add_relationship(n1_hrid, t1.hrid.as_deref().unwrap(), "ANNOTATES", None, None, "u1")
        .unwrap();

    // Each type pair gets its own edge table under the canonical name
    let doc_edges = graph
        .query("SELECT from_id, to_id FROM \"NOTE_ANNOTATES_DOCUMENT\"", &[])
        .unwrap();
    assert_eq!(doc_edges.len(), 1);
    assert_eq!(doc_edges[0]["to_id"], json!(d1.id));

    let task_edges = graph
        .query("SELECT from_id, to_id FROM \"NOTE_ANNOTATES_TASK\"", &[])
        .unwrap();
    assert_eq!(task_edges.len(), 1);
    assert_eq!(task_edges[0]["to_id"], json!(t1.id));

    // Neighbor expansion over ANNOTATES surfaces both
    let results = service
        .list(
            &ListRequest {
                memory_type: Some("note".to_string()),
                expand_neighbors: true,
                ..ListRequest::default()
            },
            "u1",
        )
        .unwrap();
    let neighbor_ids: Vec<&str> = results
        .iter()
        .filter(|r| matches!(r.source, ResultSource::Neighbor(_)))
        .map(|r| r.memory.id.as_str())
        .collect();
    assert!(neighbor_ids.contains(&d1.id.as_str()));
    assert!(neighbor_ids.contains(&t1.id.as_str()));
}

#[test]
fn add_relationship_twice_yields_one_edge() {
    let (service, _, graph) = service_with_stores(
        REGISTRY,
        Arc::new(VectorStore::open_in_memory().unwrap()),
        Arc::new(GraphStore::open_in_memory().unwrap()),
    );
    let a = service
        .add("task", payload(&[("statement", json!("a"))]), "u1", None)
        .unwrap();
    let b = service
        .add("task", payload(&[("statement", json!("b"))]), "u1", None)
        .unwrap();

    for _ in 0..2 {
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
    }
    let edges = graph.query("SELECT from_id FROM \"TASK_BLOCKS_TASK\"", &[]).unwrap();
    assert_eq!(edges.len(), 1);
}

#[test]
fn delete_relationship_is_idempotent() {
    let service = service();
    let a = service
        .add("task", payload(&[("statement", json!("a"))]), "u1", None)
        .unwrap();
    let b = service
        .add("task", payload(&[("statement", json!("b"))]), "u1", None)
        .unwrap();
    let (a_hrid, b_hrid) = (a.hrid.as_deref().unwrap(), b.hrid.as_deref().unwrap());

    // Deleting an edge that never existed succeeds
    service
        .delete_relationship(a_hrid, b_hrid, "BLOCKS", None, None, "u1")
        .unwrap();

    service.add_relationship(a_hrid, b_hrid, "BLOCKS", None, None, "u1").unwrap();
    service.delete_relationship(a_hrid, b_hrid, "BLOCKS", None, None, "u1").unwrap();
    service.delete_relationship(a_hrid, b_hrid, "BLOCKS", None, None, "u1").unwrap();

    let results = service
        .list(
            &ListRequest {
                memory_type: Some("task".to_string()),
                expand_neighbors: true,
                ..ListRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results
        .iter()
        .all(|r| !matches!(r.source, ResultSource::Neighbor(_))));
}

#[test]
fn undeclared_relation_is_rejected() {
    let service = service();
    let n = service
        .add("note", payload(&[("statement", json!("n"))]), "u1", None)
        .unwrap();
    let t = service
        .add("task", payload(&[("statement", json!("t"))]), "u1", None)
        .unwrap();

    // BLOCKS is declared task -> task only
    let err = service
        .add_relationship(
            n.hrid.as_deref().unwrap(),
            t.hrid.as_deref().unwrap(),
            "BLOCKS",
            None,
            None,
            "u1",
        )
        .unwrap_err();
    assert_eq!(err.kind(), "schema");
}

#[test]
fn cross_user_relationship_is_rejected() {
    let service = service();
    let a = service
        .add("task", payload(&[("statement", json!("mine"))]), "u1", None)
        .unwrap();
    service
        .add("task", payload(&[("statement", json!("theirs"))]), "u2", None)
        .unwrap();

    // u2's TASK_AAA000 is invisible to u1's resolve
    let err = service
        .add_relationship(a.hrid.as_deref().unwrap(), "TASK_AAA001", "BLOCKS", None, None, "u1")
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn update_preserves_identity_and_relationships() {
    let service = service();
    let a = service
        .add(
            "task",
            payload(&[("statement", json!("A")), ("status", json!("todo"))]),
            "u1",
            None,
        )
        .unwrap();
    let b = service
        .add(
            "task",
            payload(&[("statement", json!("B")), ("status", json!("todo"))]),
            "u1",
            None,
        )
        .unwrap();
    let (a_hrid, b_hrid) = (a.hrid.clone().unwrap(), b.hrid.clone().unwrap());
    service
        .add_relationship(&a_hrid, &b_hrid, "BLOCKS", None, None, "u1")
        .unwrap();

    let updated = service
        .update(&a_hrid, payload(&[("status", json!("in_progress"))]), "u1")
        .unwrap();

    assert_eq!(updated.id, a.id);
    assert_eq!(updated.hrid.as_deref(), Some(a_hrid.as_str()));
    assert_eq!(updated.created_at, a.created_at);
    assert!(updated.updated_at > a.updated_at);
    assert_eq!(updated.get("status"), Some(&json!("in_progress")));
    assert_eq!(updated.get("statement"), Some(&json!("A")));

    let fetched = service.get(&a_hrid, "u1").unwrap();
    assert_eq!(fetched.id, a.id);
    assert_eq!(fetched.get("status"), Some(&json!("in_progress")));

    // The BLOCKS edge survived the update
    let results = service
        .list(
            &ListRequest {
                memory_type: Some("task".to_string()),
                expand_neighbors: true,
                ..ListRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results.iter().any(|r| {
        matches!(&r.source, ResultSource::Neighbor(p) if p == "BLOCKS") && r.memory.id == b.id
    }));
}

#[test]
fn update_with_same_payload_only_advances_updated_at() {
    let service = service();
    let created = service
        .add(
            "task",
            payload(&[("statement", json!("steady")), ("status", json!("todo"))]),
            "u1",
            None,
        )
        .unwrap();
    let hrid = created.hrid.as_deref().unwrap();

    let updated = service
        .update(hrid, payload(&[("status", json!("todo"))]), "u1")
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.payload, created.payload);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
    // Anchor unchanged, so the stored vector is unchanged
    assert_eq!(updated.vector, None);
}

#[test]
fn update_invalid_enum_is_rejected() {
    let service = service();
    let created = service
        .add(
            "task",
            payload(&[("statement", json!("x")), ("status", json!("todo"))]),
            "u1",
            None,
        )
        .unwrap();
    let err = service
        .update(
            created.hrid.as_deref().unwrap(),
            payload(&[("status", json!("paused"))]),
            "u1",
        )
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

// ============================================================================
// DELETE
// ============================================================================

#[test]
fn delete_removes_both_stores_and_frees_hrid() {
    let (service, vector, graph) = service_with_stores(
        REGISTRY,
        Arc::new(VectorStore::open_in_memory().unwrap()),
        Arc::new(GraphStore::open_in_memory().unwrap()),
    );
    let created = service
        .add("note", payload(&[("statement", json!("short lived"))]), "u1", None)
        .unwrap();
    let hrid = created.hrid.clone().unwrap();

    service.delete(&hrid, "u1").unwrap();
    assert!(vector.get("memories", &created.id).unwrap().is_none());
    assert!(graph.get_node("note", &created.id).unwrap().is_none());
    assert_eq!(service.get(&hrid, "u1").unwrap_err().kind(), "not_found");

    // Idempotent
    service.delete(&hrid, "u1").unwrap();
}

#[test]
fn deleted_memory_stops_appearing_as_neighbor() {
    let service = service();
    let a = service
        .add("task", payload(&[("statement", json!("keeper"))]), "u1", None)
        .unwrap();
    let b = service
        .add("task", payload(&[("statement", json!("goner"))]), "u1", None)
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

    service.delete(b.hrid.as_deref().unwrap(), "u1").unwrap();

    let results = service
        .list(
            &ListRequest {
                memory_type: Some("task".to_string()),
                expand_neighbors: true,
                ..ListRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results.iter().all(|r| r.memory.id != b.id));
}

// ============================================================================
// GRAPH OUTAGE FALLBACK
// ============================================================================

#[test]
fn graph_outage_falls_back_to_vector_search() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.db");
    let (service, _, _) = service_with_stores(
        REGISTRY,
        Arc::new(VectorStore::open_in_memory().unwrap()),
        Arc::new(GraphStore::open(&graph_path).unwrap()),
    );
    service
        .add("note", payload(&[("statement", json!("survives the outage"))]), "u1", None)
        .unwrap();

    // Sabotage the node table behind the service's back; its catalog
    // still believes the table exists
    let saboteur = GraphStore::open(&graph_path).unwrap();
    saboteur.query("DROP TABLE \"node_note\"", &[]).unwrap();

    let results = service
        .search(
            &SearchRequest {
                query: Some("survives outage".to_string()),
                mode: Some(SearchMode::Graph),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.source == ResultSource::Vector));
}

#[test]
fn graph_outage_without_query_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.db");
    let (service, _, _) = service_with_stores(
        REGISTRY,
        Arc::new(VectorStore::open_in_memory().unwrap()),
        Arc::new(GraphStore::open(&graph_path).unwrap()),
    );
    service
        .add("note", payload(&[("statement", json!("structural only"))]), "u1", None)
        .unwrap();

    let saboteur = GraphStore::open(&graph_path).unwrap();
    saboteur.query("DROP TABLE \"node_note\"", &[]).unwrap();

    // No query, only a structural filter: there is nothing to embed, so
    // the outage degrades to no results rather than an error
    let results = service
        .search(
            &SearchRequest {
                memory_type: Some("note".to_string()),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert!(results.is_empty());
}

// ============================================================================
// DETERMINISTIC ORDERING
// ============================================================================

#[test]
fn equal_scores_order_by_hrid_index_and_repeat_identically() {
    let service = service();
    service
        .add("note", payload(&[("statement", json!("alpha entry"))]), "u1", None)
        .unwrap();
    service
        .add("document", payload(&[("statement", json!("beta entry"))]), "u1", None)
        .unwrap();
    service
        .add(
            "task",
            payload(&[("statement", json!("gamma entry")), ("status", json!("todo"))]),
            "u1",
            None,
        )
        .unwrap();

    let request = SearchRequest {
        memory_type: None,
        modified_within_days: Some(7),
        mode: Some(SearchMode::Graph),
        neighbor_cap: Some(0),
        ..SearchRequest::default()
    };

    let first = service.search(&request, "u1").unwrap();
    let second = service.search(&request, "u1").unwrap();

    // All scores are 1.0 on the no-query graph path; ordering falls to
    // the HRID index
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|r| (r.score - 1.0).abs() < 1e-6));
    let indices: Vec<u64> = first
        .iter()
        .map(|r| mnemon::hrid::hrid_to_index(r.memory.hrid.as_deref().unwrap()).unwrap())
        .collect();
    let mut sorted = indices.clone();
    sorted.sort();
    assert_eq!(indices, sorted);

    let sequence = |results: &[mnemon::types::SearchResult]| {
        results
            .iter()
            .map(|r| (r.memory.id.clone(), r.score.to_bits(), r.source.as_str()))
            .collect::<Vec<_>>()
    };
    assert_eq!(sequence(&first), sequence(&second));
}

// ============================================================================
// LIST AND TIME SCOPING
// ============================================================================

#[test]
fn list_filters_by_type_and_paginates() {
    let service = service();
    for i in 0..5 {
        service
            .add("note", payload(&[("statement", json!(format!("note {i}")))]), "u1", None)
            .unwrap();
    }
    service
        .add("task", payload(&[("statement", json!("a task"))]), "u1", None)
        .unwrap();

    let notes = service
        .list(
            &ListRequest {
                memory_type: Some("note".to_string()),
                limit: Some(3),
                ..ListRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert_eq!(notes.len(), 3);
    assert!(notes.iter().all(|r| r.memory.memory_type == "note"));

    let rest = service
        .list(
            &ListRequest {
                memory_type: Some("note".to_string()),
                limit: Some(3),
                offset: Some(3),
                ..ListRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert_eq!(rest.len(), 2);
}

#[test]
fn modified_within_days_excludes_old_records() {
    let service = service();
    service
        .add("note", payload(&[("statement", json!("fresh"))]), "u1", None)
        .unwrap();

    let recent = service
        .search(
            &SearchRequest {
                memory_type: Some("note".to_string()),
                modified_within_days: Some(1),
                mode: Some(SearchMode::Graph),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    assert_eq!(recent.len(), 1);

    let none = service
        .search(
            &SearchRequest {
                memory_type: Some("note".to_string()),
                modified_within_days: Some(0),
                mode: Some(SearchMode::Graph),
                neighbor_cap: Some(0),
                ..SearchRequest::default()
            },
            "u1",
        )
        .unwrap();
    // A zero-day window still admits records updated this instant
    assert!(none.len() <= 1);
}

#[test]
fn search_without_any_basis_is_rejected() {
    let service = service();
    let err = service.search(&SearchRequest::default(), "u1").unwrap_err();
    assert_eq!(err.kind(), "validation");
}

// ============================================================================
// HRID ALLOCATION ACROSS THE SERVICE
// ============================================================================

#[test]
fn hrids_are_monotone_per_user_and_type() {
    let service = service();
    let mut previous = 0u64;
    for i in 0..4 {
        let memory = service
            .add("note", payload(&[("statement", json!(format!("n{i}")))]), "u1", None)
            .unwrap();
        let index = mnemon::hrid::hrid_to_index(memory.hrid.as_deref().unwrap()).unwrap();
        if i > 0 {
            assert!(index > previous);
        }
        previous = index;
    }
}
