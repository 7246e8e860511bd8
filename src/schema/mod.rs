//! Schema registry: the single source of truth for entity types, field
//! validation, embedding anchors, and the relation catalog.
//!
//! The registry file is YAML (see `spec.rs` for accepted shapes). Loading
//! compiles one validator per entity; lookups after load never touch disk.

mod registry;
pub mod spec;
pub mod validate;

pub use registry::SchemaRegistry;
pub use spec::{
    EntitySpec, FieldSpec, FieldType, FieldsSpec, IdPolicy, RegistryDefaults, RelationSpec,
    TimestampDefaults, TypeSelector, VectorDefaults,
};
pub use validate::EntityValidator;

/// Canonical edge table name for a `(source, predicate, target)` triple.
///
/// `SOURCE_PREDICATE_TARGET`, uppercase and underscore-joined, so the same
/// predicate can connect different type pairs without collision.
pub fn edge_table_name(source_type: &str, predicate: &str, target_type: &str) -> String {
    format!(
        "{}_{}_{}",
        source_type.to_uppercase(),
        predicate.to_uppercase(),
        target_type.to_uppercase()
    )
}
