//! Schema registry file model
//!
//! Supported registry shapes:
//! - `entities` as a mapping: `{note: {...}, task: {...}}`
//! - or as a list: `[{name: note, anchor: statement, fields: {...}}, ...]`
//!
//! Field declarations are either a flat mapping `name -> FieldSpec` or a
//! `{required: [...], optional: [...]}` name split (split-form fields are
//! untyped strings).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive field types understood by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Datetime,
    Date,
    Enum,
    Tags,
    Vector,
    Ref,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Datetime => "datetime",
            FieldType::Date => "date",
            FieldType::Enum => "enum",
            FieldType::Tags => "tags",
            FieldType::Vector => "vector",
            FieldType::Ref => "ref",
        }
    }

    /// Scalar types projected onto graph nodes
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::Int
                | FieldType::Float
                | FieldType::Bool
                | FieldType::Datetime
                | FieldType::Date
                | FieldType::Enum
        )
    }
}

/// Declaration of a single entity field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Legal values for `enum` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Expected dimension for `vector` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    /// Runtime-managed; never accepted from callers
    #[serde(default)]
    pub system: bool,
}

fn default_field_type() -> FieldType {
    FieldType::String
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            field_type: FieldType::String,
            required: false,
            choices: None,
            max_length: None,
            default: None,
            dim: None,
            system: false,
        }
    }
}

/// Field section: flat spec mapping or a required/optional name split.
/// `Flat` is tried first: the split form fails it because its values are
/// name lists, not field specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldsSpec {
    Flat(BTreeMap<String, FieldSpec>),
    Split {
        #[serde(default)]
        required: Vec<String>,
        #[serde(default)]
        optional: Vec<String>,
    },
}

impl Default for FieldsSpec {
    fn default() -> Self {
        FieldsSpec::Flat(BTreeMap::new())
    }
}

/// Declaration of an entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the string field embedded for this type. No fallback.
    pub anchor: String,
    #[serde(default)]
    pub fields: FieldsSpec,
    /// Accept caller fields beyond the declared ones (default closed)
    #[serde(default)]
    pub open: bool,
}

/// Source/target selector: one type name, a list, or `*`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSelector {
    One(String),
    Many(Vec<String>),
}

impl TypeSelector {
    pub fn matches(&self, entity: &str) -> bool {
        let entity = entity.to_lowercase();
        match self {
            TypeSelector::One(name) => name == "*" || name.to_lowercase() == entity,
            TypeSelector::Many(names) => names
                .iter()
                .any(|name| name == "*" || name.to_lowercase() == entity),
        }
    }

    /// Concrete type names this selector covers (expanding `*` over `all`)
    pub fn expand<'a>(&'a self, all: &'a [String]) -> Vec<String> {
        let one = |name: &str| -> Vec<String> {
            if name == "*" {
                all.to_vec()
            } else {
                vec![name.to_lowercase()]
            }
        };
        match self {
            TypeSelector::One(name) => one(name),
            TypeSelector::Many(names) => {
                let mut out: Vec<String> = names.iter().flat_map(|n| one(n)).collect();
                out.dedup();
                out
            }
        }
    }
}

/// Declaration of a relation between entity types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_directed")]
    pub directed: bool,
    /// Uppercase predicate identifiers
    pub predicates: Vec<String>,
    pub source: TypeSelector,
    pub target: TypeSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Value>,
}

fn default_directed() -> bool {
    true
}

/// Vector defaults block from the registry header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDefaults {
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
}

fn default_metric() -> String {
    "cosine".to_string()
}

/// Timestamp defaults block from the registry header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampDefaults {
    #[serde(default = "default_on")]
    pub auto_create: bool,
    #[serde(default = "default_on")]
    pub auto_update: bool,
}

fn default_on() -> bool {
    true
}

/// `defaults:` header section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorDefaults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<TimestampDefaults>,
}

/// `id_policy:` header section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdPolicy {
    #[serde(default = "default_id_kind")]
    pub kind: String,
    #[serde(default = "default_id_field")]
    pub field: String,
}

fn default_id_kind() -> String {
    "uuid".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}
