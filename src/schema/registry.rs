//! Registry loading and lookups

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use serde_yaml::Value as YamlValue;

use crate::error::{MnemonError, Result};
use crate::schema::spec::{
    EntitySpec, IdPolicy, RegistryDefaults, RelationSpec,
};
use crate::schema::validate::EntityValidator;
use crate::types::Memory;

static ENTITY_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());
static PREDICATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());

/// Loaded and compiled schema registry
#[derive(Debug)]
pub struct SchemaRegistry {
    version: Option<String>,
    id_policy: Option<IdPolicy>,
    defaults: RegistryDefaults,
    /// Lowercased entity name -> spec, in declaration order
    entities: Vec<(String, EntitySpec)>,
    validators: HashMap<String, EntityValidator>,
    relations: Vec<RelationSpec>,
}

impl SchemaRegistry {
    /// Load a registry file. Fails if the file is missing, unparsable,
    /// empty, or lacks an `entities` section.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MnemonError::Schema(format!("schema registry not readable at {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse a registry from YAML text (used by `load` and by tests)
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(MnemonError::Schema("empty schema registry".to_string()));
        }
        let doc: YamlValue = serde_yaml::from_str(raw)?;
        if !doc.is_mapping() {
            return Err(MnemonError::Schema("registry root must be a mapping".to_string()));
        }

        let version = doc.get("version").and_then(|v| v.as_str()).map(String::from);
        let id_policy: Option<IdPolicy> = doc
            .get("id_policy")
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()?;
        let defaults: RegistryDefaults = doc
            .get("defaults")
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();

        let entities_value = doc
            .get("entities")
            .ok_or_else(|| MnemonError::Schema("registry has no entities section".to_string()))?;
        let entities = normalize_entities(entities_value)?;
        if entities.is_empty() {
            return Err(MnemonError::Schema("entities section is empty".to_string()));
        }

        let mut validators = HashMap::with_capacity(entities.len());
        for (name, spec) in &entities {
            validators.insert(name.clone(), EntityValidator::compile(spec)?);
        }

        let relations: Vec<RelationSpec> = doc
            .get("relations")
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();
        for relation in &relations {
            if relation.predicates.is_empty() {
                return Err(MnemonError::Schema(
                    "relation declares no predicates".to_string(),
                ));
            }
            for predicate in &relation.predicates {
                if !PREDICATE_RE.is_match(predicate) {
                    return Err(MnemonError::Schema(format!(
                        "predicate '{predicate}' must be an uppercase identifier"
                    )));
                }
            }
        }

        Ok(Self {
            version,
            id_policy,
            defaults,
            entities,
            validators,
            relations,
        })
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn id_policy(&self) -> Option<&IdPolicy> {
        self.id_policy.as_ref()
    }

    pub fn defaults(&self) -> &RegistryDefaults {
        &self.defaults
    }

    /// Ordered mapping of lowercased entity name -> spec
    pub fn entities(&self) -> &[(String, EntitySpec)] {
        &self.entities
    }

    /// All entity type names, in declaration order
    pub fn entity_names(&self) -> Vec<String> {
        self.entities.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Look up an entity spec; the error enumerates known types
    pub fn entity(&self, name: &str) -> Result<&EntitySpec> {
        let key = name.to_lowercase();
        self.entities
            .iter()
            .find(|(entity_name, _)| *entity_name == key)
            .map(|(_, spec)| spec)
            .ok_or_else(|| self.unknown_type_error(name))
    }

    fn unknown_type_error(&self, name: &str) -> MnemonError {
        MnemonError::Validation(format!(
            "Unknown memory type '{}'; known types are: {}",
            name,
            self.entity_names().join(", ")
        ))
    }

    fn validator(&self, name: &str) -> Result<&EntityValidator> {
        self.validators
            .get(&name.to_lowercase())
            .ok_or_else(|| self.unknown_type_error(name))
    }

    /// The string field embedded for this type. Declared or nothing.
    pub fn anchor_field(&self, name: &str) -> Result<&str> {
        Ok(self.validator(name)?.anchor_field())
    }

    /// Resolve and trim the anchor text of a memory. Fails if the field is
    /// missing, empty after trimming, or not a string.
    pub fn anchor_text(&self, memory: &Memory) -> Result<String> {
        let anchor_field = self.anchor_field(&memory.memory_type)?;
        let value = memory.get(anchor_field);
        let text = match value {
            Some(Value::String(s)) => s.trim(),
            Some(other) => {
                return Err(MnemonError::Validation(format!(
                    "Anchor field '{}' of type '{}' must be a string, got {}",
                    anchor_field,
                    memory.memory_type,
                    if other.is_null() { "null" } else { "a non-string value" }
                )))
            }
            None => "",
        };
        if text.is_empty() {
            return Err(MnemonError::Validation(format!(
                "Anchor field '{}' is missing or empty for memory type '{}'",
                anchor_field, memory.memory_type
            )));
        }
        Ok(text.to_string())
    }

    /// Validate a caller payload against the entity's compiled validator
    /// and return the cleaned payload (system fields stripped).
    pub fn validate_payload(
        &self,
        memory_type: &str,
        payload: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>> {
        self.validator(memory_type)?.validate(payload)
    }

    /// Scalar payload fields projected onto the graph node for a type
    pub fn primitive_fields(&self, memory_type: &str) -> Result<Vec<String>> {
        Ok(self
            .validator(memory_type)?
            .primitive_fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Relation catalog as declared
    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    /// Uppercase predicate identifiers over the union of all relations
    pub fn relation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .relations
            .iter()
            .flat_map(|relation| relation.predicates.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// True iff `(source, predicate, target)` is declared, exactly or via
    /// a wildcard selector.
    pub fn relation_allowed(&self, source_type: &str, predicate: &str, target_type: &str) -> bool {
        let predicate = predicate.to_uppercase();
        self.relations.iter().any(|relation| {
            relation.predicates.iter().any(|p| *p == predicate)
                && relation.source.matches(source_type)
                && relation.target.matches(target_type)
        })
    }

    /// Whether traversal over a predicate honors edge orientation.
    /// Unknown predicates default to directed.
    pub fn relation_directed(&self, predicate: &str) -> bool {
        let predicate = predicate.to_uppercase();
        self.relations
            .iter()
            .find(|relation| relation.predicates.iter().any(|p| *p == predicate))
            .map(|relation| relation.directed)
            .unwrap_or(true)
    }

    /// Every `(source_type, predicate, target_type)` triple a predicate may
    /// connect, with wildcards expanded over the declared entities.
    pub fn edge_triples(&self, predicates: Option<&[String]>) -> Vec<(String, String, String)> {
        let all_names = self.entity_names();
        let mut triples = Vec::new();
        for relation in &self.relations {
            for predicate in &relation.predicates {
                if let Some(wanted) = predicates {
                    if !wanted.iter().any(|p| p.eq_ignore_ascii_case(predicate)) {
                        continue;
                    }
                }
                for source in relation.source.expand(&all_names) {
                    for target in relation.target.expand(&all_names) {
                        triples.push((source.clone(), predicate.clone(), target.clone()));
                    }
                }
            }
        }
        triples.sort();
        triples.dedup();
        triples
    }
}

/// Normalize the entities section (list or mapping) into ordered
/// `(lowercased_name, spec)` pairs.
fn normalize_entities(value: &YamlValue) -> Result<Vec<(String, EntitySpec)>> {
    let mut out: Vec<(String, EntitySpec)> = Vec::new();

    match value {
        YamlValue::Sequence(items) => {
            for item in items {
                let spec: EntitySpec = serde_yaml::from_value(item.clone())?;
                push_entity(&mut out, spec.name.clone(), spec)?;
            }
        }
        YamlValue::Mapping(map) => {
            for (key, item) in map {
                let name = key
                    .as_str()
                    .ok_or_else(|| MnemonError::Schema("entity name must be a string".to_string()))?
                    .to_string();
                // The mapping key wins over any inline `name`
                let mut spec: EntitySpec = match item {
                    YamlValue::Mapping(inner) => {
                        let mut inner = inner.clone();
                        let name_key = YamlValue::from("name");
                        if !inner.contains_key(&name_key) {
                            inner.insert(name_key, YamlValue::from(name.clone()));
                        }
                        serde_yaml::from_value(YamlValue::Mapping(inner))?
                    }
                    _ => {
                        return Err(MnemonError::Schema(format!(
                            "entity '{name}' must be a mapping"
                        )))
                    }
                };
                spec.name = name.clone();
                push_entity(&mut out, name, spec)?;
            }
        }
        _ => {
            return Err(MnemonError::Schema(
                "entities must be a list or a mapping".to_string(),
            ))
        }
    }

    Ok(out)
}

fn push_entity(out: &mut Vec<(String, EntitySpec)>, name: String, mut spec: EntitySpec) -> Result<()> {
    let key = name.to_lowercase();
    if !ENTITY_NAME_RE.is_match(&key) {
        return Err(MnemonError::Schema(format!(
            "entity name '{name}' must match [a-z][a-z0-9_]*"
        )));
    }
    if out.iter().any(|(existing, _)| *existing == key) {
        return Err(MnemonError::Schema(format!("duplicate entity '{key}'")));
    }
    spec.name = key.clone();
    if spec.anchor.trim().is_empty() {
        return Err(MnemonError::Schema(format!(
            "entity '{key}' is missing a non-empty anchor"
        )));
    }
    out.push((key, spec));
    Ok(())
}
