//! Compiled per-type payload validators
//!
//! Each entity spec compiles into an [`EntityValidator`]: a field manifest
//! plus the checks the schema declares. Validators are built once at
//! registry load and reused for every payload.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::error::{MnemonError, Result};
use crate::schema::spec::{EntitySpec, FieldSpec, FieldType, FieldsSpec};

/// Structural validator for one entity type
#[derive(Debug, Clone)]
pub struct EntityValidator {
    name: String,
    anchor: String,
    fields: BTreeMap<String, FieldSpec>,
    required: Vec<String>,
    open: bool,
}

impl EntityValidator {
    /// Compile a validator from an entity spec
    pub fn compile(spec: &EntitySpec) -> Result<Self> {
        let mut fields: BTreeMap<String, FieldSpec> = BTreeMap::new();
        let mut required: Vec<String> = Vec::new();

        match &spec.fields {
            FieldsSpec::Flat(map) => {
                for (field_name, field_spec) in map {
                    if field_spec.field_type == FieldType::Enum
                        && field_spec.choices.as_ref().is_none_or(|c| c.is_empty())
                    {
                        return Err(MnemonError::Schema(format!(
                            "Entity '{}' field '{}' is enum but declares no choices",
                            spec.name, field_name
                        )));
                    }
                    if field_spec.required && !field_spec.system {
                        required.push(field_name.clone());
                    }
                    fields.insert(field_name.clone(), field_spec.clone());
                }
            }
            FieldsSpec::Split {
                required: req,
                optional,
            } => {
                // Split form declares names only; fields are untyped strings
                for field_name in req {
                    fields.insert(
                        field_name.clone(),
                        FieldSpec {
                            required: true,
                            ..FieldSpec::default()
                        },
                    );
                    required.push(field_name.clone());
                }
                for field_name in optional {
                    fields.entry(field_name.clone()).or_default();
                }
            }
        }

        // The anchor must be a declared string field; no fallback
        match fields.get(&spec.anchor) {
            None => {
                return Err(MnemonError::Schema(format!(
                    "Entity '{}' anchor '{}' is not a declared field",
                    spec.name, spec.anchor
                )))
            }
            Some(anchor_spec) if anchor_spec.field_type != FieldType::String => {
                return Err(MnemonError::Schema(format!(
                    "Entity '{}' anchor '{}' must be a string field, got {}",
                    spec.name,
                    spec.anchor,
                    anchor_spec.field_type.as_str()
                )))
            }
            Some(_) => {}
        }

        Ok(Self {
            name: spec.name.clone(),
            anchor: spec.anchor.clone(),
            fields,
            required,
            open: spec.open,
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.name
    }

    pub fn anchor_field(&self) -> &str {
        &self.anchor
    }

    /// Declared fields, in stable order
    pub fn field_manifest(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    /// Scalar fields projected onto graph nodes
    pub fn primitive_fields(&self) -> Vec<(String, FieldType)> {
        self.fields
            .iter()
            .filter(|(_, spec)| !spec.system && spec.field_type.is_primitive())
            .map(|(name, spec)| (name.clone(), spec.field_type))
            .collect()
    }

    /// Validate and clean a caller payload.
    ///
    /// Strips `system: true` fields, checks required presence (blank
    /// strings count as missing), rejects unknown fields on closed specs,
    /// and type-checks every declared field that is present.
    pub fn validate(&self, payload: &HashMap<String, Value>) -> Result<HashMap<String, Value>> {
        let mut cleaned: HashMap<String, Value> = HashMap::new();

        for (key, value) in payload {
            match self.fields.get(key) {
                Some(spec) if spec.system => continue,
                Some(spec) => {
                    self.check_value(key, spec, value)?;
                    cleaned.insert(key.clone(), value.clone());
                }
                None if self.open => {
                    cleaned.insert(key.clone(), value.clone());
                }
                None => {
                    return Err(MnemonError::Validation(format!(
                        "Unknown field '{}' for type '{}'",
                        key, self.name
                    )));
                }
            }
        }

        for field_name in &self.required {
            let missing = match cleaned.get(field_name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(MnemonError::Validation(format!(
                    "Missing required field '{}' for type '{}'",
                    field_name, self.name
                )));
            }
        }

        Ok(cleaned)
    }

    fn check_value(&self, field: &str, spec: &FieldSpec, value: &Value) -> Result<()> {
        // Optional fields may be null
        if value.is_null() {
            return Ok(());
        }
        let type_error = |expected: &str| {
            MnemonError::Validation(format!(
                "Field '{}' of type '{}' expects {}, got {}",
                field,
                self.name,
                expected,
                json_type_name(value)
            ))
        };
        match spec.field_type {
            FieldType::String | FieldType::Ref => {
                let s = value.as_str().ok_or_else(|| type_error("a string"))?;
                if let Some(max) = spec.max_length {
                    if s.chars().count() > max {
                        return Err(MnemonError::Validation(format!(
                            "Field '{}' exceeds max_length {} for type '{}'",
                            field, max, self.name
                        )));
                    }
                }
            }
            FieldType::Int => {
                if !value.is_i64() && !value.is_u64() {
                    return Err(type_error("an integer"));
                }
            }
            FieldType::Float => {
                if !value.is_number() {
                    return Err(type_error("a number"));
                }
            }
            FieldType::Bool => {
                if !value.is_boolean() {
                    return Err(type_error("a boolean"));
                }
            }
            FieldType::Datetime => {
                let s = value.as_str().ok_or_else(|| type_error("an RFC 3339 datetime string"))?;
                DateTime::parse_from_rfc3339(s).map_err(|_| {
                    MnemonError::Validation(format!(
                        "Field '{}' of type '{}' is not a valid RFC 3339 datetime: '{}'",
                        field, self.name, s
                    ))
                })?;
            }
            FieldType::Date => {
                let s = value.as_str().ok_or_else(|| type_error("a YYYY-MM-DD date string"))?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    MnemonError::Validation(format!(
                        "Field '{}' of type '{}' is not a valid date: '{}'",
                        field, self.name, s
                    ))
                })?;
            }
            FieldType::Enum => {
                let s = value.as_str().ok_or_else(|| type_error("a string"))?;
                let choices = spec.choices.as_deref().unwrap_or_default();
                if !choices.iter().any(|c| c == s) {
                    return Err(MnemonError::Validation(format!(
                        "Invalid value '{}' for field '{}' of type '{}'; legal choices are: {}",
                        s,
                        field,
                        self.name,
                        choices.join(", ")
                    )));
                }
            }
            FieldType::Tags => {
                let arr = value.as_array().ok_or_else(|| type_error("an array of strings"))?;
                if !arr.iter().all(Value::is_string) {
                    return Err(type_error("an array of strings"));
                }
            }
            FieldType::Vector => {
                let arr = value.as_array().ok_or_else(|| type_error("an array of numbers"))?;
                if !arr.iter().all(Value::is_number) {
                    return Err(type_error("an array of numbers"));
                }
                if let Some(dim) = spec.dim {
                    if arr.len() != dim {
                        return Err(MnemonError::Validation(format!(
                            "Field '{}' of type '{}' expects dimension {}, got {}",
                            field,
                            self.name,
                            dim,
                            arr.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
