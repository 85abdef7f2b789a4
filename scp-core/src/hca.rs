//! Validation of HCA metadata payloads against the project's published JSON
//! Schemas. Only the parts of JSON Schema the HCA schemas rely on are
//! understood: `required`, `properties`, `type`, `pattern`, `items` and `$ref`.
//! Values are coerced to the declared type where the conversion is lossless
//! enough to be unambiguous.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Parsed schemas by the reference string that names them.
pub type SchemaSet = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, valuable::Valuable, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldErrorKind {
    #[error("required field is missing")]
    MissingRequired,
    #[error("'{value}' does not conform to the expected format of {pattern}")]
    PatternMismatch { value: String, pattern: String },
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("schema pattern {pattern} is not a valid regular expression")]
    InvalidPattern { pattern: String },
    #[error("could not resolve schema reference {reference}")]
    UnresolvedReference { reference: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, valuable::Valuable, thiserror::Error)]
#[error("{path}: {kind}")]
pub struct FieldError {
    pub path: String,
    pub kind: FieldErrorKind,
}

/// Looks up `schema[key]`, or `schema[key][field]` when a field is given.
#[must_use]
pub fn definitions<'a>(schema: &'a Value, key: &str, field: Option<&str>) -> Option<&'a Value> {
    let defs = schema.get(key)?;
    match field {
        Some(field) => defs.get(field),
        None => Some(defs),
    }
}

/// The documents referenced by `schema`, without fragments. Local `#/...`
/// pointers are not included.
#[must_use]
pub fn external_refs(schema: &Value) -> Vec<String> {
    fn walk(value: &Value, refs: &mut BTreeSet<String>) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let document = document_of(reference);
                    if !document.is_empty() {
                        refs.insert(document.to_string());
                    }
                }
                map.values().for_each(|v| walk(v, refs));
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, refs)),
            _ => (),
        }
    }

    let mut refs = BTreeSet::new();
    walk(schema, &mut refs);

    refs.into_iter().collect()
}

fn document_of(reference: &str) -> &str {
    reference.split_once('#').map_or(reference, |(document, _)| document)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The declared type, skipping `null` when a list of types is given.
fn declared_type(definition: &Value) -> Option<&str> {
    match definition.get("type")? {
        Value::String(t) => Some(t),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

struct Validator<'a> {
    schemas: &'a SchemaSet,
    /// Compiled once per pattern; `None` marks a pattern that does not compile.
    patterns: HashMap<&'a str, Option<Regex>>,
    errors: Vec<FieldError>,
}

impl<'a> Validator<'a> {
    fn error(&mut self, path: &str, kind: FieldErrorKind) {
        self.errors.push(FieldError {
            path: path.to_string(),
            kind,
        });
    }

    /// Follows `$ref` chains, returning the target and the document it lives in.
    fn resolve(&self, root: &'a Value, definition: &'a Value) -> Result<(&'a Value, &'a Value), String> {
        let mut root = root;
        let mut definition = definition;

        for _ in 0..32 {
            let Some(reference) = definition.get("$ref").and_then(Value::as_str) else {
                return Ok((root, definition));
            };

            let (document, fragment) = reference.split_once('#').unwrap_or((reference, ""));
            if !document.is_empty() {
                root = self.schemas.get(document).ok_or_else(|| reference.to_string())?;
            }

            definition = if fragment.is_empty() {
                root
            } else {
                root.pointer(fragment).ok_or_else(|| reference.to_string())?
            };
        }

        Err(definition.get("$ref").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    fn object(&mut self, root: &'a Value, schema: &'a Value, payload: &Map<String, Value>, path: &str) -> Map<String, Value> {
        let join = |field: &str| {
            if path.is_empty() {
                field.to_string()
            } else {
                format!("{path}.{field}")
            }
        };

        let required = definitions(schema, "required", None)
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        for field in required {
            if payload.get(field).is_none_or(Value::is_null) {
                self.error(&join(field), FieldErrorKind::MissingRequired);
            }
        }

        payload
            .iter()
            .map(|(key, value)| {
                let coerced = match definitions(schema, "properties", Some(key)) {
                    Some(definition) if !value.is_null() => self.value(root, definition, value, &join(key)),
                    _ => value.clone(),
                };
                (key.clone(), coerced)
            })
            .collect()
    }

    fn value(&mut self, root: &'a Value, definition: &'a Value, value: &Value, path: &str) -> Value {
        let (root, definition) = match self.resolve(root, definition) {
            Ok(resolved) => resolved,
            Err(reference) => {
                self.error(path, FieldErrorKind::UnresolvedReference { reference });
                return value.clone();
            }
        };

        let declared = declared_type(definition)
            .or_else(|| definition.get("properties").map(|_| "object"));

        let mismatch = |expected: &str| FieldErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: type_name(value).to_string(),
        };

        match (declared, value) {
            (Some("object"), Value::Object(map)) => Value::Object(self.object(root, definition, map, path)),
            (Some("string"), Value::String(s)) => self.string(definition, s.clone(), path),
            (Some("string"), Value::Number(_) | Value::Bool(_)) => self.string(definition, value.to_string(), path),
            (Some("integer"), _) => match coerce_integer(value) {
                Some(n) => Value::Number(n.into()),
                None => {
                    self.error(path, mismatch("integer"));
                    value.clone()
                }
            },
            (Some("number"), _) => match coerce_number(value) {
                Some(n) => Value::Number(n),
                None => {
                    self.error(path, mismatch("number"));
                    value.clone()
                }
            },
            (Some("boolean"), _) => match coerce_boolean(value) {
                Some(b) => Value::Bool(b),
                None => {
                    self.error(path, mismatch("boolean"));
                    value.clone()
                }
            },
            (Some("array"), Value::Array(items)) => self.array(root, definition, items.iter().cloned(), path),
            (Some("array"), Value::String(s)) => {
                let parts = s.split(',').map(|part| Value::String(part.trim().to_string()));
                self.array(root, definition, parts, path)
            }
            (Some(expected @ ("object" | "string" | "array")), _) => {
                self.error(path, mismatch(expected));
                value.clone()
            }
            _ => value.clone(),
        }
    }

    fn string(&mut self, definition: &'a Value, s: String, path: &str) -> Value {
        let Some(pattern) = definition.get("pattern").and_then(Value::as_str) else {
            return Value::String(s);
        };

        let matched = self
            .patterns
            .entry(pattern)
            .or_insert_with(|| Regex::new(pattern).ok())
            .as_ref()
            .map(|regex| regex.is_match(&s));

        match matched {
            Some(true) => (),
            Some(false) => self.error(
                path,
                FieldErrorKind::PatternMismatch {
                    value: s.clone(),
                    pattern: pattern.to_string(),
                },
            ),
            None => self.error(
                path,
                FieldErrorKind::InvalidPattern {
                    pattern: pattern.to_string(),
                },
            ),
        }

        Value::String(s)
    }

    fn array(&mut self, root: &'a Value, definition: &'a Value, items: impl Iterator<Item = Value>, path: &str) -> Value {
        let item_definition = definition.get("items");

        items
            .enumerate()
            .map(|(index, item)| match item_definition {
                Some(item_definition) => self.value(root, item_definition, &item, &format!("{path}[{index}]")),
                None => item,
            })
            .collect()
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            #[allow(clippy::cast_possible_truncation)]
            n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    }
}

fn coerce_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Checks `payload` against `schema`, returning the coerced payload or every
/// field that failed. `schemas` must hold each document `schema` references.
///
/// # Errors
/// Returns the full list of field errors if any field is missing or malformed.
pub fn validate(schema: &Value, payload: &Map<String, Value>, schemas: &SchemaSet) -> Result<Map<String, Value>, Vec<FieldError>> {
    let mut validator = Validator {
        schemas,
        patterns: HashMap::new(),
        errors: Vec::new(),
    };

    let (root, definition) = match validator.resolve(schema, schema) {
        Ok(resolved) => resolved,
        Err(reference) => {
            return Err(vec![FieldError {
                path: String::new(),
                kind: FieldErrorKind::UnresolvedReference { reference },
            }]);
        }
    };

    let coerced = validator.object(root, definition, payload, "");

    if validator.errors.is_empty() {
        Ok(coerced)
    } else {
        Err(validator.errors)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn schema() -> Value {
        json!({
            "required": ["project_core", "schema_type"],
            "properties": {
                "schema_type": {"type": "string", "pattern": "^project$"},
                "project_core": {"$ref": "core/project/project_core.json"},
                "cell_count": {"type": "integer"},
                "keywords": {"type": "array", "items": {"type": "string"}},
                "contributors": {"type": "array", "items": {"$ref": "#/definitions/contact"}}
            },
            "definitions": {
                "contact": {
                    "type": "object",
                    "required": ["email"],
                    "properties": {"email": {"type": "string", "pattern": "@"}}
                }
            }
        })
    }

    #[fixture]
    fn schemas() -> SchemaSet {
        SchemaSet::from([(
            "core/project/project_core.json".to_string(),
            json!({
                "type": "object",
                "required": ["project_shortname"],
                "properties": {"project_shortname": {"type": "string"}}
            }),
        )])
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[rstest]
    fn coerces_values(schema: Value, schemas: SchemaSet) {
        let payload = payload(json!({
            "schema_type": "project",
            "project_core": {"project_shortname": "mouse-brain"},
            "cell_count": "1500",
            "keywords": "brain, neurons",
            "extra": true
        }));

        let coerced = validate(&schema, &payload, &schemas).unwrap();

        assert_eq!(coerced["cell_count"], json!(1500));
        assert_eq!(coerced["keywords"], json!(["brain", "neurons"]));
        assert_eq!(coerced["extra"], json!(true));
    }

    #[rstest]
    fn reports_every_failure(schema: Value, schemas: SchemaSet) {
        let payload = payload(json!({
            "schema_type": "analysis",
            "project_core": {},
            "cell_count": "many",
            "contributors": [{"email": "nobody"}, {}]
        }));

        let errors = validate(&schema, &payload, &schemas).unwrap_err();
        let kind_at = |path: &str| {
            errors
                .iter()
                .find(|e| e.path == path)
                .map(|e| e.kind.clone())
                .unwrap()
        };

        assert_eq!(errors.len(), 5);
        assert_eq!(
            kind_at("schema_type"),
            FieldErrorKind::PatternMismatch {
                value: "analysis".to_string(),
                pattern: "^project$".to_string()
            }
        );
        assert_eq!(kind_at("project_core.project_shortname"), FieldErrorKind::MissingRequired);
        assert_eq!(
            kind_at("cell_count"),
            FieldErrorKind::TypeMismatch {
                expected: "integer".to_string(),
                found: "string".to_string()
            }
        );
        assert!(matches!(
            kind_at("contributors[0].email"),
            FieldErrorKind::PatternMismatch { .. }
        ));
        assert_eq!(kind_at("contributors[1].email"), FieldErrorKind::MissingRequired);
    }

    #[test]
    fn patterns_compile_once() {
        let schemas = SchemaSet::new();
        let definition = json!({"type": "string", "pattern": "^[a-z]+$"});
        let mut validator = Validator {
            schemas: &schemas,
            patterns: HashMap::new(),
            errors: Vec::new(),
        };

        for word in ["brain", "Neurons", "cortex"] {
            validator.string(&definition, word.to_string(), "keywords");
        }

        assert_eq!(validator.patterns.len(), 1);
        assert_eq!(validator.errors.len(), 1);
        assert_eq!(validator.errors[0].path, "keywords");
    }

    #[rstest]
    fn missing_required_field(schema: Value, schemas: SchemaSet) {
        let payload = payload(json!({"schema_type": "project"}));

        let errors = validate(&schema, &payload, &schemas).unwrap_err();

        assert_eq!(
            errors,
            vec![FieldError {
                path: "project_core".to_string(),
                kind: FieldErrorKind::MissingRequired
            }]
        );
    }

    #[rstest]
    fn unresolved_reference(schema: Value) {
        let payload = payload(json!({"schema_type": "project", "project_core": {}}));

        let errors = validate(&schema, &payload, &SchemaSet::new()).unwrap_err();

        assert_eq!(
            errors[0].kind,
            FieldErrorKind::UnresolvedReference {
                reference: "core/project/project_core.json".to_string()
            }
        );
    }

    #[rstest]
    fn lists_external_refs(schema: Value) {
        assert_eq!(external_refs(&schema), vec!["core/project/project_core.json".to_string()]);
    }
}
