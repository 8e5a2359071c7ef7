//! Element schema validation.
//!
//! Turns the caller-supplied `data.elements` JSON into a typed
//! [`Element`] list, or reports the first rule it breaks:
//!
//! 1. `elements` must be an array (and `data` an object)
//! 2. every element needs a known `type`
//! 3. only one decision mode (boolean, buttons or form) per approval
//! 4. per-type shape rules (`text`, `options`, `name`, `fieldType`)
//! 5. at most one `boolean` and one `buttons` element
//!
//! Validation is pure; nothing here touches the store.

use serde_json::{json, Value};
use thiserror::Error;

use crate::models::element::{DetectedModes, Element, ElementKind, FieldType};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be {expected} when provided (received {received})")]
    MalformedElements {
        field: &'static str,
        expected: &'static str,
        received: &'static str,
    },

    #[error("element at index {index} is missing required property: type")]
    MissingType { index: usize },

    #[error("unknown element type '{found}' at index {index}")]
    UnknownElementType { index: usize, found: String },

    #[error(
        "only one action type (boolean, buttons, or form fields) can be used per approval; \
         element at index {} adds a conflicting mode (detected: {})",
        .index,
        .detected.names().join(", ")
    )]
    ConflictingDecisionModes { index: usize, detected: DetectedModes },

    #[error("{element} element at index {index}: '{field}' {reason}")]
    InvalidElementShape {
        index: usize,
        element: ElementKind,
        field: &'static str,
        reason: String,
    },

    #[error("only one {element} element is allowed per approval (second one at index {index})")]
    DuplicateElement { index: usize, element: ElementKind },
}

impl ValidationError {
    /// Machine-readable kind, rendered as the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MalformedElements { .. } => "malformed_elements",
            ValidationError::MissingType { .. } => "missing_type",
            ValidationError::UnknownElementType { .. } => "unknown_element_type",
            ValidationError::ConflictingDecisionModes { .. } => "conflicting_decision_modes",
            ValidationError::InvalidElementShape { .. } => "invalid_element_shape",
            ValidationError::DuplicateElement { .. } => "duplicate_element",
        }
    }

    /// Extra fields merged into the error body next to `error` and `message`.
    pub fn context(&self) -> Value {
        let valid_types: Vec<&str> = ElementKind::ALL.iter().map(|k| k.as_str()).collect();
        match self {
            ValidationError::MalformedElements { received, .. } => json!({ "received": received }),
            ValidationError::MissingType { index } => {
                json!({ "index": index, "validTypes": valid_types })
            }
            ValidationError::UnknownElementType { index, found } => {
                json!({ "index": index, "received": found, "validTypes": valid_types })
            }
            ValidationError::ConflictingDecisionModes { index, detected } => json!({
                "index": index,
                "detected": detected,
                "suggestion": "Remove conflicting action elements and use only one type",
            }),
            ValidationError::InvalidElementShape {
                index,
                element,
                field,
                ..
            } => {
                let mut ctx = json!({ "index": index, "element": element, "field": field });
                if *field == "fieldType" {
                    let valid: Vec<&str> = FieldType::ALL.iter().map(|t| t.as_str()).collect();
                    ctx["validFieldTypes"] = json!(valid);
                }
                ctx
            }
            ValidationError::DuplicateElement { index, element } => json!({
                "index": index,
                "element": element,
                "suggestion": match element {
                    ElementKind::Buttons => "Combine all button options into a single buttons element",
                    _ => "Remove duplicate elements",
                },
            }),
        }
    }
}

/// Validate the optional `data` object of a registration.
///
/// `None`, `null`, or an object without `elements` all yield an empty list.
pub fn validate_data(data: Option<&Value>) -> Result<Vec<Element>, ValidationError> {
    let data = match data {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(d) => d,
    };
    let obj = data.as_object().ok_or(ValidationError::MalformedElements {
        field: "data",
        expected: "an object",
        received: json_type(data),
    })?;

    match obj.get("elements") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => validate_elements(items),
        Some(other) => Err(ValidationError::MalformedElements {
            field: "data.elements",
            expected: "an array",
            received: json_type(other),
        }),
    }
}

/// Validate an element array in order, stopping at the first violation.
pub fn validate_elements(items: &[Value]) -> Result<Vec<Element>, ValidationError> {
    let mut detected = DetectedModes::default();
    let mut seen_boolean = false;
    let mut seen_buttons = false;
    let mut elements = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let kind = element_kind(index, item)?;

        if let Some(mode) = kind.decision_mode() {
            detected.mark(mode);
            if detected.count() > 1 {
                return Err(ValidationError::ConflictingDecisionModes { index, detected });
            }
        }

        let element = parse_shape(index, kind, item)?;

        let seen = match kind {
            ElementKind::Boolean => Some(&mut seen_boolean),
            ElementKind::Buttons => Some(&mut seen_buttons),
            _ => None,
        };
        if let Some(seen) = seen {
            if *seen {
                return Err(ValidationError::DuplicateElement { index, element: kind });
            }
            *seen = true;
        }

        elements.push(element);
    }

    Ok(elements)
}

fn element_kind(index: usize, item: &Value) -> Result<ElementKind, ValidationError> {
    match item.get("type") {
        None | Some(Value::Null) => Err(ValidationError::MissingType { index }),
        Some(Value::String(s)) if s.is_empty() => Err(ValidationError::MissingType { index }),
        Some(Value::String(s)) => {
            ElementKind::parse(s).ok_or_else(|| ValidationError::UnknownElementType {
                index,
                found: s.clone(),
            })
        }
        Some(other) => Err(ValidationError::UnknownElementType {
            index,
            found: other.to_string(),
        }),
    }
}

fn parse_shape(index: usize, kind: ElementKind, item: &Value) -> Result<Element, ValidationError> {
    let shape_err = |field: &'static str, reason: &str| ValidationError::InvalidElementShape {
        index,
        element: kind,
        field,
        reason: reason.to_string(),
    };

    match kind {
        ElementKind::Title | ElementKind::Message => {
            let text = non_empty_str(item, "text")
                .ok_or_else(|| shape_err("text", "is required and must be a non-empty string"))?;
            Ok(if kind == ElementKind::Title {
                Element::Title { text }
            } else {
                Element::Message { text }
            })
        }
        ElementKind::Boolean => Ok(Element::Boolean),
        ElementKind::Buttons => {
            let options = match item.get("options") {
                Some(Value::Array(opts)) if !opts.is_empty() => opts,
                _ => return Err(shape_err("options", "must be a non-empty array")),
            };
            let options = options
                .iter()
                .map(|o| o.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| shape_err("options", "must contain only strings"))?;
            Ok(Element::Buttons { options })
        }
        ElementKind::Form => {
            let name = non_empty_str(item, "name")
                .ok_or_else(|| shape_err("name", "is required for form fields"))?;
            let field_type = match item.get("fieldType").and_then(Value::as_str) {
                None => {
                    return Err(shape_err(
                        "fieldType",
                        &format!("is required for form field '{}'", name),
                    ))
                }
                Some(raw) => FieldType::parse(raw).ok_or_else(|| {
                    shape_err(
                        "fieldType",
                        &format!("'{}' is not a valid field type for form field '{}'", raw, name),
                    )
                })?,
            };
            let options = match item.get("options") {
                Some(Value::Array(opts)) => Some(opts.clone()),
                _ if field_type.requires_options() => {
                    return Err(shape_err(
                        "options",
                        &format!(
                            "must be an array for {} field '{}'",
                            field_type.as_str(),
                            name
                        ),
                    ))
                }
                _ => None,
            };
            Ok(Element::Form {
                name,
                field_type,
                options,
            })
        }
    }
}

fn non_empty_str(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(elements: Value) -> Result<Vec<Element>, ValidationError> {
        validate_data(Some(&json!({ "elements": elements })))
    }

    #[test]
    fn test_absent_data_and_elements_are_empty() {
        assert_eq!(validate_data(None).unwrap(), vec![]);
        assert_eq!(validate_data(Some(&Value::Null)).unwrap(), vec![]);
        assert_eq!(validate_data(Some(&json!({"foo": 1}))).unwrap(), vec![]);
        assert_eq!(validate(json!([])).unwrap(), vec![]);
    }

    #[test]
    fn test_elements_must_be_array() {
        let err = validate(json!({"type": "title"})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MalformedElements {
                field: "data.elements",
                expected: "an array",
                received: "object",
            }
        );
        assert_eq!(err.code(), "malformed_elements");
    }

    #[test]
    fn test_data_must_be_object() {
        let err = validate_data(Some(&json!("hello"))).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedElements { field: "data", .. }));
    }

    #[test]
    fn test_missing_and_unknown_type() {
        let err = validate(json!([{"type": "title", "text": "ok"}, {"text": "no type"}])).unwrap_err();
        assert_eq!(err, ValidationError::MissingType { index: 1 });

        let err = validate(json!([{"type": "slider"}])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownElementType {
                index: 0,
                found: "slider".into()
            }
        );
        assert_eq!(err.context()["validTypes"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_boolean_and_buttons_conflict_in_either_order() {
        let a = validate(json!([
            {"type": "boolean"},
            {"type": "buttons", "options": ["A"]}
        ]))
        .unwrap_err();
        let b = validate(json!([
            {"type": "buttons", "options": ["A"]},
            {"type": "boolean"}
        ]))
        .unwrap_err();

        for err in [a, b] {
            match err {
                ValidationError::ConflictingDecisionModes { index, detected } => {
                    assert_eq!(index, 1);
                    assert!(detected.boolean && detected.buttons && !detected.form);
                }
                other => panic!("expected conflict, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_form_conflicts_with_boolean() {
        let err = validate(json!([
            {"type": "form", "name": "reason", "fieldType": "text"},
            {"type": "title", "text": "T"},
            {"type": "boolean"}
        ]))
        .unwrap_err();
        assert!(matches!(err, ValidationError::ConflictingDecisionModes { index: 2, .. }));
        assert_eq!(err.context()["detected"], json!({"boolean": true, "buttons": false, "form": true}));
        assert!(err.to_string().ends_with("(detected: boolean, form)"), "{}", err);
    }

    #[test]
    fn test_conflict_detected_before_shape() {
        // The buttons element is malformed, but the mode conflict is reported first.
        let err = validate(json!([{"type": "boolean"}, {"type": "buttons"}])).unwrap_err();
        assert!(matches!(err, ValidationError::ConflictingDecisionModes { .. }));
    }

    #[test]
    fn test_title_requires_text() {
        let err = validate(json!([{"type": "title", "text": ""}])).unwrap_err();
        match err {
            ValidationError::InvalidElementShape { index, element, field, .. } => {
                assert_eq!(index, 0);
                assert_eq!(element, ElementKind::Title);
                assert_eq!(field, "text");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_buttons_require_non_empty_string_options() {
        let err = validate(json!([{"type": "buttons", "options": []}])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElementShape { field: "options", .. }));

        let err = validate(json!([{"type": "buttons", "options": ["A", 2]}])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElementShape { field: "options", .. }));
    }

    #[test]
    fn test_form_field_rules() {
        let err = validate(json!([{"type": "form", "fieldType": "text"}])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElementShape { field: "name", .. }));

        let err = validate(json!([{"type": "form", "name": "qty"}])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElementShape { field: "fieldType", .. }));
        assert!(err.context()["validFieldTypes"].is_array());

        let err = validate(json!([{"type": "form", "name": "qty", "fieldType": "date"}])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElementShape { field: "fieldType", .. }));

        let err = validate(json!([{"type": "form", "name": "env", "fieldType": "multiselect"}])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElementShape { field: "options", .. }));
        assert!(err.to_string().contains("env"));
    }

    #[test]
    fn test_form_fields_may_repeat() {
        let elements = validate(json!([
            {"type": "title", "text": "Provision"},
            {"type": "form", "name": "qty", "fieldType": "number"},
            {"type": "form", "name": "env", "fieldType": "select", "options": ["dev", "prod"]},
            {"type": "form", "name": "notes", "fieldType": "text", "placeholder": "optional"}
        ]))
        .unwrap();
        assert_eq!(elements.len(), 4);
    }

    #[test]
    fn test_duplicate_boolean_and_buttons() {
        let err = validate(json!([{"type": "boolean"}, {"type": "message", "text": "m"}, {"type": "boolean"}]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateElement {
                index: 2,
                element: ElementKind::Boolean
            }
        );

        let err = validate(json!([
            {"type": "buttons", "options": ["A"]},
            {"type": "buttons", "options": ["B"]}
        ]))
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateElement { index: 1, element: ElementKind::Buttons }));
    }

    #[test]
    fn test_valid_buttons_round_trip_to_typed() {
        let elements = validate(json!([
            {"type": "title", "text": "T"},
            {"type": "buttons", "options": ["A", "B"]}
        ]))
        .unwrap();
        assert_eq!(
            elements,
            vec![
                Element::Title { text: "T".into() },
                Element::Buttons {
                    options: vec!["A".into(), "B".into()]
                }
            ]
        );
    }
}
