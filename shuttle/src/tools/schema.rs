//! MCP-style JSON schema parsing into the typed parameter tree.
//!
//! Providers ship tool schemas as JSON Schema fragments; this module turns
//! them into [`ParamType`] values with a hard recursion bound, and validates
//! call arguments against a descriptor before execution.

use serde_json::Value;

use crate::error::RuntimeError;
use crate::tools::{AdditionalProperties, ParamType, ToolDescriptor, ToolError, ToolParam};

/// Recursion bound for nested schemas; deeper trees are treated as circular.
pub const MAX_SCHEMA_DEPTH: usize = 30;

/// Parses one schema fragment into a [`ParamType`].
///
/// Rules: `anyOf [T, null]` collapses to nullable `T`; `enum` without a
/// `type` is a string enum; otherwise `type` is required; arrays require
/// `items`; objects parse `properties`, `required`, and
/// `additionalProperties` (boolean or schema). Unknown types fail.
pub fn parse_param_type(schema: &Value) -> Result<ParamType, RuntimeError> {
    parse_at_depth(schema, 0)
}

fn parse_at_depth(schema: &Value, depth: usize) -> Result<ParamType, RuntimeError> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(RuntimeError::SchemaGenerationFailed(format!(
            "circular reference: schema nesting exceeds {}",
            MAX_SCHEMA_DEPTH
        )));
    }

    if let Some(branches) = schema.get("anyOf").and_then(|v| v.as_array()) {
        let mut parsed = Vec::with_capacity(branches.len());
        for branch in branches {
            parsed.push(parse_at_depth(branch, depth + 1)?);
        }
        let non_null: Vec<ParamType> = parsed
            .iter()
            .filter(|t| !matches!(t, ParamType::Null))
            .cloned()
            .collect();
        // [T, null] collapses to nullable T; several real branches stay AnyOf.
        return Ok(match non_null.len() {
            0 => ParamType::Null,
            1 => non_null.into_iter().next().unwrap(),
            _ => ParamType::AnyOf { types: parsed },
        });
    }

    if let Some(values) = schema.get("enum").and_then(|v| v.as_array()) {
        let values: Vec<String> = values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        return Ok(ParamType::Enum { values });
    }

    let ty = schema
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RuntimeError::SchemaGenerationFailed("missing type".into()))?;

    match ty {
        "string" => Ok(ParamType::String),
        "integer" => Ok(ParamType::Integer),
        "number" => Ok(ParamType::Float),
        "boolean" => Ok(ParamType::Boolean),
        "null" => Ok(ParamType::Null),
        "array" => {
            let items = schema.get("items").ok_or_else(|| {
                RuntimeError::SchemaGenerationFailed("array requires items".into())
            })?;
            Ok(ParamType::List {
                item: Box::new(parse_at_depth(items, depth + 1)?),
            })
        }
        "object" => parse_object(schema, depth),
        other => Err(RuntimeError::SchemaGenerationFailed(format!(
            "Unsupported parameter type: {}",
            other
        ))),
    }
}

fn parse_object(schema: &Value, depth: usize) -> Result<ParamType, RuntimeError> {
    let mut properties = Vec::new();
    if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
        for (name, prop_schema) in props {
            let param_type = parse_at_depth(prop_schema, depth + 1)?;
            let mut param = ToolParam::new(name.clone(), param_type);
            if let Some(desc) = prop_schema.get("description").and_then(|v| v.as_str()) {
                param = param.with_description(desc);
            }
            properties.push(param);
        }
    }
    let required = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let additional_properties = match schema.get("additionalProperties") {
        None => None,
        Some(Value::Bool(b)) => Some(AdditionalProperties::Allowed(*b)),
        Some(other) => Some(AdditionalProperties::Schema(Box::new(parse_at_depth(
            other,
            depth + 1,
        )?))),
    };
    Ok(ParamType::Object {
        properties,
        required,
        additional_properties,
    })
}

/// Builds a [`ToolDescriptor`] from an MCP `inputSchema` object, splitting
/// properties into required and optional.
pub fn descriptor_from_schema(
    name: impl Into<String>,
    description: impl Into<String>,
    input_schema: &Value,
) -> Result<ToolDescriptor, RuntimeError> {
    let parsed = parse_param_type(input_schema)?;
    let (properties, required) = match parsed {
        ParamType::Object {
            properties,
            required,
            ..
        } => (properties, required),
        _ => {
            return Err(RuntimeError::SchemaGenerationFailed(
                "tool input schema must be an object".into(),
            ))
        }
    };
    let mut descriptor = ToolDescriptor::new(name, description);
    for param in properties {
        if required.iter().any(|r| r == &param.name) {
            descriptor.required_params.push(param);
        } else {
            descriptor.optional_params.push(param);
        }
    }
    Ok(descriptor)
}

/// Generates provider-specific tool schemas from descriptors; one
/// implementation per provider dialect.
pub trait ToolDescriptorSchemaGenerator: Send + Sync {
    fn generate(&self, descriptor: &ToolDescriptor) -> Result<Value, RuntimeError>;
}

/// Plain JSON-schema generator, the inverse of [`parse_param_type`].
#[derive(Default)]
pub struct JsonSchemaGenerator;

impl ToolDescriptorSchemaGenerator for JsonSchemaGenerator {
    fn generate(&self, descriptor: &ToolDescriptor) -> Result<Value, RuntimeError> {
        let mut properties = serde_json::Map::new();
        for param in descriptor
            .required_params
            .iter()
            .chain(&descriptor.optional_params)
        {
            let mut schema = schema_of(&param.param_type, 0)?;
            if let (Some(desc), Some(obj)) = (&param.description, schema.as_object_mut()) {
                obj.insert("description".into(), Value::String(desc.clone()));
            }
            properties.insert(param.name.clone(), schema);
        }
        let required: Vec<Value> = descriptor
            .required_params
            .iter()
            .map(|p| Value::String(p.name.clone()))
            .collect();
        Ok(serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }
}

fn schema_of(param_type: &ParamType, depth: usize) -> Result<Value, RuntimeError> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(RuntimeError::SchemaGenerationFailed(format!(
            "maximum recursion exceeded: nesting beyond {}",
            MAX_SCHEMA_DEPTH
        )));
    }
    Ok(match param_type {
        ParamType::String => serde_json::json!({"type": "string"}),
        ParamType::Integer => serde_json::json!({"type": "integer"}),
        ParamType::Float => serde_json::json!({"type": "number"}),
        ParamType::Boolean => serde_json::json!({"type": "boolean"}),
        ParamType::Null => serde_json::json!({"type": "null"}),
        ParamType::Enum { values } => serde_json::json!({"type": "string", "enum": values}),
        ParamType::List { item } => {
            serde_json::json!({"type": "array", "items": schema_of(item, depth + 1)?})
        }
        ParamType::Object {
            properties,
            required,
            additional_properties,
        } => {
            let mut props = serde_json::Map::new();
            for param in properties {
                props.insert(param.name.clone(), schema_of(&param.param_type, depth + 1)?);
            }
            let mut schema = serde_json::json!({
                "type": "object",
                "properties": props,
                "required": required,
            });
            match additional_properties {
                None => {}
                Some(AdditionalProperties::Allowed(allowed)) => {
                    schema["additionalProperties"] = Value::Bool(*allowed);
                }
                Some(AdditionalProperties::Schema(inner)) => {
                    schema["additionalProperties"] = schema_of(inner, depth + 1)?;
                }
            }
            schema
        }
        ParamType::AnyOf { types } => {
            let branches: Vec<Value> = types
                .iter()
                .map(|t| schema_of(t, depth + 1))
                .collect::<Result<_, _>>()?;
            serde_json::json!({"anyOf": branches})
        }
    })
}

/// Validates call arguments against a descriptor.
///
/// Checks that args form an object, every required parameter is present,
/// and each provided value matches its declared type.
pub fn validate_args(descriptor: &ToolDescriptor, args: &Value) -> Result<(), ToolError> {
    let obj = args.as_object().ok_or_else(|| ToolError::ValidationFailed {
        name: descriptor.name.clone(),
        reason: "arguments must be a JSON object".into(),
    })?;
    for param in &descriptor.required_params {
        let value = obj.get(&param.name).ok_or_else(|| ToolError::ValidationFailed {
            name: descriptor.name.clone(),
            reason: format!("missing required parameter: {}", param.name),
        })?;
        check_value(&descriptor.name, &param.name, &param.param_type, value)?;
    }
    for param in &descriptor.optional_params {
        if let Some(value) = obj.get(&param.name) {
            check_value(&descriptor.name, &param.name, &param.param_type, value)?;
        }
    }
    Ok(())
}

fn check_value(
    tool: &str,
    param: &str,
    expected: &ParamType,
    value: &Value,
) -> Result<(), ToolError> {
    let mismatch = |expected: &str| ToolError::ValidationFailed {
        name: tool.to_string(),
        reason: format!("parameter {} expects {}, got {}", param, expected, value),
    };
    match expected {
        ParamType::String => value.as_str().map(|_| ()).ok_or_else(|| mismatch("string")),
        ParamType::Integer => value.as_i64().map(|_| ()).ok_or_else(|| mismatch("integer")),
        ParamType::Float => {
            if value.is_number() {
                Ok(())
            } else {
                Err(mismatch("number"))
            }
        }
        ParamType::Boolean => value.as_bool().map(|_| ()).ok_or_else(|| mismatch("boolean")),
        ParamType::Null => {
            if value.is_null() {
                Ok(())
            } else {
                Err(mismatch("null"))
            }
        }
        ParamType::Enum { values } => {
            let s = value.as_str().ok_or_else(|| mismatch("enum string"))?;
            if values.iter().any(|v| v == s) {
                Ok(())
            } else {
                Err(mismatch(&format!("one of {:?}", values)))
            }
        }
        ParamType::List { item } => {
            let arr = value.as_array().ok_or_else(|| mismatch("array"))?;
            for entry in arr {
                check_value(tool, param, item, entry)?;
            }
            Ok(())
        }
        ParamType::Object {
            properties,
            required,
            ..
        } => {
            let obj = value.as_object().ok_or_else(|| mismatch("object"))?;
            for name in required {
                if !obj.contains_key(name) {
                    return Err(ToolError::ValidationFailed {
                        name: tool.to_string(),
                        reason: format!("missing required field {}.{}", param, name),
                    });
                }
            }
            for prop in properties {
                if let Some(v) = obj.get(&prop.name) {
                    check_value(tool, &prop.name, &prop.param_type, v)?;
                }
            }
            Ok(())
        }
        ParamType::AnyOf { types } => {
            if types
                .iter()
                .any(|t| check_value(tool, param, t, value).is_ok())
            {
                Ok(())
            } else {
                Err(mismatch("any of the declared types"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Primitive types parse; unknown type fails with the
    /// "Unsupported parameter type" message.
    #[test]
    fn primitives_and_unknown_type() {
        assert_eq!(
            parse_param_type(&json!({"type": "string"})).unwrap(),
            ParamType::String
        );
        assert_eq!(
            parse_param_type(&json!({"type": "number"})).unwrap(),
            ParamType::Float
        );
        let err = parse_param_type(&json!({"type": "tuple"})).unwrap_err();
        assert!(err.to_string().contains("Unsupported parameter type"));
        let err = parse_param_type(&json!({})).unwrap_err();
        assert!(err.to_string().contains("missing type"));
    }

    /// **Scenario**: anyOf [T, null] collapses to T; multi-branch anyOf is preserved.
    #[test]
    fn any_of_collapse() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "null"}]});
        assert_eq!(parse_param_type(&schema).unwrap(), ParamType::String);

        let schema = json!({"anyOf": [{"type": "string"}, {"type": "integer"}]});
        match parse_param_type(&schema).unwrap() {
            ParamType::AnyOf { types } => assert_eq!(types.len(), 2),
            other => panic!("expected AnyOf, got {:?}", other),
        }
    }

    /// **Scenario**: enum without type is treated as a string enum.
    #[test]
    fn enum_without_type() {
        let schema = json!({"enum": ["fast", "slow"]});
        assert_eq!(
            parse_param_type(&schema).unwrap(),
            ParamType::Enum {
                values: vec!["fast".into(), "slow".into()]
            }
        );
    }

    /// **Scenario**: Arrays require items; objects parse properties, required,
    /// and additionalProperties in both forms.
    #[test]
    fn arrays_and_objects() {
        let err = parse_param_type(&json!({"type": "array"})).unwrap_err();
        assert!(err.to_string().contains("items"));

        let schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "who"},
                "count": {"type": "integer"}
            },
            "required": ["name"],
            "additionalProperties": false
        });
        match parse_param_type(&schema).unwrap() {
            ParamType::Object {
                properties,
                required,
                additional_properties,
            } => {
                assert_eq!(properties.len(), 2);
                assert_eq!(required, vec!["name".to_string()]);
                assert_eq!(
                    additional_properties,
                    Some(AdditionalProperties::Allowed(false))
                );
            }
            other => panic!("expected Object, got {:?}", other),
        }

        let schema = json!({
            "type": "object",
            "additionalProperties": {"type": "string"}
        });
        match parse_param_type(&schema).unwrap() {
            ParamType::Object {
                additional_properties: Some(AdditionalProperties::Schema(inner)),
                ..
            } => assert_eq!(*inner, ParamType::String),
            other => panic!("expected schema additionalProperties, got {:?}", other),
        }
    }

    /// **Scenario**: Nesting beyond the depth bound is rejected as circular.
    #[test]
    fn depth_limit_circular() {
        let mut schema = json!({"type": "string"});
        for _ in 0..(MAX_SCHEMA_DEPTH + 1) {
            schema = json!({"type": "array", "items": schema});
        }
        let err = parse_param_type(&schema).unwrap_err();
        assert!(err.to_string().contains("circular reference"));
    }

    /// **Scenario**: descriptor_from_schema splits required and optional params.
    #[test]
    fn descriptor_split() {
        let schema = json!({
            "type": "object",
            "properties": {
                "expr": {"type": "string"},
                "precision": {"type": "integer"}
            },
            "required": ["expr"]
        });
        let descriptor = descriptor_from_schema("eval", "evaluate", &schema).unwrap();
        assert_eq!(descriptor.required_params.len(), 1);
        assert_eq!(descriptor.required_params[0].name, "expr");
        assert_eq!(descriptor.optional_params.len(), 1);
        assert_eq!(descriptor.optional_params[0].name, "precision");
    }

    /// **Scenario**: Generated schemas parse back to the same descriptor.
    #[test]
    fn generate_parse_roundtrip() {
        let descriptor = ToolDescriptor::new("search", "Searches things")
            .with_required(
                ToolParam::new("query", ParamType::String).with_description("what to find"),
            )
            .with_optional(ToolParam::new(
                "tags",
                ParamType::List {
                    item: Box::new(ParamType::String),
                },
            ));
        let schema = JsonSchemaGenerator.generate(&descriptor).unwrap();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["query"]["description"], "what to find");

        let parsed = descriptor_from_schema("search", "Searches things", &schema).unwrap();
        assert_eq!(parsed, descriptor);
    }

    /// **Scenario**: Generation rejects trees nested beyond the bound.
    #[test]
    fn generation_depth_limit() {
        let mut ty = ParamType::String;
        for _ in 0..(MAX_SCHEMA_DEPTH + 1) {
            ty = ParamType::List { item: Box::new(ty) };
        }
        let descriptor =
            ToolDescriptor::new("deep", "too deep").with_required(ToolParam::new("p", ty));
        let err = JsonSchemaGenerator.generate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("maximum recursion exceeded"));
    }

    /// **Scenario**: validate_args enforces required params and value types.
    #[test]
    fn validate_args_required_and_types() {
        let descriptor = ToolDescriptor::new("eval", "evaluate")
            .with_required(ToolParam::new("expr", ParamType::String))
            .with_optional(ToolParam::new("precision", ParamType::Integer));

        assert!(validate_args(&descriptor, &json!({"expr": "2+2"})).is_ok());
        assert!(validate_args(&descriptor, &json!({"expr": "2+2", "precision": 3})).is_ok());

        let err = validate_args(&descriptor, &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing required"));

        let err = validate_args(&descriptor, &json!({"expr": 42})).unwrap_err();
        assert!(err.to_string().contains("expects string"));

        let err = validate_args(&descriptor, &json!("not an object")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }
}
