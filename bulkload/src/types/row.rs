//! row module provides row normalization against the schema descriptor.
//!
//! Normalization matches every key of a caller-supplied row against the
//! schema, fills defaults, packages out-of-schema keys under
//! [`DYNAMIC_FIELD_NAME`] and optionally validates value types. It is a pure
//! function over its inputs.

use serde_json::{Map, Value};

use crate::types::{DataType, FieldSchema, SchemaRef, DYNAMIC_FIELD_NAME};
use crate::{Error, ErrorKind, Result};

/// A row is a mapping from field name to JSON value.
pub type Row = Map<String, Value>;

/// RowNormalizer turns caller-supplied rows into fixed-shape records:
/// declared fields first, extra keys nested under the `$meta` container.
pub struct RowNormalizer {
    schema: SchemaRef,
    strict_validation: bool,
    skip_invalid_rows: bool,
}

impl RowNormalizer {
    /// Create a normalizer for the given schema and validation policy.
    pub fn new(schema: SchemaRef, strict_validation: bool, skip_invalid_rows: bool) -> Self {
        Self {
            schema,
            strict_validation,
            skip_invalid_rows,
        }
    }

    /// Normalize one row.
    ///
    /// Returns `Ok(Some(row))` for an accepted row, `Ok(None)` when the row
    /// is invalid and the policy is to skip it, and `Err` otherwise.
    pub fn normalize(&self, row: &Row) -> Result<Option<Row>> {
        let mut out = Row::new();

        for field in self.schema.fields() {
            // Server-generated fields are never required and any supplied
            // value is dropped.
            if (field.is_primary_key && field.auto_id) || field.is_function_output {
                continue;
            }

            let value = match row.get(&field.name) {
                None | Some(Value::Null) => {
                    if let Some(default) = &field.default_value {
                        default.clone()
                    } else if field.nullable {
                        Value::Null
                    } else {
                        return self.reject(Error::new(
                            ErrorKind::RowInvalid,
                            format!("field {} is not nullable, a value is required", field.name),
                        ));
                    }
                }
                Some(value) => {
                    if self.strict_validation {
                        if let Err(err) = validate_value(field, value) {
                            return self.reject(err);
                        }
                    }
                    value.clone()
                }
            };

            out.insert(field.name.clone(), value);
        }

        let mut meta = Map::new();
        for (key, value) in row {
            if self.schema.field(key).is_some() {
                continue;
            }

            if !self.schema.enable_dynamic_field() {
                return self.reject(
                    Error::new(
                        ErrorKind::RowInvalid,
                        "row carries a field that is not declared in the schema",
                    )
                    .with_context("field", key),
                );
            }

            // A caller-supplied `$meta` object is merged into the container
            // instead of being nested one level deeper.
            if key == DYNAMIC_FIELD_NAME {
                let Value::Object(entries) = value else {
                    return self.reject(Error::new(
                        ErrorKind::RowInvalid,
                        format!("{DYNAMIC_FIELD_NAME} must hold a JSON object"),
                    ));
                };
                for (k, v) in entries {
                    meta.insert(k.clone(), stringify_int64(v.clone()));
                }
                continue;
            }

            meta.insert(key.clone(), stringify_int64(value.clone()));
        }

        if !meta.is_empty() {
            out.insert(DYNAMIC_FIELD_NAME.to_string(), Value::Object(meta));
        }

        Ok(Some(out))
    }

    fn reject(&self, err: Error) -> Result<Option<Row>> {
        if self.skip_invalid_rows {
            log::debug!("skipping invalid row: {err}");
            Ok(None)
        } else {
            Err(err)
        }
    }
}

/// Convert every 64-bit integer inside a dynamic value into its exact
/// decimal string form, recursively.
fn stringify_int64(value: Value) -> Value {
    match value {
        Value::Number(n) if !n.is_f64() => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_int64).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, stringify_int64(v)))
                .collect(),
        ),
        other => other,
    }
}

const DEFAULT_MAX_LENGTH: usize = 65535;
const DEFAULT_MAX_CAPACITY: usize = 1000;

fn validate_value(field: &FieldSchema, value: &Value) -> Result<()> {
    let type_ok = match field.data_type {
        DataType::Bool => value.is_boolean(),
        DataType::Int8 => int_in_range(value, i8::MIN as i64, i8::MAX as i64),
        DataType::Int16 => int_in_range(value, i16::MIN as i64, i16::MAX as i64),
        DataType::Int32 => int_in_range(value, i32::MIN as i64, i32::MAX as i64),
        DataType::Int64 => value.as_i64().is_some() || value.as_u64().is_some(),
        DataType::Float | DataType::Double => is_finite_number(value),
        DataType::VarChar => {
            let max_length = field.max_length.unwrap_or(DEFAULT_MAX_LENGTH);
            matches!(value.as_str(), Some(s) if s.chars().count() <= max_length)
        }
        DataType::Json => value.is_object(),
        DataType::Array => return validate_array(field, value),
        DataType::FloatVector => {
            let dim = declared_dim(field)?;
            matches!(value.as_array(), Some(items) if items.len() == dim
                && items.iter().all(is_finite_number))
        }
        DataType::BinaryVector => {
            // One byte packs 8 dimensions, rounded up.
            let dim = declared_dim(field)?;
            is_byte_array(value, (dim + 7) / 8)
        }
        DataType::Float16Vector | DataType::BFloat16Vector => {
            let dim = declared_dim(field)?;
            is_byte_array(value, dim * 2)
        }
        DataType::Int8Vector => {
            let dim = declared_dim(field)?;
            matches!(value.as_array(), Some(items) if items.len() == dim
                && items.iter().all(|v| int_in_range(v, i8::MIN as i64, i8::MAX as i64)))
        }
        DataType::SparseFloatVector => {
            matches!(value.as_object(), Some(entries) if !entries.is_empty()
                && entries.iter().all(|(k, v)| k.parse::<u64>().is_ok() && is_finite_number(v)))
        }
    };

    if type_ok {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::RowInvalid,
            format!("value does not match declared type {}", field.data_type),
        )
        .with_context("field", &field.name))
    }
}

fn validate_array(field: &FieldSchema, value: &Value) -> Result<()> {
    let invalid = |message: String| {
        Err(Error::new(ErrorKind::RowInvalid, message).with_context("field", &field.name))
    };

    let Some(items) = value.as_array() else {
        return invalid(format!("value does not match declared type {}", field.data_type));
    };

    let max_capacity = field.max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY);
    if items.len() > max_capacity {
        return invalid(format!(
            "array holds {} elements, max capacity is {max_capacity}",
            items.len()
        ));
    }

    let Some(element_type) = field.element_type else {
        return Err(Error::new(
            ErrorKind::SchemaInvalid,
            "array field must declare an element type",
        )
        .with_context("field", &field.name));
    };

    let elements_ok = match element_type {
        DataType::Bool => items.iter().all(Value::is_boolean),
        DataType::Int8 => items
            .iter()
            .all(|v| int_in_range(v, i8::MIN as i64, i8::MAX as i64)),
        DataType::Int16 => items
            .iter()
            .all(|v| int_in_range(v, i16::MIN as i64, i16::MAX as i64)),
        DataType::Int32 => items
            .iter()
            .all(|v| int_in_range(v, i32::MIN as i64, i32::MAX as i64)),
        DataType::Int64 => items
            .iter()
            .all(|v| v.as_i64().is_some() || v.as_u64().is_some()),
        DataType::Float | DataType::Double => items.iter().all(is_finite_number),
        DataType::VarChar => items.iter().all(Value::is_string),
        _ => {
            return Err(Error::new(
                ErrorKind::SchemaInvalid,
                format!("array element type {element_type} is not a scalar"),
            )
            .with_context("field", &field.name));
        }
    };

    if elements_ok {
        Ok(())
    } else {
        invalid(format!("array element does not match declared type {element_type}"))
    }
}

fn declared_dim(field: &FieldSchema) -> Result<usize> {
    field.dim.ok_or_else(|| {
        Error::new(
            ErrorKind::SchemaInvalid,
            "vector field must declare a dimension",
        )
        .with_context("field", &field.name)
    })
}

fn int_in_range(value: &Value, min: i64, max: i64) -> bool {
    matches!(value.as_i64(), Some(n) if n >= min && n <= max)
}

fn is_finite_number(value: &Value) -> bool {
    matches!(value.as_f64(), Some(n) if n.is_finite())
}

fn is_byte_array(value: &Value, expected_len: usize) -> bool {
    matches!(value.as_array(), Some(items) if items.len() == expected_len
        && items.iter().all(|v| int_in_range(v, 0, u8::MAX as i64)))
}

/// Estimate the serialized JSON footprint of a row in bytes.
///
/// The estimate counts quotes, separators and the decimal form of numbers.
/// It ignores string escaping, so it can under-estimate by the escape
/// overhead; the chunk serializer measures real encoded bytes, the estimate
/// only drives buffer accounting. The estimate is deterministic and
/// monotonic in row content size.
pub fn estimate_row_size(row: &Row) -> usize {
    estimate_entries_size(row)
}

fn estimate_entries_size(entries: &Map<String, Value>) -> usize {
    let mut size = 2;
    for (idx, (key, value)) in entries.iter().enumerate() {
        if idx > 0 {
            size += 1;
        }
        size += key.len() + 2;
        size += 1;
        size += estimate_value_size(value);
    }
    size
}

fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(v) => {
            if *v {
                4
            } else {
                5
            }
        }
        Value::Number(n) => n.to_string().len(),
        Value::String(s) => s.len() + 2,
        Value::Array(items) => {
            let mut size = 2;
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    size += 1;
                }
                size += estimate_value_size(item);
            }
            size
        }
        Value::Object(entries) => estimate_entries_size(entries),
    }
}
