//! schema module provides the in-memory schema descriptor of the target
//! collection. The descriptor is consumed from an external describe call and
//! stays immutable for the lifetime of a writer instance.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::{Error, ErrorKind, Result};

/// Reserved container field that carries all keys of a row which are not
/// declared in the schema, when the schema enables dynamic fields.
pub const DYNAMIC_FIELD_NAME: &str = "$meta";

/// Data type of a schema field.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Variable length string, bounded by `max_length`.
    VarChar,
    /// Arbitrary JSON object.
    Json,
    /// List of scalars, bounded by `max_capacity` and typed by
    /// `element_type`.
    Array,
    /// Dense float vector of `dim` elements.
    FloatVector,
    /// Binary vector packed as `ceil(dim / 8)` bytes.
    BinaryVector,
    /// Half precision float vector packed as `2 * dim` bytes.
    Float16Vector,
    /// Brain float vector packed as `2 * dim` bytes.
    BFloat16Vector,
    /// 8-bit integer vector of `dim` elements.
    Int8Vector,
    /// Sparse float vector as a map from index to value.
    SparseFloatVector,
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bool" => Ok(Self::Bool),
            "int8" => Ok(Self::Int8),
            "int16" => Ok(Self::Int16),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "varchar" => Ok(Self::VarChar),
            "json" => Ok(Self::Json),
            "array" => Ok(Self::Array),
            "float_vector" => Ok(Self::FloatVector),
            "binary_vector" => Ok(Self::BinaryVector),
            "float16_vector" => Ok(Self::Float16Vector),
            "bfloat16_vector" => Ok(Self::BFloat16Vector),
            "int8_vector" => Ok(Self::Int8Vector),
            "sparse_float_vector" => Ok(Self::SparseFloatVector),
            _ => Err(Error::new(
                ErrorKind::SchemaInvalid,
                format!("Unsupported data type: {}", s),
            )),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Bool => f.write_str("bool"),
            DataType::Int8 => f.write_str("int8"),
            DataType::Int16 => f.write_str("int16"),
            DataType::Int32 => f.write_str("int32"),
            DataType::Int64 => f.write_str("int64"),
            DataType::Float => f.write_str("float"),
            DataType::Double => f.write_str("double"),
            DataType::VarChar => f.write_str("varchar"),
            DataType::Json => f.write_str("json"),
            DataType::Array => f.write_str("array"),
            DataType::FloatVector => f.write_str("float_vector"),
            DataType::BinaryVector => f.write_str("binary_vector"),
            DataType::Float16Vector => f.write_str("float16_vector"),
            DataType::BFloat16Vector => f.write_str("bfloat16_vector"),
            DataType::Int8Vector => f.write_str("int8_vector"),
            DataType::SparseFloatVector => f.write_str("sparse_float_vector"),
        }
    }
}

/// One typed field of the schema descriptor.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Field name, unique within the schema.
    pub name: String,
    /// Data type of the field.
    pub data_type: DataType,
    /// Whether this field is the primary key.
    pub is_primary_key: bool,
    /// Whether the primary key is generated by the server. Auto-id fields
    /// must not be supplied by the caller.
    pub auto_id: bool,
    /// Whether this field is used as the partition key.
    pub is_partition_key: bool,
    /// Whether this field is computed on the server. Function output fields
    /// must not be supplied by the caller.
    pub is_function_output: bool,
    /// Whether null values are accepted.
    pub nullable: bool,
    /// Value used when the caller leaves the field absent or null.
    pub default_value: Option<Value>,
    /// Declared dimension for vector types.
    pub dim: Option<usize>,
    /// Maximum character length for varchar fields.
    pub max_length: Option<usize>,
    /// Maximum element count for array fields.
    pub max_capacity: Option<usize>,
    /// Element type for array fields.
    pub element_type: Option<DataType>,
}

impl FieldSchema {
    /// Create a field with the given name and data type. All flags default
    /// to off.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_primary_key: false,
            auto_id: false,
            is_partition_key: false,
            is_function_output: false,
            nullable: false,
            default_value: None,
            dim: None,
            max_length: None,
            max_capacity: None,
            element_type: None,
        }
    }

    /// Mark this field as the primary key, optionally server generated.
    pub fn with_primary_key(mut self, auto_id: bool) -> Self {
        self.is_primary_key = true;
        self.auto_id = auto_id;
        self
    }

    /// Mark this field as the partition key.
    pub fn with_partition_key(mut self) -> Self {
        self.is_partition_key = true;
        self
    }

    /// Mark this field as a server-side function output.
    pub fn with_function_output(mut self) -> Self {
        self.is_function_output = true;
        self
    }

    /// Allow null values for this field.
    pub fn with_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the value used when the field is absent or null.
    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set the vector dimension.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    /// Set the maximum varchar length.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set the maximum array capacity.
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = Some(max_capacity);
        self
    }

    /// Set the array element type.
    pub fn with_element_type(mut self, element_type: DataType) -> Self {
        self.element_type = Some(element_type);
        self
    }
}

/// Reference to [`Schema`].
pub type SchemaRef = Arc<Schema>;

/// Schema descriptor: an ordered set of typed field definitions, plus the
/// dynamic-field switch.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSchema>,
    enable_dynamic_field: bool,
}

impl Schema {
    /// Create a schema from an ordered field list.
    ///
    /// The field list must be non-empty, carry exactly one primary key and
    /// must not contain duplicated field names.
    pub fn new(fields: Vec<FieldSchema>, enable_dynamic_field: bool) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::new(
                ErrorKind::SchemaInvalid,
                "schema fields list is empty",
            ));
        }

        let primary_keys = fields.iter().filter(|f| f.is_primary_key).count();
        if primary_keys != 1 {
            return Err(Error::new(
                ErrorKind::SchemaInvalid,
                format!("schema must have exactly one primary key, got {primary_keys}"),
            ));
        }

        for (idx, field) in fields.iter().enumerate() {
            if field.name == DYNAMIC_FIELD_NAME {
                return Err(Error::new(
                    ErrorKind::SchemaInvalid,
                    format!("field name {DYNAMIC_FIELD_NAME} is reserved"),
                ));
            }
            if fields[..idx].iter().any(|f| f.name == field.name) {
                return Err(Error::new(
                    ErrorKind::SchemaInvalid,
                    format!("duplicated field name: {}", field.name),
                ));
            }
        }

        Ok(Self {
            fields,
            enable_dynamic_field,
        })
    }

    /// Ordered field definitions of this schema.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Whether keys outside the schema are retained under
    /// [`DYNAMIC_FIELD_NAME`].
    pub fn enable_dynamic_field(&self) -> bool {
        self.enable_dynamic_field
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}
