use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Logical type tag carried by every catalog field.
///
/// Tags describe the value a column holds independently of how the dialect
/// stores it: SQLite keeps `DateTime` as text and `Bool` as `0/1`, PostgreSQL
/// uses native types for both. The shaper uses the tag to pick a coercion.
#[derive(JsonSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int,
    BigInt,
    Float,
    String,
    Bool,
    DateTime,
    Decimal,
    Json,
    Enum,
}

impl ScalarType {
    /// Types that text predicates (`contains`, `startsWith`, `endsWith`) apply to.
    pub fn is_textual(self) -> bool {
        matches!(self, ScalarType::String | ScalarType::Enum)
    }

    /// Types `_sum` and `_avg` accept.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ScalarType::Int | ScalarType::BigInt | ScalarType::Float | ScalarType::Decimal
        )
    }

    /// The type a `SUM` over a column of this type yields.
    pub fn sum_type(self) -> ScalarType {
        match self {
            ScalarType::Int | ScalarType::BigInt => ScalarType::BigInt,
            ScalarType::Float => ScalarType::Float,
            other => other,
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScalarType::Int => "Int",
            ScalarType::BigInt => "BigInt",
            ScalarType::Float => "Float",
            ScalarType::String => "String",
            ScalarType::Bool => "Bool",
            ScalarType::DateTime => "DateTime",
            ScalarType::Decimal => "Decimal",
            ScalarType::Json => "Json",
            ScalarType::Enum => "Enum",
        };
        write!(f, "{name}")
    }
}
