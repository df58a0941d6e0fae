//! # Catalog document
//!
//! The on-disk/wire form of the catalog. Hosts hand this over pre-parsed or
//! as a JSON file; [`crate::catalog::Catalog::from_document`] links and
//! validates it into the runtime graph.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sqlweave_values::scalar::ScalarType;

/// Root of the catalog document: the ordered list of models.
#[derive(JsonSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CatalogDocument {
    pub models: Vec<ModelDocument>,
}

/// One model: logical name, physical table, fields, and relation edges.
#[derive(JsonSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelDocument {
    pub name: String,
    pub table: String,
    /// Schema qualifier, emitted on PostgreSQL only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub fields: Vec<FieldDocument>,
    #[serde(default)]
    pub relations: Vec<RelationDocument>,
    #[serde(rename = "primaryKey", default)]
    pub primary_key: Vec<String>,
    /// Additional unique key sets beyond the primary key.
    #[serde(rename = "uniqueKeys", default)]
    pub unique_keys: Vec<Vec<String>>,
}

/// One scalar field.
#[derive(JsonSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldDocument {
    pub name: String,
    /// SQL column name; defaults to the logical name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub r#type: ScalarType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub list: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Cardinality of a relation edge.
#[derive(JsonSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    /// The kind the inverse edge must carry.
    pub fn inverse(self) -> RelationKind {
        match self {
            RelationKind::OneToOne => RelationKind::OneToOne,
            RelationKind::OneToMany => RelationKind::ManyToOne,
            RelationKind::ManyToOne => RelationKind::OneToMany,
            RelationKind::ManyToMany => RelationKind::ManyToMany,
        }
    }

    /// Whether traversing this edge yields many rows.
    pub fn is_list(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// One relation edge.
///
/// Direct edges (`oneToOne`, `oneToMany`, `manyToOne`) join
/// `source.localColumn = target.foreignColumn`. Many-to-many edges go through
/// `joinModel`: `joinModel.sourceColumn` references `source.sourceKey` and
/// `joinModel.targetColumn` references `target.targetKey`.
#[derive(JsonSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RelationDocument {
    pub name: String,
    pub kind: RelationKind,
    /// Target model name.
    pub model: String,
    /// Name of the inverse edge on the target, required only when two edges
    /// connect the same pair of models.
    #[serde(rename = "backReference", skip_serializing_if = "Option::is_none")]
    pub back_reference: Option<String>,
    #[serde(rename = "localColumn", skip_serializing_if = "Option::is_none")]
    pub local_column: Option<String>,
    #[serde(rename = "foreignColumn", skip_serializing_if = "Option::is_none")]
    pub foreign_column: Option<String>,
    #[serde(rename = "joinModel", skip_serializing_if = "Option::is_none")]
    pub join_model: Option<String>,
    #[serde(rename = "sourceColumn", skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(rename = "targetColumn", skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(rename = "sourceKey", skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(rename = "targetKey", skip_serializing_if = "Option::is_none")]
    pub target_key: Option<String>,
}
