//! # Runtime catalog
//!
//! Links a [`CatalogDocument`] into the immutable graph the compiler walks.
//! Models live in a vector; relations address their target model and their
//! inverse edge by index, so navigation is O(1) and the graph has no ownership
//! cycles.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{event, Level};

use sqlweave_values::scalar::ScalarType;

use crate::document::{CatalogDocument, ModelDocument, RelationDocument, RelationKind};
use crate::error::CatalogError;

/// A scalar field of a model.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub column: String,
    pub scalar: ScalarType,
    pub nullable: bool,
    pub list: bool,
    pub default: Option<Value>,
}

/// Keying info of a relation edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKeys {
    /// `source.local = target.foreign`
    Direct { local: String, foreign: String },
    /// Two hops through a join table:
    /// `join.source_column = source.source_key` and
    /// `join.target_column = target.target_key`.
    JoinTable {
        join_model: usize,
        source_column: String,
        target_column: String,
        source_key: String,
        target_key: String,
    },
}

/// A linked relation edge.
#[derive(Clone, Debug)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Index of the target model in [`Catalog::models`].
    pub target: usize,
    /// Index of the inverse edge in the target model's relation list.
    pub inverse: usize,
    pub keys: RelationKeys,
    pub back_reference: Option<String>,
}

/// A linked model.
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub table: String,
    pub schema: Option<String>,
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
    /// Field indices of the primary key.
    pub primary_key: Vec<usize>,
    /// Field indices of every unique key set, primary key included.
    pub unique_keys: Vec<Vec<usize>>,
    field_index: HashMap<String, usize>,
    relation_index: HashMap<String, usize>,
}

impl Model {
    pub fn field(&self, name: &str) -> Option<(usize, &Field)> {
        let idx = *self.field_index.get(name)?;
        Some((idx, &self.fields[idx]))
    }

    pub fn relation(&self, name: &str) -> Option<(usize, &Relation)> {
        let idx = *self.relation_index.get(name)?;
        Some((idx, &self.relations[idx]))
    }

    fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column == column)
    }
}

/// The read-only model registry.
#[derive(Clone, Debug)]
pub struct Catalog {
    models: Vec<Model>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Reads and links a catalog from a JSON document file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let document: CatalogDocument = serde_json::from_str(&raw)?;
        Self::from_document(&document)
    }

    /// Links and validates a parsed document.
    pub fn from_document(document: &CatalogDocument) -> Result<Catalog, CatalogError> {
        let mut by_name = HashMap::new();
        for (idx, model) in document.models.iter().enumerate() {
            if by_name.insert(model.name.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateModel(model.name.clone()));
            }
        }

        let mut models = document
            .models
            .iter()
            .map(link_model)
            .collect::<Result<Vec<_>, _>>()?;

        // Relations need every model's field list in place first.
        for (idx, doc) in document.models.iter().enumerate() {
            let relations = doc
                .relations
                .iter()
                .map(|rel| link_relation(&models, &by_name, idx, rel))
                .collect::<Result<Vec<_>, _>>()?;
            models[idx].relation_index = relations
                .iter()
                .enumerate()
                .map(|(i, r)| (r.name.clone(), i))
                .collect();
            if models[idx].relation_index.len() != relations.len() {
                let dup = duplicate_name(relations.iter().map(|r| r.name.as_str()));
                return Err(CatalogError::DuplicateMember {
                    model: doc.name.clone(),
                    name: dup.unwrap_or_default(),
                });
            }
            models[idx].relations = relations;
        }

        resolve_inverses(&mut models)?;

        event!(
            Level::INFO,
            models = models.len(),
            "linked catalog document"
        );
        Ok(Catalog { models, by_name })
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<(usize, &Model)> {
        let idx = *self.by_name.get(name)?;
        Some((idx, &self.models[idx]))
    }

    pub fn model_at(&self, idx: usize) -> &Model {
        &self.models[idx]
    }
}

fn duplicate_name<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashMap::new();
    for name in names {
        if seen.insert(name, ()).is_some() {
            return Some(name.to_string());
        }
    }
    None
}

fn link_model(doc: &ModelDocument) -> Result<Model, CatalogError> {
    let fields: Vec<Field> = doc
        .fields
        .iter()
        .map(|f| Field {
            name: f.name.clone(),
            column: f.column.clone().unwrap_or_else(|| f.name.clone()),
            scalar: f.r#type,
            nullable: f.nullable,
            list: f.list,
            default: f.default.clone(),
        })
        .collect();

    let field_index: HashMap<String, usize> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.clone(), i))
        .collect();
    if field_index.len() != fields.len() {
        let dup = duplicate_name(fields.iter().map(|f| f.name.as_str()));
        return Err(CatalogError::DuplicateMember {
            model: doc.name.clone(),
            name: dup.unwrap_or_default(),
        });
    }

    let resolve_keys = |names: &[String]| -> Result<Vec<usize>, CatalogError> {
        names
            .iter()
            .map(|n| {
                field_index
                    .get(n)
                    .copied()
                    .ok_or_else(|| CatalogError::UnknownKeyField {
                        model: doc.name.clone(),
                        field: n.clone(),
                    })
            })
            .collect()
    };

    let primary_key = resolve_keys(&doc.primary_key)?;
    let mut unique_keys = Vec::new();
    if !primary_key.is_empty() {
        unique_keys.push(primary_key.clone());
    }
    for set in &doc.unique_keys {
        unique_keys.push(resolve_keys(set)?);
    }

    Ok(Model {
        name: doc.name.clone(),
        table: doc.table.clone(),
        schema: doc.schema.clone(),
        fields,
        relations: Vec::new(),
        primary_key,
        unique_keys,
        field_index,
        relation_index: HashMap::new(),
    })
}

fn link_relation(
    models: &[Model],
    by_name: &HashMap<String, usize>,
    source: usize,
    doc: &RelationDocument,
) -> Result<Relation, CatalogError> {
    let model_name = models[source].name.clone();
    let target = *by_name
        .get(&doc.model)
        .ok_or_else(|| CatalogError::UnknownTargetModel {
            model: model_name.clone(),
            relation: doc.name.clone(),
            target: doc.model.clone(),
        })?;

    let require_column = |owner: usize, column: &Option<String>| -> Result<String, CatalogError> {
        let column = column.as_ref().ok_or_else(|| CatalogError::IncompleteKeys {
            model: model_name.clone(),
            relation: doc.name.clone(),
        })?;
        models[owner].field_by_column(column).ok_or_else(|| {
            CatalogError::UnknownColumn {
                model: models[owner].name.clone(),
                relation: doc.name.clone(),
                column: column.clone(),
            }
        })?;
        Ok(column.clone())
    };

    let keys = match doc.kind {
        RelationKind::ManyToMany => {
            let join_name =
                doc.join_model
                    .as_ref()
                    .ok_or_else(|| CatalogError::IncompleteKeys {
                        model: model_name.clone(),
                        relation: doc.name.clone(),
                    })?;
            let join_model =
                *by_name
                    .get(join_name)
                    .ok_or_else(|| CatalogError::UnknownTargetModel {
                        model: model_name.clone(),
                        relation: doc.name.clone(),
                        target: join_name.clone(),
                    })?;
            RelationKeys::JoinTable {
                join_model,
                source_column: require_column(join_model, &doc.source_column)?,
                target_column: require_column(join_model, &doc.target_column)?,
                source_key: require_column(source, &doc.source_key)?,
                target_key: require_column(target, &doc.target_key)?,
            }
        }
        _ => RelationKeys::Direct {
            local: require_column(source, &doc.local_column)?,
            foreign: require_column(target, &doc.foreign_column)?,
        },
    };

    Ok(Relation {
        name: doc.name.clone(),
        kind: doc.kind,
        target,
        inverse: usize::MAX,
        keys,
        back_reference: doc.back_reference.clone(),
    })
}

fn keys_mirror(forward: &RelationKeys, backward: &RelationKeys) -> bool {
    match (forward, backward) {
        (
            RelationKeys::Direct { local, foreign },
            RelationKeys::Direct {
                local: b_local,
                foreign: b_foreign,
            },
        ) => b_local == foreign && b_foreign == local,
        (
            RelationKeys::JoinTable {
                join_model,
                source_column,
                target_column,
                source_key,
                target_key,
            },
            RelationKeys::JoinTable {
                join_model: b_join,
                source_column: b_source_column,
                target_column: b_target_column,
                source_key: b_source_key,
                target_key: b_target_key,
            },
        ) => {
            b_join == join_model
                && b_source_column == target_column
                && b_target_column == source_column
                && b_source_key == target_key
                && b_target_key == source_key
        }
        _ => false,
    }
}

/// Pairs every edge with its inverse and checks both directions agree.
fn resolve_inverses(models: &mut [Model]) -> Result<(), CatalogError> {
    let snapshot = models.to_vec();
    for (m_idx, model) in models.iter_mut().enumerate() {
        for relation in &mut model.relations {
            let target = &snapshot[relation.target];
            let mirrors = |candidate: &Relation| {
                candidate.target == m_idx
                    && candidate.kind == relation.kind.inverse()
                    && keys_mirror(&relation.keys, &candidate.keys)
            };

            let inverse = if let Some(back) = &relation.back_reference {
                let (idx, candidate) = target.relation(back).ok_or_else(|| {
                    CatalogError::MissingInverse {
                        model: snapshot[m_idx].name.clone(),
                        relation: relation.name.clone(),
                        target: target.name.clone(),
                    }
                })?;
                if !mirrors(candidate) {
                    return Err(CatalogError::InverseMismatch {
                        model: snapshot[m_idx].name.clone(),
                        relation: relation.name.clone(),
                        inverse: candidate.name.clone(),
                    });
                }
                idx
            } else {
                let mut candidates = target
                    .relations
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| mirrors(c));
                let first = candidates.next();
                let second = candidates.next();
                match (first, second) {
                    (Some((idx, _)), None) => idx,
                    (None, _) => {
                        return Err(CatalogError::MissingInverse {
                            model: snapshot[m_idx].name.clone(),
                            relation: relation.name.clone(),
                            target: target.name.clone(),
                        })
                    }
                    (Some(_), Some(_)) => {
                        return Err(CatalogError::AmbiguousInverse {
                            model: snapshot[m_idx].name.clone(),
                            relation: relation.name.clone(),
                            target: target.name.clone(),
                        })
                    }
                }
            };
            relation.inverse = inverse;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> CatalogDocument {
        serde_json::from_value(serde_json::json!({
            "models": [
                {
                    "name": "User",
                    "table": "users",
                    "schema": "public",
                    "fields": [
                        {"name": "id", "type": "Int"},
                        {"name": "email", "type": "String"}
                    ],
                    "primaryKey": ["id"],
                    "uniqueKeys": [["email"]],
                    "relations": [
                        {
                            "name": "tasks",
                            "kind": "oneToMany",
                            "model": "Task",
                            "localColumn": "id",
                            "foreignColumn": "assignee_id"
                        }
                    ]
                },
                {
                    "name": "Task",
                    "table": "tasks",
                    "schema": "public",
                    "fields": [
                        {"name": "id", "type": "Int"},
                        {"name": "assigneeId", "column": "assignee_id", "type": "Int", "nullable": true}
                    ],
                    "primaryKey": ["id"],
                    "relations": [
                        {
                            "name": "assignee",
                            "kind": "manyToOne",
                            "model": "User",
                            "localColumn": "assignee_id",
                            "foreignColumn": "id"
                        },
                        {
                            "name": "tags",
                            "kind": "manyToMany",
                            "model": "Tag",
                            "joinModel": "TaskTag",
                            "sourceColumn": "task_id",
                            "targetColumn": "tag_id",
                            "sourceKey": "id",
                            "targetKey": "id"
                        }
                    ]
                },
                {
                    "name": "Tag",
                    "table": "tags",
                    "schema": "public",
                    "fields": [{"name": "id", "type": "Int"}],
                    "primaryKey": ["id"],
                    "relations": [
                        {
                            "name": "tasks",
                            "kind": "manyToMany",
                            "model": "Task",
                            "joinModel": "TaskTag",
                            "sourceColumn": "tag_id",
                            "targetColumn": "task_id",
                            "sourceKey": "id",
                            "targetKey": "id"
                        }
                    ]
                },
                {
                    "name": "TaskTag",
                    "table": "task_tags",
                    "schema": "public",
                    "fields": [
                        {"name": "taskId", "column": "task_id", "type": "Int"},
                        {"name": "tagId", "column": "tag_id", "type": "Int"}
                    ],
                    "primaryKey": ["taskId", "tagId"]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn inverse_edges_are_linked_both_ways() {
        let catalog = Catalog::from_document(&document()).unwrap();
        let (user_idx, user) = catalog.model("User").unwrap();
        let (tasks_idx, tasks_rel) = user.relation("tasks").unwrap();
        let task = catalog.model_at(tasks_rel.target);
        assert_eq!(task.name, "Task");

        let inverse = &task.relations[tasks_rel.inverse];
        assert_eq!(inverse.name, "assignee");
        assert_eq!(inverse.target, user_idx);
        assert_eq!(inverse.inverse, tasks_idx);
    }

    #[test]
    fn many_to_many_mirrors_through_the_join_model() {
        let catalog = Catalog::from_document(&document()).unwrap();
        let (_, task) = catalog.model("Task").unwrap();
        let (_, tags) = task.relation("tags").unwrap();
        let RelationKeys::JoinTable {
            join_model,
            source_column,
            target_column,
            ..
        } = &tags.keys
        else {
            panic!("expected join-table keys");
        };
        assert_eq!(catalog.model_at(*join_model).name, "TaskTag");
        assert_eq!(source_column, "task_id");
        assert_eq!(target_column, "tag_id");
        assert_eq!(catalog.model_at(tags.target).relations[tags.inverse].name, "tasks");
    }

    #[test]
    fn missing_inverse_is_rejected() {
        let mut doc = document();
        // Drop the Task.assignee edge; User.tasks is then one-directional.
        doc.models[1].relations.remove(0);
        let err = Catalog::from_document(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::MissingInverse { .. }), "{err}");
    }

    #[test]
    fn unknown_relation_column_is_rejected() {
        let mut doc = document();
        doc.models[0].relations[0].foreign_column = Some("nope".into());
        let err = Catalog::from_document(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownColumn { .. }), "{err}");
    }

    #[test]
    fn unknown_target_model_is_rejected() {
        let mut doc = document();
        doc.models[0].relations[0].model = "Ghost".into();
        let err = Catalog::from_document(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTargetModel { .. }), "{err}");
    }
}
