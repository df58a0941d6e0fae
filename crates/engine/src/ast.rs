//! # Query description
//!
//! The typed form of the caller's query tree. Parsing happens against the
//! catalog: every name is resolved to a field or relation index up front, so
//! the compiler proper never sees a string it has not checked. Unknown names
//! fail with `SchemaMismatch`, structural problems with `InvalidArgument`.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use sqlweave_schema::catalog::{Catalog, Field, Model};
use sqlweave_values::coerce::from_json_typed;
use sqlweave_values::scalar::ScalarType;
use sqlweave_values::values::Value;

use crate::context::MAX_DEPTH;
use crate::error::{QueryError, Result};

/// The six read operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    FindMany,
    FindFirst,
    FindUnique,
    Count,
    Aggregate,
    GroupBy,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::FindMany => "findMany",
            Method::FindFirst => "findFirst",
            Method::FindUnique => "findUnique",
            Method::Count => "count",
            Method::Aggregate => "aggregate",
            Method::GroupBy => "groupBy",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Method> {
        match s {
            "findMany" => Ok(Method::FindMany),
            "findFirst" => Ok(Method::FindFirst),
            "findUnique" => Ok(Method::FindUnique),
            "count" => Ok(Method::Count),
            "aggregate" => Ok(Method::Aggregate),
            "groupBy" => Ok(Method::GroupBy),
            other => Err(QueryError::InvalidArgument(format!(
                "unknown method `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderSpec {
    pub field: usize,
    pub direction: Direction,
}

/// Relation quantifiers of the filter grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
    None,
}

/// One leaf predicate over a scalar field.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarCond {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains { value: String, insensitive: bool },
    StartsWith { value: String, insensitive: bool },
    EndsWith { value: String, insensitive: bool },
    IsNull,
    IsNotNull,
}

/// Recursive boolean expression over a model's fields and relations.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Scalar { field: usize, cond: ScalarCond },
    Relation {
        relation: usize,
        quantifier: Quantifier,
        filter: Option<Box<Filter>>,
    },
}

/// Resolved projection at one level: scalar fields, embedded relations, and
/// relation `_count`s, each in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub scalars: Vec<usize>,
    pub relations: Vec<RelationSelect>,
    pub counts: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationSelect {
    pub relation: usize,
    pub args: ParsedQuery,
}

/// Which aggregates to compute (`aggregate` and `groupBy`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateSpec {
    pub count_all: bool,
    pub count_fields: Vec<usize>,
    pub sum: Vec<usize>,
    pub avg: Vec<usize>,
    pub min: Vec<usize>,
    pub max: Vec<usize>,
}

impl AggregateSpec {
    pub fn is_empty(&self) -> bool {
        !self.count_all
            && self.count_fields.is_empty()
            && self.sum.is_empty()
            && self.avg.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        }
    }
}

/// Filter over aggregates (`having`).
#[derive(Clone, Debug, PartialEq)]
pub enum Having {
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Box<Having>),
    Agg {
        /// `None` counts rows (`COUNT(*)`).
        field: Option<usize>,
        func: AggFunc,
        cond: ScalarCond,
    },
}

/// The fully resolved query description for one level.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuery {
    pub filter: Option<Filter>,
    pub selection: Selection,
    pub order_by: Vec<OrderSpec>,
    pub take: Option<u64>,
    pub skip: u64,
    pub cursor: Vec<(usize, Value)>,
    pub distinct: Vec<usize>,
    pub aggregate: AggregateSpec,
    pub by: Vec<usize>,
    pub having: Option<Having>,
}

impl ParsedQuery {
    fn empty(selection: Selection) -> ParsedQuery {
        ParsedQuery {
            filter: None,
            selection,
            order_by: Vec::new(),
            take: None,
            skip: 0,
            cursor: Vec::new(),
            distinct: Vec::new(),
            aggregate: AggregateSpec::default(),
            by: Vec::new(),
            having: None,
        }
    }
}

fn invalid(msg: impl Into<String>) -> QueryError {
    QueryError::InvalidArgument(msg.into())
}

fn as_object(value: &Json, what: &str) -> Result<serde_json::Map<String, Json>> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| invalid(format!("`{what}` must be an object")))
}

/// Parses and validates the args document for one top-level request.
pub fn parse_query(
    catalog: &Catalog,
    model_idx: usize,
    method: Method,
    args: &Json,
) -> Result<ParsedQuery> {
    let model = catalog.model_at(model_idx);
    let map = match args {
        Json::Null => serde_json::Map::new(),
        Json::Object(map) => map.clone(),
        _ => return Err(invalid("query args must be an object")),
    };

    let allowed: &[&str] = match method {
        Method::FindMany | Method::FindFirst => &[
            "where", "select", "include", "orderBy", "take", "skip", "cursor", "distinct",
        ],
        Method::FindUnique => &["where", "select", "include"],
        Method::Count => &["where"],
        Method::Aggregate => &["where", "_count", "_sum", "_avg", "_min", "_max"],
        Method::GroupBy => &[
            "by", "where", "having", "orderBy", "take", "skip", "_count", "_sum", "_avg", "_min",
            "_max",
        ],
    };
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid(format!(
                "unexpected key `{key}` for {}",
                method.as_str()
            )));
        }
    }

    let filter = map
        .get("where")
        .map(|w| parse_filter(catalog, model_idx, w))
        .transpose()?;

    let selection = parse_selection(catalog, model_idx, map.get("select"), map.get("include"), 0)?;

    let order_by = map
        .get("orderBy")
        .map(|o| parse_order_by(model, o))
        .transpose()?
        .unwrap_or_default();

    let take = map.get("take").map(|t| parse_limit(t, "take")).transpose()?;
    let skip = map
        .get("skip")
        .map(|s| parse_limit(s, "skip"))
        .transpose()?
        .unwrap_or(0);

    let cursor = map
        .get("cursor")
        .map(|c| parse_cursor(model, c, &order_by))
        .transpose()?
        .unwrap_or_default();

    let distinct = map
        .get("distinct")
        .map(|d| parse_distinct(model, d))
        .transpose()?
        .unwrap_or_default();

    let aggregate = parse_aggregate_spec(model, &map)?;

    let by = map
        .get("by")
        .map(|b| parse_by(model, b))
        .transpose()?
        .unwrap_or_default();

    let having = map
        .get("having")
        .map(|h| parse_having(model, h))
        .transpose()?;

    match method {
        Method::FindUnique => check_unique_filter(model, filter.as_ref())?,
        Method::Aggregate => {
            if aggregate.is_empty() {
                return Err(invalid(
                    "aggregate requires at least one of _count/_sum/_avg/_min/_max",
                ));
            }
        }
        Method::GroupBy => {
            if by.is_empty() {
                return Err(invalid("groupBy requires a non-empty `by` list"));
            }
            for spec in &order_by {
                if !by.contains(&spec.field) {
                    return Err(invalid(
                        "`orderBy` in groupBy must reference grouped fields",
                    ));
                }
            }
        }
        _ => {}
    }

    Ok(ParsedQuery {
        filter,
        selection,
        order_by,
        take,
        skip,
        cursor,
        distinct,
        aggregate,
        by,
        having,
    })
}

fn parse_limit(value: &Json, what: &str) -> Result<u64> {
    match value.as_i64() {
        Some(n) if n >= 0 => Ok(n as u64),
        Some(_) => Err(invalid(format!("`{what}` must be non-negative"))),
        None => Err(invalid(format!("`{what}` must be an integer"))),
    }
}

fn typed(field: &Field, value: &Json) -> Result<Value> {
    if field.list {
        return Ok(Value::Json(value.clone()));
    }
    from_json_typed(value, field.scalar).map_err(|e| invalid(e.to_string()))
}

/// Parses a `where` document into a [`Filter`]. An empty object is the neutral
/// `And([])`.
pub fn parse_filter(catalog: &Catalog, model_idx: usize, value: &Json) -> Result<Filter> {
    let model = catalog.model_at(model_idx);
    let map = as_object(value, "where")?;
    let mut parts = Vec::new();

    for (key, entry) in &map {
        match key.as_str() {
            "AND" => parts.push(parse_logical_list(catalog, model_idx, entry, Filter::And)?),
            "OR" => match entry {
                Json::Array(items) => {
                    let filters = items
                        .iter()
                        .map(|i| parse_filter(catalog, model_idx, i))
                        .collect::<Result<Vec<_>>>()?;
                    parts.push(Filter::Or(filters));
                }
                _ => return Err(invalid("`OR` expects a list of filters")),
            },
            "NOT" => {
                let inner = parse_logical_list(catalog, model_idx, entry, Filter::And)?;
                parts.push(Filter::Not(Box::new(inner)));
            }
            name => {
                if let Some((field_idx, field)) = model.field(name) {
                    for cond in parse_scalar_conds(field, entry)? {
                        parts.push(Filter::Scalar {
                            field: field_idx,
                            cond,
                        });
                    }
                } else if let Some((rel_idx, relation)) = model.relation(name) {
                    parts.extend(parse_relation_conds(catalog, rel_idx, relation.target, name, entry)?);
                } else {
                    return Err(QueryError::unknown_field(&model.name, name));
                }
            }
        }
    }

    Ok(if parts.len() == 1 {
        parts.into_iter().next().expect("one part")
    } else {
        Filter::And(parts)
    })
}

/// `AND`/`NOT` accept either a single filter object or a list.
fn parse_logical_list(
    catalog: &Catalog,
    model_idx: usize,
    value: &Json,
    combine: fn(Vec<Filter>) -> Filter,
) -> Result<Filter> {
    match value {
        Json::Array(items) => {
            let filters = items
                .iter()
                .map(|i| parse_filter(catalog, model_idx, i))
                .collect::<Result<Vec<_>>>()?;
            Ok(combine(filters))
        }
        Json::Object(_) => parse_filter(catalog, model_idx, value),
        _ => Err(invalid("logical combinators expect a filter or a list")),
    }
}

fn parse_scalar_conds(field: &Field, value: &Json) -> Result<Vec<ScalarCond>> {
    match value {
        Json::Null => Ok(vec![ScalarCond::IsNull]),
        Json::Object(ops) => {
            let insensitive = match ops.get("mode").and_then(Json::as_str) {
                None => false,
                Some("insensitive") => true,
                Some("default") => false,
                Some(other) => {
                    return Err(invalid(format!("unknown match mode `{other}`")));
                }
            };
            let mut conds = Vec::new();
            for (op, operand) in ops {
                if op == "mode" {
                    continue;
                }
                conds.push(parse_operator(field, op, operand, insensitive)?);
            }
            Ok(conds)
        }
        other => Ok(vec![ScalarCond::Equals(typed(field, other)?)]),
    }
}

fn parse_operator(
    field: &Field,
    op: &str,
    operand: &Json,
    insensitive: bool,
) -> Result<ScalarCond> {
    let non_null = || -> Result<Value> {
        if operand.is_null() {
            return Err(invalid(format!(
                "null is only valid with `equals` and `not` (field `{}`)",
                field.name
            )));
        }
        typed(field, operand)
    };
    let text = || -> Result<String> {
        if !field.scalar.is_textual() {
            return Err(invalid(format!(
                "`{op}` requires a text field, but `{}` is {}",
                field.name, field.scalar
            )));
        }
        operand
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("`{op}` expects a string")))
    };
    let list = || -> Result<Vec<Value>> {
        let items = operand
            .as_array()
            .ok_or_else(|| invalid(format!("`{op}` expects a list (field `{}`)", field.name)))?;
        items
            .iter()
            .map(|item| {
                if item.is_null() {
                    Err(invalid(format!("`{op}` lists cannot contain null")))
                } else {
                    typed(field, item)
                }
            })
            .collect()
    };

    match op {
        "equals" => {
            if operand.is_null() {
                Ok(ScalarCond::IsNull)
            } else {
                Ok(ScalarCond::Equals(typed(field, operand)?))
            }
        }
        "not" => match operand {
            Json::Null => Ok(ScalarCond::IsNotNull),
            Json::Object(_) => Err(invalid(format!(
                "nested conditions under `not` are not supported (field `{}`)",
                field.name
            ))),
            other => Ok(ScalarCond::NotEquals(typed(field, other)?)),
        },
        "in" => Ok(ScalarCond::In(list()?)),
        "notIn" => Ok(ScalarCond::NotIn(list()?)),
        "lt" => Ok(ScalarCond::Lt(non_null()?)),
        "lte" => Ok(ScalarCond::Lte(non_null()?)),
        "gt" => Ok(ScalarCond::Gt(non_null()?)),
        "gte" => Ok(ScalarCond::Gte(non_null()?)),
        "contains" => Ok(ScalarCond::Contains {
            value: text()?,
            insensitive,
        }),
        "startsWith" => Ok(ScalarCond::StartsWith {
            value: text()?,
            insensitive,
        }),
        "endsWith" => Ok(ScalarCond::EndsWith {
            value: text()?,
            insensitive,
        }),
        other => Err(invalid(format!(
            "unknown operator `{other}` on field `{}`",
            field.name
        ))),
    }
}

fn parse_relation_conds(
    catalog: &Catalog,
    rel_idx: usize,
    target_idx: usize,
    name: &str,
    value: &Json,
) -> Result<Vec<Filter>> {
    let map = as_object(value, name)?;
    if map.is_empty() {
        return Err(invalid(format!(
            "relation filter `{name}` expects `some`, `every`, or `none`"
        )));
    }
    let mut out = Vec::new();
    for (key, inner) in &map {
        let quantifier = match key.as_str() {
            "some" => Quantifier::Some,
            "every" => Quantifier::Every,
            "none" => Quantifier::None,
            other => {
                return Err(invalid(format!(
                    "relation filter `{name}` expects `some`, `every`, or `none`, got `{other}`"
                )));
            }
        };
        let parsed = parse_filter(catalog, target_idx, inner)?;
        let filter = match &parsed {
            Filter::And(items) if items.is_empty() => None,
            _ => Some(Box::new(parsed)),
        };
        out.push(Filter::Relation {
            relation: rel_idx,
            quantifier,
            filter,
        });
    }
    Ok(out)
}

fn all_scalars(model: &Model) -> Vec<usize> {
    (0..model.fields.len()).collect()
}

fn parse_selection(
    catalog: &Catalog,
    model_idx: usize,
    select: Option<&Json>,
    include: Option<&Json>,
    depth: usize,
) -> Result<Selection> {
    if select.is_some() && include.is_some() {
        return Err(invalid(
            "`select` and `include` cannot be combined at the same level",
        ));
    }
    let model = catalog.model_at(model_idx);

    let mut selection = Selection {
        scalars: Vec::new(),
        relations: Vec::new(),
        counts: Vec::new(),
    };

    if let Some(select) = select {
        let map = as_object(select, "select")?;
        for (key, entry) in &map {
            if key == "_count" {
                selection.counts = parse_count_selection(model, entry)?;
                continue;
            }
            if let Some((field_idx, _)) = model.field(key) {
                match entry {
                    Json::Bool(true) => selection.scalars.push(field_idx),
                    Json::Bool(false) => {}
                    _ => {
                        return Err(invalid(format!(
                            "field `{key}` selects with true or false"
                        )));
                    }
                }
            } else if let Some((rel_idx, relation)) = model.relation(key) {
                if let Some(rs) =
                    parse_relation_value(catalog, rel_idx, relation.target, key, entry, depth)?
                {
                    selection.relations.push(rs);
                }
            } else {
                return Err(QueryError::unknown_field(&model.name, key));
            }
        }
        if selection.scalars.is_empty()
            && selection.relations.is_empty()
            && selection.counts.is_empty()
        {
            return Err(invalid("`select` must name at least one field"));
        }
        return Ok(selection);
    }

    selection.scalars = all_scalars(model);
    if let Some(include) = include {
        let map = as_object(include, "include")?;
        for (key, entry) in &map {
            if key == "_count" {
                selection.counts = parse_count_selection(model, entry)?;
                continue;
            }
            let Some((rel_idx, relation)) = model.relation(key) else {
                return Err(QueryError::SchemaMismatch {
                    kind: "relation",
                    name: key.clone(),
                    scope: model.name.clone(),
                });
            };
            if let Some(rs) =
                parse_relation_value(catalog, rel_idx, relation.target, key, entry, depth)?
            {
                selection.relations.push(rs);
            }
        }
    }
    Ok(selection)
}

/// `_count: true` counts every relation; `_count: {select: {...}}` names them.
fn parse_count_selection(model: &Model, value: &Json) -> Result<Vec<usize>> {
    match value {
        Json::Bool(true) => Ok((0..model.relations.len()).collect()),
        Json::Object(map) => {
            let select = map
                .get("select")
                .ok_or_else(|| invalid("`_count` expects `{select: {...}}`"))?;
            let select = as_object(select, "_count.select")?;
            let mut counts = Vec::new();
            for (key, entry) in &select {
                let Some((rel_idx, _)) = model.relation(key) else {
                    return Err(QueryError::SchemaMismatch {
                        kind: "relation",
                        name: key.clone(),
                        scope: model.name.clone(),
                    });
                };
                match entry {
                    Json::Bool(true) => counts.push(rel_idx),
                    Json::Bool(false) => {}
                    _ => return Err(invalid("`_count.select` entries are true or false")),
                }
            }
            Ok(counts)
        }
        _ => Err(invalid("`_count` expects true or `{select: {...}}`")),
    }
}

fn parse_relation_value(
    catalog: &Catalog,
    rel_idx: usize,
    target_idx: usize,
    name: &str,
    value: &Json,
    depth: usize,
) -> Result<Option<RelationSelect>> {
    if depth + 1 > MAX_DEPTH {
        return Err(QueryError::DepthExceeded);
    }
    match value {
        Json::Bool(true) => {
            let selection = Selection {
                scalars: all_scalars(catalog.model_at(target_idx)),
                relations: Vec::new(),
                counts: Vec::new(),
            };
            Ok(Some(RelationSelect {
                relation: rel_idx,
                args: ParsedQuery::empty(selection),
            }))
        }
        Json::Bool(false) => Ok(None),
        Json::Object(_) => {
            let args = parse_nested(catalog, target_idx, value, depth)?;
            Ok(Some(RelationSelect {
                relation: rel_idx,
                args,
            }))
        }
        _ => Err(invalid(format!(
            "relation `{name}` selects with true, false, or a nested query"
        ))),
    }
}

/// Nested relation query: a reduced arg set (no cursor, no distinct).
fn parse_nested(
    catalog: &Catalog,
    model_idx: usize,
    args: &Json,
    depth: usize,
) -> Result<ParsedQuery> {
    let model = catalog.model_at(model_idx);
    let map = as_object(args, "relation query")?;
    for key in map.keys() {
        match key.as_str() {
            "where" | "select" | "include" | "orderBy" | "take" | "skip" => {}
            "cursor" | "distinct" => {
                return Err(invalid(format!(
                    "`{key}` is not supported inside a relation selection"
                )));
            }
            other => {
                return Err(invalid(format!(
                    "unexpected key `{other}` in relation query"
                )));
            }
        }
    }

    let filter = map
        .get("where")
        .map(|w| parse_filter(catalog, model_idx, w))
        .transpose()?;
    let selection = parse_selection(
        catalog,
        model_idx,
        map.get("select"),
        map.get("include"),
        depth + 1,
    )?;
    let order_by = map
        .get("orderBy")
        .map(|o| parse_order_by(model, o))
        .transpose()?
        .unwrap_or_default();
    let take = map.get("take").map(|t| parse_limit(t, "take")).transpose()?;
    let skip = map
        .get("skip")
        .map(|s| parse_limit(s, "skip"))
        .transpose()?
        .unwrap_or(0);

    let mut parsed = ParsedQuery::empty(selection);
    parsed.filter = filter;
    parsed.order_by = order_by;
    parsed.take = take;
    parsed.skip = skip;
    Ok(parsed)
}

fn parse_order_entry(model: &Model, map: &serde_json::Map<String, Json>) -> Result<Vec<OrderSpec>> {
    let mut specs = Vec::new();
    for (key, dir) in map {
        let Some((field_idx, _)) = model.field(key) else {
            if model.relation(key).is_some() {
                return Err(invalid(format!(
                    "ordering by relation `{key}` is not supported"
                )));
            }
            return Err(QueryError::unknown_field(&model.name, key));
        };
        let direction = match dir.as_str() {
            Some("asc") => Direction::Asc,
            Some("desc") => Direction::Desc,
            _ => {
                return Err(invalid(format!(
                    "`orderBy.{key}` must be \"asc\" or \"desc\""
                )));
            }
        };
        specs.push(OrderSpec {
            field: field_idx,
            direction,
        });
    }
    Ok(specs)
}

fn parse_order_by(model: &Model, value: &Json) -> Result<Vec<OrderSpec>> {
    match value {
        Json::Object(map) => parse_order_entry(model, map),
        Json::Array(items) => {
            let mut specs = Vec::new();
            for item in items {
                let map = as_object(item, "orderBy")?;
                specs.extend(parse_order_entry(model, &map)?);
            }
            Ok(specs)
        }
        _ => Err(invalid("`orderBy` must be an object or a list of objects")),
    }
}

fn parse_cursor(model: &Model, value: &Json, order_by: &[OrderSpec]) -> Result<Vec<(usize, Value)>> {
    let map = as_object(value, "cursor")?;
    if map.is_empty() {
        return Err(invalid("`cursor` must name at least one field"));
    }
    let mut cursor = Vec::new();
    for (key, entry) in &map {
        let Some((field_idx, field)) = model.field(key) else {
            return Err(QueryError::unknown_field(&model.name, key));
        };
        if !order_by.iter().any(|spec| spec.field == field_idx) {
            return Err(invalid(format!(
                "cursor field `{key}` must appear in `orderBy`"
            )));
        }
        cursor.push((field_idx, typed(field, entry)?));
    }
    Ok(cursor)
}

fn parse_distinct(model: &Model, value: &Json) -> Result<Vec<usize>> {
    let names: Vec<&str> = match value {
        Json::String(s) => vec![s.as_str()],
        Json::Array(items) => items
            .iter()
            .map(|i| i.as_str().ok_or_else(|| invalid("`distinct` lists field names")))
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(invalid("`distinct` must be a field name or a list")),
    };
    names
        .into_iter()
        .map(|name| {
            model
                .field(name)
                .map(|(idx, _)| idx)
                .ok_or_else(|| QueryError::unknown_field(&model.name, name))
        })
        .collect()
}

fn parse_by(model: &Model, value: &Json) -> Result<Vec<usize>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid("`by` must be a list of field names"))?;
    items
        .iter()
        .map(|item| {
            let name = item
                .as_str()
                .ok_or_else(|| invalid("`by` must be a list of field names"))?;
            model
                .field(name)
                .map(|(idx, _)| idx)
                .ok_or_else(|| QueryError::unknown_field(&model.name, name))
        })
        .collect()
}

fn parse_aggregate_fields(
    model: &Model,
    value: &Json,
    func: &str,
    numeric_only: bool,
) -> Result<Vec<usize>> {
    let map = as_object(value, func)?;
    let mut fields = Vec::new();
    for (key, entry) in &map {
        let Some((field_idx, field)) = model.field(key) else {
            return Err(QueryError::unknown_field(&model.name, key));
        };
        match entry {
            Json::Bool(true) => {
                if numeric_only && !field.scalar.is_numeric() {
                    return Err(invalid(format!(
                        "`{func}` requires a numeric field, but `{key}` is {}",
                        field.scalar
                    )));
                }
                if !numeric_only && (field.scalar == ScalarType::Json || field.list) {
                    return Err(invalid(format!(
                        "`{func}` does not support Json or list fields (`{key}`)"
                    )));
                }
                fields.push(field_idx);
            }
            Json::Bool(false) => {}
            _ => return Err(invalid(format!("`{func}` entries are true or false"))),
        }
    }
    Ok(fields)
}

fn parse_aggregate_spec(
    model: &Model,
    map: &serde_json::Map<String, Json>,
) -> Result<AggregateSpec> {
    let mut spec = AggregateSpec::default();
    if let Some(count) = map.get("_count") {
        match count {
            Json::Bool(true) => spec.count_all = true,
            Json::Object(entries) => {
                for (key, entry) in entries {
                    if key == "_all" {
                        match entry {
                            Json::Bool(true) => spec.count_all = true,
                            Json::Bool(false) => {}
                            _ => return Err(invalid("`_count._all` is true or false")),
                        }
                        continue;
                    }
                    let Some((field_idx, _)) = model.field(key) else {
                        return Err(QueryError::unknown_field(&model.name, key));
                    };
                    match entry {
                        Json::Bool(true) => spec.count_fields.push(field_idx),
                        Json::Bool(false) => {}
                        _ => return Err(invalid("`_count` entries are true or false")),
                    }
                }
            }
            _ => return Err(invalid("`_count` expects true or a field map")),
        }
    }
    if let Some(v) = map.get("_sum") {
        spec.sum = parse_aggregate_fields(model, v, "_sum", true)?;
    }
    if let Some(v) = map.get("_avg") {
        spec.avg = parse_aggregate_fields(model, v, "_avg", true)?;
    }
    if let Some(v) = map.get("_min") {
        spec.min = parse_aggregate_fields(model, v, "_min", false)?;
    }
    if let Some(v) = map.get("_max") {
        spec.max = parse_aggregate_fields(model, v, "_max", false)?;
    }
    Ok(spec)
}

fn parse_having(model: &Model, value: &Json) -> Result<Having> {
    let map = as_object(value, "having")?;
    let mut parts = Vec::new();
    for (key, entry) in &map {
        match key.as_str() {
            "AND" => parts.push(parse_having_list(model, entry, Having::And)?),
            "OR" => match entry {
                Json::Array(items) => {
                    let list = items
                        .iter()
                        .map(|i| parse_having(model, i))
                        .collect::<Result<Vec<_>>>()?;
                    parts.push(Having::Or(list));
                }
                _ => return Err(invalid("`OR` expects a list of having filters")),
            },
            "NOT" => {
                let inner = parse_having_list(model, entry, Having::And)?;
                parts.push(Having::Not(Box::new(inner)));
            }
            name => {
                let Some((field_idx, _)) = model.field(name) else {
                    return Err(QueryError::unknown_field(&model.name, name));
                };
                let funcs = as_object(entry, name)?;
                for (func_key, cond_value) in &funcs {
                    let func = match func_key.as_str() {
                        "_count" => AggFunc::Count,
                        "_sum" => AggFunc::Sum,
                        "_avg" => AggFunc::Avg,
                        "_min" => AggFunc::Min,
                        "_max" => AggFunc::Max,
                        other => {
                            return Err(invalid(format!(
                                "`having.{name}` expects an aggregate, got `{other}`"
                            )));
                        }
                    };
                    for cond in parse_having_conds(cond_value)? {
                        parts.push(Having::Agg {
                            field: Some(field_idx),
                            func,
                            cond,
                        });
                    }
                }
            }
        }
    }
    Ok(if parts.len() == 1 {
        parts.into_iter().next().expect("one part")
    } else {
        Having::And(parts)
    })
}

fn parse_having_list(
    model: &Model,
    value: &Json,
    combine: fn(Vec<Having>) -> Having,
) -> Result<Having> {
    match value {
        Json::Array(items) => {
            let list = items
                .iter()
                .map(|i| parse_having(model, i))
                .collect::<Result<Vec<_>>>()?;
            Ok(combine(list))
        }
        Json::Object(_) => parse_having(model, value),
        _ => Err(invalid("logical combinators expect a filter or a list")),
    }
}

/// Conditions on an aggregate value: the comparison subset of the operator
/// grammar. Values keep their JSON typing (numbers stay numbers) so the
/// comparison works under either dialect's affinity rules.
fn parse_having_conds(value: &Json) -> Result<Vec<ScalarCond>> {
    let agg_value = |v: &Json| -> Result<Value> {
        if v.is_null() {
            return Err(invalid("null is not a valid aggregate comparison value"));
        }
        Ok(Value::from_json(v))
    };
    match value {
        Json::Object(ops) => {
            let mut conds = Vec::new();
            for (op, operand) in ops {
                let cond = match op.as_str() {
                    "equals" => ScalarCond::Equals(agg_value(operand)?),
                    "not" => ScalarCond::NotEquals(agg_value(operand)?),
                    "in" => ScalarCond::In(
                        operand
                            .as_array()
                            .ok_or_else(|| invalid("`in` expects a list"))?
                            .iter()
                            .map(agg_value)
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    "notIn" => ScalarCond::NotIn(
                        operand
                            .as_array()
                            .ok_or_else(|| invalid("`notIn` expects a list"))?
                            .iter()
                            .map(agg_value)
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    "lt" => ScalarCond::Lt(agg_value(operand)?),
                    "lte" => ScalarCond::Lte(agg_value(operand)?),
                    "gt" => ScalarCond::Gt(agg_value(operand)?),
                    "gte" => ScalarCond::Gte(agg_value(operand)?),
                    other => {
                        return Err(invalid(format!(
                            "`{other}` is not valid in `having`"
                        )));
                    }
                };
                conds.push(cond);
            }
            Ok(conds)
        }
        other => Ok(vec![ScalarCond::Equals(agg_value(other)?)]),
    }
}

/// `findUnique` must pin down one row: the filter's top-level equality
/// conditions have to cover a declared unique key set.
fn check_unique_filter(model: &Model, filter: Option<&Filter>) -> Result<()> {
    let mut covered = Vec::new();
    fn collect(filter: &Filter, covered: &mut Vec<usize>) {
        match filter {
            Filter::And(items) => items.iter().for_each(|f| collect(f, covered)),
            Filter::Scalar {
                field,
                cond: ScalarCond::Equals(_),
            } => covered.push(*field),
            _ => {}
        }
    }
    if let Some(filter) = filter {
        collect(filter, &mut covered);
    }
    let satisfied = model
        .unique_keys
        .iter()
        .any(|set| !set.is_empty() && set.iter().all(|f| covered.contains(f)));
    if satisfied {
        Ok(())
    } else {
        Err(invalid(format!(
            "findUnique on `{}` requires equality conditions covering a unique key",
            model.name
        )))
    }
}
