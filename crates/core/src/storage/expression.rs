//! Typed condition, update and key-condition expressions.
//!
//! Repositories describe conditional writes and queries with these types
//! instead of raw expression strings. Each backend then either renders them
//! ([`ExpressionBuilder`], used by DynamoDB) or evaluates them in process
//! ([`Condition::evaluate`], [`Update::apply`], [`SortCondition::matches`],
//! used by the in-memory store). Both paths share these definitions, so the
//! fake and the real store cannot drift apart on what a condition means.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::error::{RepositoryError, Result};
use super::types::{Index, Item, ATTR_PK, ATTR_SK};

// ============================================================================
// Attribute paths
// ============================================================================

/// A document path into an item, e.g. `dat.st`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPath(Vec<String>);

impl AttrPath {
    /// Parses a dotted path. Attribute names never contain dots in this schema.
    pub fn new(path: &str) -> Self {
        Self(path.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Resolves the path against an item.
    pub fn resolve<'a>(&self, item: &'a Item) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = item.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns the map that holds the last segment, if every parent exists.
    fn parent_mut<'a>(&self, item: &'a mut Item) -> Option<&'a mut Item> {
        let (_, parents) = self.0.split_last()?;
        let mut current = item;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        Some(current)
    }

    fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl From<&str> for AttrPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl std::fmt::Display for AttrPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Predicate over the current state of an item.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(AttrPath),
    NotExists(AttrPath),
    Eq(AttrPath, Value),
    Ne(AttrPath, Value),
    Lt(AttrPath, Value),
    Le(AttrPath, Value),
    Gt(AttrPath, Value),
    Ge(AttrPath, Value),
    BeginsWith(AttrPath, String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn exists(path: impl Into<AttrPath>) -> Self {
        Condition::Exists(path.into())
    }

    pub fn not_exists(path: impl Into<AttrPath>) -> Self {
        Condition::NotExists(path.into())
    }

    pub fn eq(path: impl Into<AttrPath>, value: impl Into<Value>) -> Self {
        Condition::Eq(path.into(), value.into())
    }

    pub fn ne(path: impl Into<AttrPath>, value: impl Into<Value>) -> Self {
        Condition::Ne(path.into(), value.into())
    }

    pub fn lt(path: impl Into<AttrPath>, value: impl Into<Value>) -> Self {
        Condition::Lt(path.into(), value.into())
    }

    pub fn gt(path: impl Into<AttrPath>, value: impl Into<Value>) -> Self {
        Condition::Gt(path.into(), value.into())
    }

    pub fn begins_with(path: impl Into<AttrPath>, prefix: impl Into<String>) -> Self {
        Condition::BeginsWith(path.into(), prefix.into())
    }

    /// Conjunction with another condition, flattening nested `And`s.
    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut all) => {
                all.push(other);
                Condition::And(all)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    /// The item exists (used for "update only if present").
    pub fn item_exists() -> Self {
        Condition::exists(ATTR_PK)
    }

    /// The item does not exist (used for "create only once").
    pub fn item_not_exists() -> Self {
        Condition::not_exists(ATTR_PK)
    }

    /// Evaluates the condition. A missing item is represented by an empty map.
    pub fn evaluate(&self, item: &Item) -> bool {
        match self {
            Condition::Exists(path) => path.resolve(item).is_some(),
            Condition::NotExists(path) => path.resolve(item).is_none(),
            Condition::Eq(path, expected) => {
                compare(path.resolve(item), expected) == Some(Ordering::Equal)
            }
            Condition::Ne(path, expected) => {
                compare(path.resolve(item), expected) != Some(Ordering::Equal)
            }
            Condition::Lt(path, bound) => {
                compare(path.resolve(item), bound) == Some(Ordering::Less)
            }
            Condition::Le(path, bound) => matches!(
                compare(path.resolve(item), bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::Gt(path, bound) => {
                compare(path.resolve(item), bound) == Some(Ordering::Greater)
            }
            Condition::Ge(path, bound) => matches!(
                compare(path.resolve(item), bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::BeginsWith(path, prefix) => path
                .resolve(item)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Condition::And(all) => all.iter().all(|c| c.evaluate(item)),
            Condition::Or(any) => any.iter().any(|c| c.evaluate(item)),
            Condition::Not(inner) => !inner.evaluate(item),
        }
    }
}

/// Orders two scalar values the way the store does: numbers numerically,
/// strings lexicographically by bytes. Mismatched types are incomparable,
/// except that structurally equal values compare equal.
fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let actual = actual?;
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

// ============================================================================
// Updates
// ============================================================================

/// A single clause of an update expression.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// `SET path = value`; a `null` value removes the attribute instead.
    Set(AttrPath, Value),
    /// `SET path = if_not_exists(path, value)`.
    SetIfNotExists(AttrPath, Value),
    /// `SET path = if_not_exists(path, 0) + delta`.
    Increment(AttrPath, i64),
    /// `REMOVE path`.
    Remove(AttrPath),
}

/// An update: ordered actions plus an optional guard condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub actions: Vec<UpdateAction>,
    pub condition: Option<Condition>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<AttrPath>, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Set(path.into(), value.into()));
        self
    }

    pub fn set_if_not_exists(mut self, path: impl Into<AttrPath>, value: impl Into<Value>) -> Self {
        self.actions
            .push(UpdateAction::SetIfNotExists(path.into(), value.into()));
        self
    }

    pub fn increment(mut self, path: impl Into<AttrPath>, delta: i64) -> Self {
        self.actions.push(UpdateAction::Increment(path.into(), delta));
        self
    }

    pub fn remove(mut self, path: impl Into<AttrPath>) -> Self {
        self.actions.push(UpdateAction::Remove(path.into()));
        self
    }

    /// Guards the update with a condition, combining with any existing guard.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// False if applying the update twice differs from applying it once.
    pub fn is_idempotent(&self) -> bool {
        !self
            .actions
            .iter()
            .any(|action| matches!(action, UpdateAction::Increment(..)))
    }

    /// Applies the actions to an item in place.
    ///
    /// Fails like the store does when a nested path has no parent map or an
    /// increment targets a non-numeric attribute.
    pub fn apply(&self, item: &mut Item) -> Result<()> {
        for action in &self.actions {
            match action {
                UpdateAction::Set(path, Value::Null) | UpdateAction::Remove(path) => {
                    if let Some(parent) = path.parent_mut(item) {
                        parent.remove(path.leaf());
                    }
                }
                UpdateAction::Set(path, value) => {
                    parent_for_write(path, item)?.insert(path.leaf().to_string(), value.clone());
                }
                UpdateAction::SetIfNotExists(path, value) => {
                    let parent = parent_for_write(path, item)?;
                    if !parent.contains_key(path.leaf()) {
                        parent.insert(path.leaf().to_string(), value.clone());
                    }
                }
                UpdateAction::Increment(path, delta) => {
                    let parent = parent_for_write(path, item)?;
                    let next = match parent.get(path.leaf()) {
                        None => Value::from(*delta),
                        Some(Value::Number(n)) => match n.as_i64() {
                            Some(current) => match current.checked_add(*delta) {
                                Some(next) => Value::from(next),
                                None => {
                                    return Err(RepositoryError::invalid_data(format!(
                                        "Increment of {} overflows",
                                        path
                                    )))
                                }
                            },
                            None => Value::from(n.as_f64().unwrap_or_default() + *delta as f64),
                        },
                        Some(_) => {
                            return Err(RepositoryError::invalid_data(format!(
                                "Cannot increment non-numeric attribute {}",
                                path
                            )))
                        }
                    };
                    parent.insert(path.leaf().to_string(), next);
                }
            }
        }
        Ok(())
    }
}

fn parent_for_write<'a>(path: &AttrPath, item: &'a mut Item) -> Result<&'a mut Item> {
    path.parent_mut(item).ok_or_else(|| {
        RepositoryError::invalid_data(format!(
            "The document path provided in the update expression is invalid: {}",
            path
        ))
    })
}

// ============================================================================
// Queries
// ============================================================================

/// Condition on the sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    Eq(String),
    BeginsWith(String),
    Between(String, String),
    Lt(String),
    Le(String),
    Gt(String),
    Ge(String),
}

impl SortCondition {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            SortCondition::Eq(v) => value == v,
            SortCondition::BeginsWith(prefix) => value.starts_with(prefix.as_str()),
            SortCondition::Between(low, high) => value >= low.as_str() && value <= high.as_str(),
            SortCondition::Lt(v) => value < v.as_str(),
            SortCondition::Le(v) => value <= v.as_str(),
            SortCondition::Gt(v) => value > v.as_str(),
            SortCondition::Ge(v) => value >= v.as_str(),
        }
    }
}

/// A key-condition query against the table or one of its indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub index: Option<Index>,
    pub partition: String,
    pub sort: Option<SortCondition>,
    /// Applied after the key condition narrows the candidates.
    pub filter: Option<Condition>,
    /// Maximum number of items returned after filtering.
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl Query {
    /// Queries a single partition of the base table, ascending by sort key.
    pub fn partition(pk: impl Into<String>) -> Self {
        Self {
            index: None,
            partition: pk.into(),
            sort: None,
            filter: None,
            limit: None,
            ascending: true,
        }
    }

    pub fn on_index(mut self, index: Index) -> Self {
        self.index = Some(index);
        self
    }

    pub fn sort(mut self, condition: SortCondition) -> Self {
        self.sort = Some(condition);
        self
    }

    pub fn sort_begins_with(self, prefix: impl Into<String>) -> Self {
        self.sort(SortCondition::BeginsWith(prefix.into()))
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Partition and sort attribute names for the queried table or index.
    pub fn key_attrs(&self) -> (&'static str, &'static str) {
        match self.index {
            Some(index) => (index.partition_attr(), index.sort_attr()),
            None => (ATTR_PK, ATTR_SK),
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Renders typed expressions into store syntax with placeholder maps.
///
/// One builder is used per request so that placeholders are shared between the
/// key condition, filter, update and condition expressions of that request, and
/// only placeholders that are actually referenced are emitted.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    names: HashMap<String, String>,
    values: HashMap<String, Value>,
    name_placeholders: HashMap<String, String>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn name(&mut self, attribute: &str) -> String {
        if let Some(existing) = self.name_placeholders.get(attribute) {
            return existing.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names
            .insert(placeholder.clone(), attribute.to_string());
        self.name_placeholders
            .insert(attribute.to_string(), placeholder.clone());
        placeholder
    }

    fn path(&mut self, path: &AttrPath) -> String {
        path.segments()
            .iter()
            .map(|segment| self.name(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn value(&mut self, value: Value) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Renders a condition or filter expression.
    pub fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Exists(path) => format!("attribute_exists({})", self.path(path)),
            Condition::NotExists(path) => format!("attribute_not_exists({})", self.path(path)),
            Condition::Eq(path, v) => self.comparison(path, "=", v),
            Condition::Ne(path, v) => self.comparison(path, "<>", v),
            Condition::Lt(path, v) => self.comparison(path, "<", v),
            Condition::Le(path, v) => self.comparison(path, "<=", v),
            Condition::Gt(path, v) => self.comparison(path, ">", v),
            Condition::Ge(path, v) => self.comparison(path, ">=", v),
            Condition::BeginsWith(path, prefix) => {
                let p = self.path(path);
                let v = self.value(Value::String(prefix.clone()));
                format!("begins_with({}, {})", p, v)
            }
            Condition::And(all) => self.join(all, " AND "),
            Condition::Or(any) => self.join(any, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)),
        }
    }

    fn comparison(&mut self, path: &AttrPath, op: &str, value: &Value) -> String {
        let p = self.path(path);
        let v = self.value(value.clone());
        format!("{} {} {}", p, op, v)
    }

    fn join(&mut self, conditions: &[Condition], separator: &str) -> String {
        conditions
            .iter()
            .map(|c| format!("({})", self.condition(c)))
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Renders the `SET ... REMOVE ...` update expression.
    pub fn update(&mut self, update: &Update) -> String {
        let mut set = Vec::new();
        let mut remove = Vec::new();
        for action in &update.actions {
            match action {
                UpdateAction::Set(path, Value::Null) | UpdateAction::Remove(path) => {
                    remove.push(self.path(path));
                }
                UpdateAction::Set(path, value) => {
                    let p = self.path(path);
                    let v = self.value(value.clone());
                    set.push(format!("{} = {}", p, v));
                }
                UpdateAction::SetIfNotExists(path, value) => {
                    let p = self.path(path);
                    let v = self.value(value.clone());
                    set.push(format!("{} = if_not_exists({}, {})", p, p, v));
                }
                UpdateAction::Increment(path, delta) => {
                    let p = self.path(path);
                    let zero = self.value(Value::from(0));
                    let d = self.value(Value::from(*delta));
                    set.push(format!("{} = if_not_exists({}, {}) + {}", p, p, zero, d));
                }
            }
        }

        let mut clauses = Vec::new();
        if !set.is_empty() {
            clauses.push(format!("SET {}", set.join(", ")));
        }
        if !remove.is_empty() {
            clauses.push(format!("REMOVE {}", remove.join(", ")));
        }
        clauses.join(" ")
    }

    /// Renders the key condition of a query.
    pub fn key_condition(&mut self, query: &Query) -> String {
        let (pk_attr, sk_attr) = query.key_attrs();
        let pk = self.name(pk_attr);
        let pk_value = self.value(Value::String(query.partition.clone()));
        let mut expression = format!("{} = {}", pk, pk_value);

        if let Some(sort) = &query.sort {
            let sk = self.name(sk_attr);
            let clause = match sort {
                SortCondition::Eq(v) => format!("{} = {}", sk, self.string(v)),
                SortCondition::BeginsWith(v) => format!("begins_with({}, {})", sk, self.string(v)),
                SortCondition::Between(low, high) => {
                    let low = self.string(low);
                    let high = self.string(high);
                    format!("{} BETWEEN {} AND {}", sk, low, high)
                }
                SortCondition::Lt(v) => format!("{} < {}", sk, self.string(v)),
                SortCondition::Le(v) => format!("{} <= {}", sk, self.string(v)),
                SortCondition::Gt(v) => format!("{} > {}", sk, self.string(v)),
                SortCondition::Ge(v) => format!("{} >= {}", sk, self.string(v)),
            };
            expression.push_str(" AND ");
            expression.push_str(&clause);
        }

        expression
    }

    fn string(&mut self, value: &str) -> String {
        self.value(Value::String(value.to_string()))
    }

    /// Consumes the builder, returning the name and value placeholder maps.
    pub fn finish(self) -> (HashMap<String, String>, HashMap<String, Value>) {
        (self.names, self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_condition_eq_on_nested_path() {
        let job = item(json!({"PK": "EXTRACTIONJOB#1", "dat": {"st": "PENDING"}}));
        assert!(Condition::eq("dat.st", "PENDING").evaluate(&job));
        assert!(!Condition::eq("dat.st", "PROCESSING").evaluate(&job));
    }

    #[test]
    fn test_condition_on_missing_item() {
        let empty = Item::new();
        assert!(Condition::item_not_exists().evaluate(&empty));
        assert!(!Condition::item_exists().evaluate(&empty));
        assert!(!Condition::eq("dat.st", "PENDING").evaluate(&empty));
    }

    #[test]
    fn test_numeric_comparison() {
        let job = item(json!({"upd": 100}));
        assert!(Condition::lt("upd", 101).evaluate(&job));
        assert!(!Condition::lt("upd", 100).evaluate(&job));
        assert!(Condition::gt("upd", 99.5).evaluate(&job));
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let job = item(json!({"upd": "100"}));
        assert!(!Condition::lt("upd", 200).evaluate(&job));
    }

    #[test]
    fn test_and_flattens() {
        let condition = Condition::exists("PK")
            .and(Condition::eq("tp", "job"))
            .and(Condition::lt("upd", 5));
        match &condition {
            Condition::And(all) => assert_eq!(all.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        let job = item(json!({"PK": "x", "tp": "job", "upd": 1}));
        assert!(condition.evaluate(&job));
    }

    #[test]
    fn test_update_apply_set_and_remove() {
        let mut job = item(json!({"dat": {"st": "PENDING", "wk": "w1"}, "upd": 1}));
        Update::new()
            .set("dat.st", "PROCESSING")
            .set("dat.wk", Value::Null)
            .set("upd", 2)
            .apply(&mut job)
            .unwrap();
        assert_eq!(job, item(json!({"dat": {"st": "PROCESSING"}, "upd": 2})));
    }

    #[test]
    fn test_update_apply_increment_creates_attribute() {
        let mut counter = Item::new();
        let update = Update::new().increment("val", 1);
        update.apply(&mut counter).unwrap();
        update.apply(&mut counter).unwrap();
        assert_eq!(counter.get("val"), Some(&json!(2)));
    }

    #[test]
    fn test_update_apply_increment_overflow_fails() {
        let mut counter = item(json!({"val": i64::MAX}));
        let result = Update::new().increment("val", 1).apply(&mut counter);
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
        assert_eq!(counter["val"], json!(i64::MAX));
    }

    #[test]
    fn test_increments_are_not_idempotent() {
        assert!(Update::new().set("a", 1).remove("b").is_idempotent());
        assert!(!Update::new().set("a", 1).increment("val", 1).is_idempotent());
    }

    #[test]
    fn test_update_apply_set_if_not_exists() {
        let mut item = item(json!({"crt": 10}));
        Update::new()
            .set_if_not_exists("crt", 20)
            .set_if_not_exists("upd", 20)
            .apply(&mut item)
            .unwrap();
        assert_eq!(item.get("crt"), Some(&json!(10)));
        assert_eq!(item.get("upd"), Some(&json!(20)));
    }

    #[test]
    fn test_update_apply_missing_parent_fails() {
        let mut item = Item::new();
        let result = Update::new().set("dat.st", "PENDING").apply(&mut item);
        assert!(matches!(result, Err(RepositoryError::InvalidData(_))));
    }

    #[test]
    fn test_sort_condition_matches() {
        assert!(SortCondition::BeginsWith("TC#".into()).matches("TC#12"));
        assert!(!SortCondition::BeginsWith("TC#".into()).matches("META"));
        assert!(SortCondition::Between("a".into(), "c".into()).matches("b"));
        assert!(SortCondition::Lt("b".into()).matches("a"));
    }

    #[test]
    fn test_render_claim_update() {
        let update = Update::new()
            .set("dat.st", "PROCESSING")
            .set("GSI1PK", "EXTRACTIONJOB#STATUS#PROCESSING")
            .when(Condition::eq("dat.st", "PENDING"));

        let mut builder = ExpressionBuilder::new();
        let update_expr = builder.update(&update);
        let condition_expr = builder.condition(update.condition.as_ref().unwrap());
        let (names, values) = builder.finish();

        assert_eq!(update_expr, "SET #n0.#n1 = :v0, #n2 = :v1");
        assert_eq!(condition_expr, "#n0.#n1 = :v2");
        assert_eq!(names.get("#n0").unwrap(), "dat");
        assert_eq!(names.get("#n1").unwrap(), "st");
        assert_eq!(names.get("#n2").unwrap(), "GSI1PK");
        assert_eq!(values.get(":v2").unwrap(), &json!("PENDING"));
    }

    #[test]
    fn test_render_increment_and_remove() {
        let update = Update::new().increment("val", 1).remove("legacy");
        let mut builder = ExpressionBuilder::new();
        let expr = builder.update(&update);
        let (names, values) = builder.finish();

        assert_eq!(expr, "SET #n0 = if_not_exists(#n0, :v0) + :v1 REMOVE #n1");
        assert_eq!(names.len(), 2);
        assert_eq!(values.get(":v0").unwrap(), &json!(0));
        assert_eq!(values.get(":v1").unwrap(), &json!(1));
    }

    #[test]
    fn test_render_null_set_becomes_remove() {
        let mut builder = ExpressionBuilder::new();
        let expr = builder.update(&Update::new().set("dat.err", Value::Null));
        assert_eq!(expr, "REMOVE #n0.#n1");
        let (_, values) = builder.finish();
        assert!(values.is_empty());
    }

    #[test]
    fn test_render_key_condition_on_index() {
        let query = Query::partition("EXTRACTIONJOB#STATUS#PROCESSING")
            .on_index(Index::Gsi1)
            .sort_begins_with("0000")
            .descending();
        let mut builder = ExpressionBuilder::new();
        let expr = builder.key_condition(&query);
        let (names, _) = builder.finish();

        assert_eq!(expr, "#n0 = :v0 AND begins_with(#n1, :v1)");
        assert_eq!(names.get("#n0").unwrap(), "GSI1PK");
        assert_eq!(names.get("#n1").unwrap(), "GSI1SK");
        assert!(!query.ascending);
    }

    #[test]
    fn test_render_composite_condition() {
        let condition = Condition::Or(vec![
            Condition::item_not_exists(),
            Condition::Not(Box::new(Condition::eq("tp", "counter"))),
        ]);
        let mut builder = ExpressionBuilder::new();
        assert_eq!(
            builder.condition(&condition),
            "(attribute_not_exists(#n0)) OR (NOT (#n1 = :v0))"
        );
    }
}
