//! Filter compiler for the flat key/value query surface.
//!
//! Callers pass a mapping of parameter names to string values. A key may
//! carry an operator suffix (`name_like`, `amount_gte`, `status_in`,
//! `issuedAt_between`); a bare key means case-insensitive substring match
//! on text fields and equality everywhere else. Values are coerced to the
//! most specific type that parses: timestamp, integer, float, then text.
//!
//! Keys that do not resolve to a known field are dropped and logged at
//! debug level rather than failing the request.

use crate::entity::{Entity, FieldKind, FieldValue};
use crate::identity::Timestamp;
use crate::predicate::Predicate;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Wire-level filter surface: parameter name to raw value.
pub type FilterParams = BTreeMap<String, String>;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Case-insensitive substring
    Like,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Member of a comma-separated set
    In,
    /// Inclusive two-value range
    Between,
}

/// Suffix table. Longer suffixes sharing a tail with shorter ones come
/// first so `_gte` is never read as `_gt`.
const SUFFIXES: [(&str, FilterOperator); 9] = [
    ("_between", FilterOperator::Between),
    ("_like", FilterOperator::Like),
    ("_gte", FilterOperator::Gte),
    ("_lte", FilterOperator::Lte),
    ("_eq", FilterOperator::Eq),
    ("_ne", FilterOperator::Ne),
    ("_gt", FilterOperator::Gt),
    ("_lt", FilterOperator::Lt),
    ("_in", FilterOperator::In),
];

impl FilterOperator {
    /// Split `key` into field name and operator when it ends in a known suffix.
    pub fn split_key(key: &str) -> Option<(&str, FilterOperator)> {
        SUFFIXES.iter().find_map(|(suffix, op)| {
            key.strip_suffix(suffix)
                .filter(|field| !field.is_empty())
                .map(|field| (field, *op))
        })
    }

    /// Operator used for a key without suffix.
    pub fn default_for(kind: FieldKind) -> FilterOperator {
        if kind.is_textual() {
            FilterOperator::Like
        } else {
            FilterOperator::Eq
        }
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// Coerced form of a raw filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Timestamp(Timestamp),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TypedValue {
    /// Coerce a raw value: timestamp, then integer, then float, then text.
    pub fn coerce(raw: &str) -> TypedValue {
        if let Some(ts) = parse_timestamp(raw) {
            return TypedValue::Timestamp(ts);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return TypedValue::Integer(n);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => TypedValue::Float(f),
            _ => TypedValue::Text(raw.to_string()),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A filter value in raw and coerced form.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    pub raw: String,
    pub typed: TypedValue,
}

impl FilterValue {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            raw: raw.to_string(),
            typed: TypedValue::coerce(raw),
        }
    }

    /// Compare a field value against this filter value. Text fields use the
    /// raw string; bool and uuid fields parse it; numeric fields compare
    /// across integer and float.
    pub fn compare_with(&self, field: &FieldValue) -> Option<Ordering> {
        match (field, &self.typed) {
            (FieldValue::Text(v), _) => Some(v.as_str().cmp(self.raw.as_str())),
            (FieldValue::Integer(v), TypedValue::Integer(n)) => Some(v.cmp(n)),
            (FieldValue::Integer(v), TypedValue::Float(f)) => (*v as f64).partial_cmp(f),
            (FieldValue::Float(v), TypedValue::Integer(n)) => v.partial_cmp(&(*n as f64)),
            (FieldValue::Float(v), TypedValue::Float(f)) => v.partial_cmp(f),
            (FieldValue::Timestamp(v), TypedValue::Timestamp(t)) => Some(v.cmp(t)),
            (FieldValue::Bool(v), _) => self
                .raw
                .to_ascii_lowercase()
                .parse::<bool>()
                .ok()
                .map(|b| v.cmp(&b)),
            (FieldValue::Uuid(v), _) => Uuid::parse_str(&self.raw).ok().map(|u| v.cmp(&u)),
            _ => None,
        }
    }
}

/// Right-hand side of a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(FilterValue),
    Set(Vec<FilterValue>),
    Range(FilterValue, FilterValue),
}

// ============================================================================
// CLAUSES
// ============================================================================

/// One compiled `(field, operator, value)` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub operator: FilterOperator,
    pub operand: Operand,
}

impl FilterClause {
    /// Evaluate against a field value. Unset fields never match, and
    /// neither do values of an incompatible kind.
    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        let Some(value) = value else {
            return false;
        };

        match (&self.operator, &self.operand) {
            (FilterOperator::Like, Operand::Single(v)) => value
                .to_string()
                .to_lowercase()
                .contains(&v.raw.to_lowercase()),
            (FilterOperator::In, Operand::Set(values)) => values
                .iter()
                .any(|v| v.compare_with(value) == Some(Ordering::Equal)),
            (FilterOperator::Between, Operand::Range(low, high)) => {
                matches!(
                    low.compare_with(value),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    high.compare_with(value),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            (op, Operand::Single(v)) => {
                // compare_with orders the field against the filter value
                let Some(ord) = v.compare_with(value) else {
                    return false;
                };
                match op {
                    FilterOperator::Eq => ord == Ordering::Equal,
                    FilterOperator::Ne => ord != Ordering::Equal,
                    FilterOperator::Gt => ord == Ordering::Greater,
                    FilterOperator::Gte => ord != Ordering::Less,
                    FilterOperator::Lt => ord == Ordering::Less,
                    FilterOperator::Lte => ord != Ordering::Greater,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

// ============================================================================
// COMPILER
// ============================================================================

/// Compile caller filters into clauses for entity type `E`.
pub fn compile_clauses<E: Entity>(params: &FilterParams) -> Vec<FilterClause> {
    let mut clauses = Vec::with_capacity(params.len());

    for (key, value) in params {
        if value.trim().is_empty() {
            continue;
        }

        let (field, operator) = match FilterOperator::split_key(key) {
            Some((field, op)) if E::resolve_kind(field).is_some() => (field, Some(op)),
            _ => (key.as_str(), None),
        };

        let Some(kind) = E::resolve_kind(field) else {
            tracing::debug!(entity = E::entity_name(), key = %key, "Dropping filter on unknown field");
            continue;
        };
        if !E::DESCRIPTOR.is_searchable(field) {
            tracing::debug!(entity = E::entity_name(), field = %field, "Dropping filter on non-searchable field");
            continue;
        }

        let operator = operator.unwrap_or_else(|| FilterOperator::default_for(kind));
        let operand = match operator {
            FilterOperator::In => {
                let values: Vec<FilterValue> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(FilterValue::parse)
                    .collect();
                if values.is_empty() {
                    continue;
                }
                Operand::Set(values)
            }
            FilterOperator::Between => {
                let bounds: Vec<&str> = value.split(',').map(str::trim).collect();
                match bounds.as_slice() {
                    [low, high] if !low.is_empty() && !high.is_empty() => {
                        Operand::Range(FilterValue::parse(low), FilterValue::parse(high))
                    }
                    _ => {
                        tracing::debug!(
                            entity = E::entity_name(),
                            key = %key,
                            "Dropping between filter without exactly two bounds"
                        );
                        continue;
                    }
                }
            }
            _ => Operand::Single(FilterValue::parse(value)),
        };

        clauses.push(FilterClause {
            field: field.to_string(),
            operator,
            operand,
        });
    }

    clauses
}

/// Compile caller filters into an AND-ed predicate for entity type `E`.
pub fn compile<E: Entity>(params: &FilterParams) -> Predicate {
    Predicate::from_clauses(compile_clauses::<E>(params))
}
