// Search criteria: ordered filters and output columns, plus the implicit
// cursor bound that makes every search resumable.
use crate::core::record::{RecordId, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Is,
    IsNot,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// An output column; `join` names a reference field on the searched record
/// whose target record supplies the value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
}

impl Column {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            join: None,
        }
    }

    pub fn joined(field: impl Into<String>, join: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            join: Some(join.into()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }
}

/// The always-prepended resumability bound: `id > lower_bound`. The matching
/// ascending-id sort is part of the store's `search_page` contract.
pub fn cursor_bound(lower_bound: RecordId) -> Filter {
    Filter::new(ID_FIELD, FilterOp::GreaterThan, lower_bound)
}

/// Effective filter list for one page: the cursor bound ahead of the
/// caller's filters, preserving their order.
pub fn effective_filters(lower_bound: RecordId, filters: &[Filter]) -> Vec<Filter> {
    let mut effective = Vec::with_capacity(filters.len() + 1);
    effective.push(cursor_bound(lower_bound));
    effective.extend(filters.iter().cloned());
    effective
}
