//! 查询请求类型
//!
//! Backend-agnostic description of a filtered, ordered list read. The same
//! [`Filter`] type scopes push-channel subscriptions, so a filter can be
//! evaluated locally against a JSON row as well as rendered for a REST
//! backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::models::Collection;

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// column = value
    Eq,
    /// column ∈ value (value is a JSON array)
    In,
}

/// Single column predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            column: column.into(),
            op: FilterOp::In,
            value: Value::Array(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Evaluate against a JSON row. A missing column never matches.
    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::In => self
                .value
                .as_array()
                .is_some_and(|values| values.iter().any(|v| v == actual)),
        }
    }

    /// PostgREST-style operator expression (`eq.7`, `in.("a","b")`)
    pub fn to_rest_expr(&self) -> String {
        match self.op {
            FilterOp::Eq => format!("eq.{}", rest_scalar(&self.value)),
            FilterOp::In => {
                let items = self
                    .value
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .map(rest_list_item)
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .unwrap_or_default();
                format!("in.({})", items)
            }
        }
    }
}

fn rest_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn rest_list_item(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => rest_scalar(other),
    }
}

/// Returns true when every filter matches (empty slice matches everything)
pub fn matches_all(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|f| f.matches(row))
}

/// 排序字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Compare two rows on the sort column. Rows lacking the column sort last.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ord = match (a.get(&self.column), b.get(&self.column)) {
            (Some(x), Some(y)) => compare_json(x, y),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.descending { ord.reverse() } else { ord }
    }

    pub fn to_rest_expr(&self) -> String {
        format!(
            "{}.{}",
            self.column,
            if self.descending { "desc" } else { "asc" }
        )
    }
}

/// Total order over JSON scalars of the same kind; mixed kinds compare equal
fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
                (Some(x), Some(y), _, _) => x.cmp(&y),
                (_, _, Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .zip(y.as_f64())
                    .and_then(|(x, y)| x.partial_cmp(&y))
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// 查询请求 - 用于列表查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    /// 创建简单查询 (整个集合)
    pub fn all(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            sort: None,
            limit: None,
        }
    }

    /// 添加过滤条件
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// 添加排序
    pub fn order_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs for a PostgREST endpoint
    pub fn to_rest_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.column.clone(), f.to_rest_expr()))
            .collect();
        if let Some(sort) = &self.sort {
            params.push(("order".to_string(), sort.to_rest_expr()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Evaluate the query over an in-memory row set
    pub fn apply<'a, I>(&self, rows: I) -> Vec<Value>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut selected: Vec<Value> = rows
            .into_iter()
            .filter(|row| matches_all(&self.filters, row))
            .cloned()
            .collect();
        if let Some(sort) = &self.sort {
            // stable: ties keep insertion order
            selected.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}
