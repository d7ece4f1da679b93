//! List query compilation.
//!
//! Turns raw list parameters into a store-agnostic [`Query`]:
//! an AND of clauses, an optional sort key, an optional keyset cursor and an
//! optional page size. Every collection endpoint goes through [`compile`];
//! stores consume the result without re-reading the request.

use std::collections::BTreeMap;

use thiserror::Error;

pub const SORT_BY: &str = "sortBy";
pub const LAST_VALUE: &str = "lastValue";
pub const COUNT: &str = "count";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("sortBy must name a field")]
    EmptySortField,

    #[error("count must be an integer, got '{0}'")]
    InvalidCount(String),
}

/// Raw list parameters, grouped by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    /// field → values; repeated keys accumulate.
    pub filters: BTreeMap<String, Vec<String>>,
    pub sort_by: Option<String>,
    pub last_value: Option<String>,
    pub count: Option<String>,
}

impl ListParams {
    /// Group decoded query-string pairs. The reserved keys `sortBy`,
    /// `lastValue` and `count` are pulled out (last occurrence wins); every
    /// other key becomes a filter field.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            match key.as_str() {
                SORT_BY => params.sort_by = Some(value),
                LAST_VALUE => params.last_value = Some(value),
                COUNT => params.count = Some(value),
                _ => params.filters.entry(key).or_default().push(value),
            }
        }
        params
    }
}

/// Boundary value of a keyset cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CursorValue {
    /// Numeric interpretation first, string as fallback.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return CursorValue::Integer(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => CursorValue::Float(f),
            _ => CursorValue::Text(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `field == value`
    Equals { field: String, value: String },
    /// `field == v1 OR field == v2 ...`
    AnyOf { field: String, values: Vec<String> },
    /// `field > value`
    After { field: String, value: CursorValue },
    /// `field < value`
    Before { field: String, value: CursorValue },
}

/// Conjunction of clauses. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<Clause>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    /// Parse `field` or `field:direction`. Unknown or missing directions
    /// fall back to ascending.
    pub fn parse(spec: &str) -> Result<Option<Self>, QueryError> {
        if spec.is_empty() {
            return Ok(None);
        }
        let (field, direction) = match spec.split_once(':') {
            Some((field, direction)) => (field, direction),
            None => (spec, ""),
        };
        let field = field.trim();
        if field.is_empty() {
            return Err(QueryError::EmptySortField);
        }
        Ok(Some(Sort {
            field: field.to_string(),
            descending: direction.trim().eq_ignore_ascii_case("desc"),
        }))
    }
}

/// Compiled list query handed to a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<Sort>,
    /// `None` means no page size limit.
    pub limit: Option<usize>,
}

pub fn compile(params: &ListParams) -> Result<Query, QueryError> {
    let mut clauses: Vec<Clause> = params
        .filters
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| {
            if values.len() == 1 {
                Clause::Equals {
                    field: field.clone(),
                    value: values[0].clone(),
                }
            } else {
                Clause::AnyOf {
                    field: field.clone(),
                    values: values.clone(),
                }
            }
        })
        .collect();

    let sort = match params.sort_by.as_deref() {
        Some(spec) => Sort::parse(spec)?,
        None => None,
    };

    if let (Some(sort), Some(last)) = (&sort, params.last_value.as_deref()) {
        if !last.is_empty() {
            let field = sort.field.clone();
            let value = CursorValue::parse(last);
            clauses.push(if sort.descending {
                Clause::Before { field, value }
            } else {
                Clause::After { field, value }
            });
        }
    }

    let limit = match params.count.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let n: i64 = raw
                .parse()
                .map_err(|_| QueryError::InvalidCount(raw.to_string()))?;
            if n > 0 {
                Some(n as usize)
            } else {
                None
            }
        }
    };

    Ok(Query {
        filter: Filter { clauses },
        sort,
        limit,
    })
}
