//! Offering list predicate and ordering builder.
//!
//! Turns a flat set of optional listing parameters into a SQL `WHERE`
//! clause, its bound values and an `ORDER BY`.  Building a query has no side
//! effects and never fails: absent or blank parameters add no constraint.
//!
//! Search compares through the `fold_case` SQL function that
//! [`Database`](crate::Database) registers on every connection, so the match
//! ignores case for any script, not only ASCII.

use rusqlite::types::Value;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tutorhub_shared::{OfferingStatus, SortOrder};

/// Name of the Unicode lower-casing SQL function used by search.
pub const FOLD_CASE_FN: &str = "fold_case";

/// Lower-case `text` the same way `fold_case` does inside SQLite.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Listing parameters.  Absent fields serialize as explicit `null`, which
/// keeps the cache key of "no filter" distinct from any real filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OfferingFilters {
    pub search: Option<String>,
    pub status: Option<OfferingStatus>,
    pub min_budget: Option<Decimal>,
    pub max_budget: Option<Decimal>,
    pub sort: Option<SortOrder>,
}

/// A built offering query: predicate fragments, their parameters, ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferingQuery {
    clauses: Vec<&'static str>,
    params: Vec<Value>,
    order_by: &'static str,
}

impl OfferingQuery {
    pub fn build(filters: &OfferingFilters) -> Self {
        // Soft-deleted rows never show up in a listing.
        let mut clauses = vec!["deleted_at IS NULL"];
        let mut params = Vec::new();

        if let Some(search) = filters.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                let needle = fold_case(search);
                clauses.push(
                    "(instr(fold_case(title), ?) > 0 OR instr(fold_case(description), ?) > 0)",
                );
                params.push(Value::Text(needle.clone()));
                params.push(Value::Text(needle));
            }
        }

        if let Some(status) = filters.status {
            clauses.push("status = ?");
            params.push(Value::Text(status.as_str().to_string()));
        }

        if let Some(min) = filters.min_budget {
            clauses.push("budget_cents >= ?");
            params.push(Value::Integer(min_cents(min)));
        }

        if let Some(max) = filters.max_budget {
            clauses.push("budget_cents <= ?");
            params.push(Value::Integer(max_cents(max)));
        }

        Self {
            clauses,
            params,
            order_by: order_by(filters.sort.unwrap_or_default()),
        }
    }

    pub fn where_sql(&self) -> String {
        self.clauses.join(" AND ")
    }

    pub fn order_sql(&self) -> &'static str {
        self.order_by
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

fn order_by(sort: SortOrder) -> &'static str {
    // rowid breaks ties in insertion order, same direction as the key.
    match sort {
        SortOrder::Latest => "created_at DESC, rowid DESC",
        SortOrder::Oldest => "created_at ASC, rowid ASC",
        SortOrder::BudgetHigh => "budget_cents DESC, rowid DESC",
        SortOrder::BudgetLow => "budget_cents ASC, rowid ASC",
        SortOrder::Deadline => "deadline ASC, rowid ASC",
    }
}

/// Smallest whole-cent budget that is `>= min`.
fn min_cents(min: Decimal) -> i64 {
    saturating_cents(min.checked_mul(Decimal::ONE_HUNDRED).map(|c| c.ceil()), min)
}

/// Largest whole-cent budget that is `<= max`.
fn max_cents(max: Decimal) -> i64 {
    saturating_cents(max.checked_mul(Decimal::ONE_HUNDRED).map(|c| c.floor()), max)
}

/// Bounds beyond the `i64` cents range saturate instead of dropping the
/// constraint.
fn saturating_cents(cents: Option<Decimal>, bound: Decimal) -> i64 {
    cents.and_then(|c| c.to_i64()).unwrap_or(if bound.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}
