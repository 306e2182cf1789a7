//! Filter, sort, and pagination parameters for recipe reads.
//!
//! These types only describe a query; [`crate::db::Database::query_recipes`]
//! runs it. Column names never come from caller input: sorting goes through the
//! [`SortField`] allow-list and filters bind their values as parameters.

use rusqlite::types::Value;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Rating,
    TotalTime,
    Title,
    Calories,
    Cuisine,
    Id,
}

impl SortField {
    /// Resolve a requested sort key. Unknown keys fall back to rating.
    #[must_use]
    pub fn from_param(name: &str) -> Self {
        match name {
            "total_time" => Self::TotalTime,
            "title" => Self::Title,
            "calories" => Self::Calories,
            "cuisine" => Self::Cuisine,
            "id" => Self::Id,
            _ => Self::Rating,
        }
    }

    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Rating => "rating",
            Self::TotalTime => "total_time",
            Self::Title => "title",
            Self::Calories => "calories",
            Self::Cuisine => "cuisine",
            Self::Id => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Only a case-insensitive `asc` sorts ascending; anything else is descending.
    #[must_use]
    pub fn from_param(order: &str) -> Self {
        if order.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

impl Sort {
    #[must_use]
    pub fn from_params(sort_by: Option<&str>, order: Option<&str>) -> Self {
        Self {
            field: sort_by.map(SortField::from_param).unwrap_or_default(),
            order: order.map(SortOrder::from_param).unwrap_or_default(),
        }
    }

    pub(crate) fn order_by_sql(self) -> String {
        let column = self.field.column();
        let direction = self.order.keyword();
        // Equal keys page in id order so windows don't overlap between requests
        if self.field == SortField::Id {
            format!("{column} {direction}")
        } else {
            format!("{column} {direction}, id ASC")
        }
    }
}

/// A validated 1-indexed pagination window.
///
/// Construct through [`crate::models::validate_page_request`] for caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    #[must_use]
    pub fn offset(self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

/// Conjunctive search predicates. `None` (or an empty string) disables a predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub title: Option<String>,
    pub cuisine: Option<String>,
    pub min_rating: Option<f64>,
    pub max_total_time: Option<i64>,
    pub min_calories: Option<i64>,
    pub max_calories: Option<i64>,
}

impl RecipeFilter {
    /// Render the `WHERE` clause (with a leading space, or empty) and its bound values.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&'static str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(title) = non_empty(self.title.as_deref()) {
            clauses.push("title LIKE ? ESCAPE '\\'");
            params.push(Value::Text(like_pattern(title)));
        }
        if let Some(cuisine) = non_empty(self.cuisine.as_deref()) {
            clauses.push("cuisine LIKE ? ESCAPE '\\'");
            params.push(Value::Text(like_pattern(cuisine)));
        }
        if let Some(min_rating) = self.min_rating {
            clauses.push("rating >= ?");
            params.push(Value::Real(min_rating));
        }
        if let Some(max_total_time) = self.max_total_time {
            clauses.push("total_time <= ?");
            params.push(Value::Integer(max_total_time));
        }
        if let Some(min_calories) = self.min_calories {
            clauses.push("calories >= ?");
            params.push(Value::Integer(min_calories));
        }
        if let Some(max_calories) = self.max_calories {
            clauses.push("calories <= ?");
            params.push(Value::Integer(max_calories));
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Case-insensitive substring pattern with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
