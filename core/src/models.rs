use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::{MAX_LIMIT, PageRequest, RecipeFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub cuisine: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub rating: Option<f64>,
    pub total_time: Option<i64>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub description: Option<String>,
    pub nutrients: Option<Map<String, Value>>,
    pub serves: Option<String>,
    pub calories: Option<i64>,
}

/// A normalized recipe ready to insert. `nutrients_json` is stored verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub cuisine: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub rating: Option<f64>,
    pub total_time: Option<i64>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub description: Option<String>,
    pub nutrients_json: Option<String>,
    pub serves: Option<String>,
    pub calories: Option<i64>,
}

/// One window of a recipe listing. `total` counts every match, not just this page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipePage {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub results: Vec<Recipe>,
}

/// Validate caller-supplied pagination, applying defaults for missing values.
pub fn validate_page_request(page: Option<i64>, limit: Option<i64>) -> Result<PageRequest> {
    let defaults = PageRequest::default();

    let page = match page {
        None => defaults.page,
        Some(p) if p >= 1 => match u32::try_from(p) {
            Ok(p) => p,
            Err(_) => bail!("page {p} is too large"),
        },
        Some(p) => bail!("page must be at least 1, got {p}"),
    };

    let limit = match limit {
        None => defaults.limit,
        Some(l) => match u32::try_from(l) {
            Ok(l) if (1..=MAX_LIMIT).contains(&l) => l,
            _ => bail!("limit must be between 1 and {MAX_LIMIT}, got {l}"),
        },
    };

    Ok(PageRequest { page, limit })
}

/// Reject out-of-domain numeric bounds before they reach the query engine.
pub fn validate_search_filter(filter: &RecipeFilter) -> Result<()> {
    if let Some(r) = filter.min_rating {
        if !(0.0..=5.0).contains(&r) {
            bail!("min_rating must be between 0 and 5, got {r}");
        }
    }
    if let Some(t) = filter.max_total_time {
        if t < 0 {
            bail!("max_total_time must not be negative, got {t}");
        }
    }
    if let Some(c) = filter.min_calories {
        if c < 0 {
            bail!("min_calories must not be negative, got {c}");
        }
    }
    if let Some(c) = filter.max_calories {
        if c < 0 {
            bail!("max_calories must not be negative, got {c}");
        }
    }
    Ok(())
}
