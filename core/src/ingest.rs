//! Append-only ingestion of raw recipe records.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::db::Database;
use crate::models::{NewRecipe, Recipe};
use crate::normalize::{
    RawRecord, RawValue, extract_calories, nullable_float, nullable_text, parse_integer,
};

/// Records inserted per transaction during a batch ingest.
pub const BATCH_SIZE: usize = 100;

/// Title stored when the source has none usable.
pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported JSON structure: expected an array or an object of records, found {found}")]
    UnsupportedShape { found: &'static str },
    #[error("invalid JSON document")]
    InvalidJson(#[from] serde_json::Error),
}

/// Outcome of a batch ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub records_seen: usize,
    pub inserted: usize,
}

/// Normalize one raw record into an insertable recipe.
#[must_use]
pub fn normalize_record(record: &RawRecord) -> NewRecipe {
    let field = |key: &str| record.get(key);
    let nutrients = field("nutrients").and_then(RawValue::as_map);

    NewRecipe {
        cuisine: nullable_text(field("cuisine")),
        title: resolve_title(field("title")),
        url: nullable_text(resolve_url(record)),
        rating: nullable_float(field("rating")),
        total_time: parse_integer(field("total_time")),
        prep_time: parse_integer(field("prep_time")),
        cook_time: parse_integer(field("cook_time")),
        description: nullable_text(field("description")),
        nutrients_json: nutrients.and_then(|map| serde_json::to_string(map).ok()),
        serves: nullable_text(field("serves")),
        calories: extract_calories(field("nutrients")),
    }
}

fn resolve_title(value: Option<&RawValue>) -> String {
    match value {
        Some(RawValue::Text(s)) if !s.is_empty() => s.clone(),
        Some(RawValue::Int(n)) => n.to_string(),
        _ => UNTITLED.to_string(),
    }
}

// `URL` wins whenever it is truthy, `NaN` included
fn resolve_url(record: &RawRecord) -> Option<&RawValue> {
    record
        .get("URL")
        .filter(|v| v.is_truthy())
        .or_else(|| record.get("url"))
}

fn insert_record(db: &Database, record: &RawRecord) -> Result<i64> {
    db.insert_recipe(&normalize_record(record))
}

/// Insert one raw record as a new row and return it.
pub fn ingest_record(db: &Database, record: &RawRecord) -> Result<Recipe> {
    let id = insert_record(db, record)?;
    db.get_recipe(id)?
        .with_context(|| format!("Recipe {id} missing right after insert"))
}

/// Parse a batch document into its ordered records.
///
/// Bare `NaN`, `Infinity` and `-Infinity` tokens are read as non-finite floats.
pub fn parse_document(text: &str) -> Result<Vec<RawValue>, IngestError> {
    let document = if let Some(marker) = non_finite_marker(text) {
        let marked = rewrite_non_finite(text, |token| {
            format!("\"\\u{:04x}{token}\"", u32::from(marker))
        });
        let mut document: RawValue = serde_json::from_str(&marked)?;
        if matches!(marked, Cow::Owned(_)) {
            restore_non_finite(&mut document, marker);
        }
        document
    } else {
        tracing::warn!("no free marker for non-finite tokens, reading them as null");
        serde_json::from_str(&rewrite_non_finite(text, |_| "null".to_string()))?
    };
    order_records(document)
}

/// Flatten a top-level array or keyed object into an ordered record sequence.
///
/// Object entries are ordered by key: all-digit keys numerically first, then the
/// rest lexically.
pub fn order_records(document: RawValue) -> Result<Vec<RawValue>, IngestError> {
    match document {
        RawValue::List(items) => Ok(items),
        RawValue::Map(map) => {
            let mut entries: Vec<(String, RawValue)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            Ok(entries.into_iter().map(|(_, v)| v).collect())
        }
        other => Err(IngestError::UnsupportedShape {
            found: other.kind(),
        }),
    }
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    let is_numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => {
            let a_digits = a.trim_start_matches('0');
            let b_digits = b.trim_start_matches('0');
            a_digits
                .len()
                .cmp(&b_digits.len())
                .then_with(|| a_digits.cmp(b_digits))
                .then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// Insert records in transactions of [`BATCH_SIZE`].
///
/// Entries that are not objects are skipped. A failure rolls back only the
/// batch in flight; earlier batches stay committed.
pub fn ingest_records(db: &Database, records: &[RawValue]) -> Result<IngestSummary> {
    let mut inserted = 0;

    for (batch_idx, batch) in records.chunks(BATCH_SIZE).enumerate() {
        let tx = db.begin()?;
        for (offset, record) in batch.iter().enumerate() {
            let Some(record) = record.as_map() else {
                tracing::warn!(
                    index = batch_idx * BATCH_SIZE + offset,
                    kind = record.kind(),
                    "skipping record that is not an object"
                );
                continue;
            };
            insert_record(db, record)?;
            inserted += 1;
        }
        tx.commit().context("Failed to commit ingest batch")?;
        tracing::debug!(batch = batch_idx + 1, inserted, "committed batch");
    }

    tracing::info!(records = records.len(), inserted, "ingest complete");
    Ok(IngestSummary {
        records_seen: records.len(),
        inserted,
    })
}

/// Load a batch document from disk and ingest it.
pub fn ingest_file(db: &Database, path: &Path) -> Result<IngestSummary> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let records =
        parse_document(&text).with_context(|| format!("Failed to load {}", path.display()))?;
    ingest_records(db, &records)
}

/// Pick a control character that no string literal in `text` can decode to.
///
/// JSON carries control characters only as `\u00XX` escapes, so a character
/// whose escape never occurs in the source is free.
fn non_finite_marker(text: &str) -> Option<char> {
    let lower = text.to_ascii_lowercase();
    (1u8..0x20)
        .map(char::from)
        .find(|c| !lower.contains(&format!("\\u{:04x}", u32::from(*c))))
}

fn restore_non_finite(value: &mut RawValue, marker: char) {
    match value {
        RawValue::Text(s) => {
            let restored = match s.strip_prefix(marker) {
                Some("NaN") => f64::NAN,
                Some("Infinity") => f64::INFINITY,
                Some("-Infinity") => f64::NEG_INFINITY,
                _ => return,
            };
            *value = RawValue::Float(restored);
        }
        RawValue::List(items) => items
            .iter_mut()
            .for_each(|v| restore_non_finite(v, marker)),
        RawValue::Map(map) => map
            .values_mut()
            .for_each(|v| restore_non_finite(v, marker)),
        _ => {}
    }
}

/// Replace bare `NaN`, `Infinity` and `-Infinity` outside string literals.
fn rewrite_non_finite(text: &str, replace: impl Fn(&str) -> String) -> Cow<'_, str> {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        if let Some(token) = TOKENS.iter().find(|t| bytes[i..].starts_with(t.as_bytes())) {
            out.push_str(&text[copied..i]);
            out.push_str(&replace(*token));
            i += token.len();
            copied = i;
            continue;
        }
        i += 1;
    }

    if copied == 0 {
        Cow::Borrowed(text)
    } else {
        out.push_str(&text[copied..]);
        Cow::Owned(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PageRequest, RecipeFilter, Sort, SortField, SortOrder};

    fn record(json: &str) -> RawRecord {
        match parse_document(&format!("[{json}]")).unwrap().remove(0) {
            RawValue::Map(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    const PIE: &str = r#"{
        "Contient": "North America",
        "Country_State": "US",
        "cuisine": "Southern Recipes",
        "title": "Sweet Potato Pie",
        "URL": "https://www.allrecipes.com/recipe/12142/sweet-potato-pie-i/",
        "rating": 4.8,
        "total_time": 115,
        "prep_time": 15,
        "cook_time": 100,
        "description": "Shared from a Southern recipe",
        "nutrients": {
            "calories": "389 kcal",
            "carbohydrateContent": "48 g",
            "fatContent": "21 g"
        },
        "serves": "8 servings"
    }"#;

    #[test]
    fn test_normalize_full_record() {
        let recipe = normalize_record(&record(PIE));
        assert_eq!(recipe.title, "Sweet Potato Pie");
        assert_eq!(recipe.cuisine.as_deref(), Some("Southern Recipes"));
        assert_eq!(
            recipe.url.as_deref(),
            Some("https://www.allrecipes.com/recipe/12142/sweet-potato-pie-i/")
        );
        assert_eq!(recipe.rating, Some(4.8));
        assert_eq!(recipe.total_time, Some(115));
        assert_eq!(recipe.prep_time, Some(15));
        assert_eq!(recipe.cook_time, Some(100));
        assert_eq!(recipe.serves.as_deref(), Some("8 servings"));
        assert_eq!(recipe.calories, Some(389));
        let stored: serde_json::Value =
            serde_json::from_str(recipe.nutrients_json.as_deref().unwrap()).unwrap();
        assert_eq!(stored["fatContent"], "21 g");
        assert_eq!(stored["carbohydrateContent"], "48 g");
    }

    #[test]
    fn test_normalize_nan_fields() {
        let recipe = normalize_record(&record(
            r#"{"title": NaN, "rating": NaN, "total_time": NaN, "cuisine": NaN, "nutrients": NaN}"#,
        ));
        assert_eq!(recipe.title, UNTITLED);
        assert_eq!(recipe.rating, None);
        assert_eq!(recipe.total_time, None);
        assert_eq!(recipe.cuisine, None);
        assert_eq!(recipe.nutrients_json, None);
        assert_eq!(recipe.calories, None);
    }

    #[test]
    fn test_float_title_becomes_untitled() {
        let mut raw = RawRecord::new();
        raw.insert("title".to_string(), RawValue::Float(f64::NAN));
        assert_eq!(normalize_record(&raw).title, UNTITLED);
        raw.insert("title".to_string(), RawValue::Float(3.5));
        assert_eq!(normalize_record(&raw).title, UNTITLED);
        raw.insert("title".to_string(), RawValue::Text(String::new()));
        assert_eq!(normalize_record(&raw).title, UNTITLED);
        raw.shift_remove("title");
        assert_eq!(normalize_record(&raw).title, UNTITLED);
    }

    #[test]
    fn test_string_times_and_missing_nutrients() {
        let recipe = normalize_record(&record(
            r#"{"title": "Chili", "total_time": "1,020 mins", "prep_time": "n/a", "cook_time": 45.9}"#,
        ));
        assert_eq!(recipe.total_time, Some(1020));
        assert_eq!(recipe.prep_time, None);
        assert_eq!(recipe.cook_time, Some(45));
        assert_eq!(recipe.nutrients_json, None);
        assert_eq!(recipe.calories, None);
    }

    #[test]
    fn test_non_map_nutrients_are_dropped() {
        let recipe = normalize_record(&record(r#"{"title": "Soup", "nutrients": "389 kcal"}"#));
        assert_eq!(recipe.nutrients_json, None);
        assert_eq!(recipe.calories, None);
    }

    #[test]
    fn test_nutrients_with_nan_values_store_null() {
        let recipe = normalize_record(&record(
            r#"{"title": "Soup", "nutrients": {"energy": "210 kcal", "fat": NaN}}"#,
        ));
        assert_eq!(recipe.calories, Some(210));
        assert_eq!(
            recipe.nutrients_json.as_deref(),
            Some(r#"{"energy":"210 kcal","fat":null}"#)
        );
    }

    #[test]
    fn test_url_key_casing() {
        let both = record(r#"{"URL": "https://upper", "url": "https://lower"}"#);
        assert_eq!(normalize_record(&both).url.as_deref(), Some("https://upper"));

        let lower = record(r#"{"url": "https://lower"}"#);
        assert_eq!(normalize_record(&lower).url.as_deref(), Some("https://lower"));

        let empty_upper = record(r#"{"URL": "", "url": "https://lower"}"#);
        assert_eq!(
            normalize_record(&empty_upper).url.as_deref(),
            Some("https://lower")
        );

        let null_upper = record(r#"{"URL": null, "url": "https://lower"}"#);
        assert_eq!(
            normalize_record(&null_upper).url.as_deref(),
            Some("https://lower")
        );

        let nan_upper = record(r#"{"URL": NaN, "url": "https://lower"}"#);
        assert_eq!(normalize_record(&nan_upper).url, None);
    }

    #[test]
    fn test_ingest_same_record_twice_creates_two_rows() {
        let db = Database::open_in_memory().unwrap();
        let raw = record(PIE);
        let first = ingest_record(&db, &raw).unwrap();
        let second = ingest_record(&db, &raw).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.title, second.title);
        assert_eq!(db.count_recipes().unwrap(), 2);
    }

    #[test]
    fn test_ingest_record_round_trips_nutrients() {
        let db = Database::open_in_memory().unwrap();
        let recipe = ingest_record(&db, &record(PIE)).unwrap();
        assert_eq!(recipe.calories, Some(389));
        assert_eq!(recipe.nutrients.unwrap()["calories"], "389 kcal");
    }

    #[test]
    fn test_parse_document_list() {
        let records = parse_document(r#"[{"title": "A"}, {"title": "B"}]"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_document_keyed_object_order() {
        let records =
            parse_document(r#"{"10": {"title": "ten"}, "2": {"title": "two"}, "b": {"title": "bee"}, "a": {"title": "ay"}, "0": {"title": "zero"}}"#)
                .unwrap();
        let titles: Vec<String> = records
            .iter()
            .map(|r| normalize_record(r.as_map().unwrap()).title)
            .collect();
        assert_eq!(titles, vec!["zero", "two", "ten", "ay", "bee"]);
    }

    #[test]
    fn test_parse_document_unsupported_shape() {
        for doc in ["42", r#""recipes""#, "null", "true"] {
            let err = parse_document(doc).unwrap_err();
            assert!(
                matches!(err, IngestError::UnsupportedShape { .. }),
                "{doc}: {err}"
            );
        }
        let err = parse_document("42").unwrap_err();
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_parse_document_invalid_json() {
        let err = parse_document("[{").unwrap_err();
        assert!(matches!(err, IngestError::InvalidJson(_)));
    }

    #[test]
    fn test_rewrite_non_finite_leaves_strings_alone() {
        let text = r#"{"title": "NaN Bread \"NaN\"", "rating": NaN, "t": -Infinity, "u": Infinity}"#;
        assert_eq!(
            rewrite_non_finite(text, |_| "null".to_string()),
            r#"{"title": "NaN Bread \"NaN\"", "rating": null, "t": null, "u": null}"#
        );
        assert!(matches!(
            rewrite_non_finite("[1, 2]", |_| "null".to_string()),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_parse_document_keeps_non_finite_floats() {
        let raw = record(
            r#"{"title": "NaN Bread", "rating": NaN, "t": -Infinity, "u": Infinity, "m": "\u0001NaN"}"#,
        );
        assert_eq!(raw["title"], RawValue::Text("NaN Bread".to_string()));
        assert!(raw["rating"].is_nan());
        assert_eq!(raw["t"], RawValue::Float(f64::NEG_INFINITY));
        assert_eq!(raw["u"], RawValue::Float(f64::INFINITY));
        assert_eq!(raw["m"], RawValue::Text("\u{1}NaN".to_string()));
    }

    #[test]
    fn test_non_finite_marker_avoids_escapes_in_source() {
        assert_eq!(non_finite_marker("[NaN]"), Some('\u{1}'));
        assert_eq!(non_finite_marker(r#"["\u0001", "\u0002"]"#), Some('\u{3}'));
        let every_escape: String = (1..0x20).map(|c| format!("\\u{c:04X}")).collect();
        assert_eq!(non_finite_marker(&every_escape), None);
    }

    #[test]
    fn test_loaded_nan_matches_in_memory_nan() {
        let loaded = record(
            r#"{"URL": NaN, "url": "https://lower", "nutrients": {"calories": NaN, "energy": "210 kcal"}}"#,
        );

        let mut nutrients = RawRecord::new();
        nutrients.insert("calories".to_string(), RawValue::Float(f64::NAN));
        nutrients.insert("energy".to_string(), RawValue::Text("210 kcal".to_string()));
        let mut built = RawRecord::new();
        built.insert("URL".to_string(), RawValue::Float(f64::NAN));
        built.insert("url".to_string(), RawValue::Text("https://lower".to_string()));
        built.insert("nutrients".to_string(), RawValue::Map(nutrients));

        let from_loader = normalize_record(&loaded);
        let from_memory = normalize_record(&built);
        assert_eq!(from_loader.calories, None);
        assert_eq!(from_loader.url, None);
        assert_eq!(
            from_loader.nutrients_json.as_deref(),
            Some(r#"{"calories":null,"energy":"210 kcal"}"#)
        );
        assert_eq!(from_loader.calories, from_memory.calories);
        assert_eq!(from_loader.url, from_memory.url);
        assert_eq!(from_loader.nutrients_json, from_memory.nutrients_json);
    }

    #[test]
    fn test_nutrients_keep_source_key_order() {
        let db = Database::open_in_memory().unwrap();
        let recipe = ingest_record(
            &db,
            &record(r#"{"title": "Broth", "nutrients": {"zinc": "1 mg", "calories": "5", "fat": "0 g"}}"#),
        )
        .unwrap();
        let keys: Vec<&str> = recipe
            .nutrients
            .as_ref()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["zinc", "calories", "fat"]);
        assert_eq!(recipe.calories, Some(5));
    }

    fn titled(title: String) -> RawValue {
        let mut raw = RawRecord::new();
        raw.insert("title".to_string(), RawValue::Text(title));
        RawValue::Map(raw)
    }

    #[test]
    fn test_ingest_records_commits_in_batches() {
        let db = Database::open_in_memory().unwrap();
        let records: Vec<RawValue> = (0..250).map(|i| titled(format!("Recipe {i}"))).collect();

        let summary = ingest_records(&db, &records).unwrap();
        assert_eq!(summary.records_seen, 250);
        assert_eq!(summary.inserted, 250);
        assert_eq!(db.count_recipes().unwrap(), 250);
    }

    #[test]
    fn test_ingest_records_failure_keeps_committed_batches() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recipes.db");
        let db = Database::open(&path).unwrap();
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON recipes
                 WHEN NEW.title = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        let records: Vec<RawValue> = (0..250)
            .map(|i| {
                if i == 230 {
                    titled("boom".to_string())
                } else {
                    titled(format!("Recipe {i}"))
                }
            })
            .collect();

        assert!(ingest_records(&db, &records).is_err());
        assert_eq!(db.count_recipes().unwrap(), 200);
    }

    #[test]
    fn test_ingest_records_skips_non_objects() {
        let db = Database::open_in_memory().unwrap();
        let records = parse_document(r#"[{"title": "A"}, 5, "junk", {"title": "B"}]"#).unwrap();
        let summary = ingest_records(&db, &records).unwrap();
        assert_eq!(summary.records_seen, 4);
        assert_eq!(summary.inserted, 2);
    }

    #[test]
    fn test_ingest_file_preserves_key_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recipes.json");
        std::fs::write(
            &path,
            r#"{"1": {"title": "Second", "rating": NaN}, "0": {"title": "First", "rating": 4.2}}"#,
        )
        .unwrap();

        let db = Database::open_in_memory().unwrap();
        let summary = ingest_file(&db, &path).unwrap();
        assert_eq!(summary.inserted, 2);

        let sort = Sort {
            field: SortField::Id,
            order: SortOrder::Asc,
        };
        let page = db
            .query_recipes(&RecipeFilter::default(), sort, PageRequest::default())
            .unwrap();
        assert_eq!(page.results[0].title, "First");
        assert_eq!(page.results[1].title, "Second");
        assert_eq!(page.results[1].rating, None);
    }

    #[test]
    fn test_ingest_file_unsupported_shape_is_typed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("recipes.json");
        std::fs::write(&path, "\"just a string\"").unwrap();

        let db = Database::open_in_memory().unwrap();
        let err = ingest_file(&db, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::UnsupportedShape { found: "string" })
        ));
        assert_eq!(db.count_recipes().unwrap(), 0);
    }

    #[test]
    fn test_ingest_file_missing() {
        let db = Database::open_in_memory().unwrap();
        let err = ingest_file(&db, Path::new("/nonexistent/recipes.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }
}
