use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::models::{Recipe, RecipePage};

#[derive(Tabled)]
struct RecipeRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Cuisine")]
    cuisine: String,
    #[tabled(rename = "Rating")]
    rating: String,
    #[tabled(rename = "Total (min)")]
    total_time: String,
    #[tabled(rename = "Calories")]
    calories: String,
}

fn recipe_row(r: &Recipe) -> RecipeRow {
    RecipeRow {
        id: r.id,
        title: truncate(&r.title, 40),
        cuisine: r
            .cuisine
            .as_deref()
            .map(|c| truncate(c, 24))
            .unwrap_or_default(),
        rating: r.rating.map_or("-".into(), |v| format!("{v:.1}")),
        total_time: opt_to_string(r.total_time),
        calories: opt_to_string(r.calories),
    }
}

pub(crate) fn print_recipe_page(page: &RecipePage) {
    let rows: Vec<RecipeRow> = page.results.iter().map(recipe_row).collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let (page_no, limit, total) = (page.page, page.limit, page.total);
    let pages = ((total + i64::from(limit) - 1) / i64::from(limit)).max(1);
    println!("Page {page_no} of {pages} ({total} matching, {limit} per page)");
}

pub(crate) fn print_recipe_detail(r: &Recipe) {
    println!("{} (id: {})", r.title, r.id);
    if let Some(cuisine) = &r.cuisine {
        println!("  Cuisine:     {cuisine}");
    }
    if let Some(rating) = r.rating {
        println!("  Rating:      {rating:.1}");
    }
    println!(
        "  Time:        {} total, {} prep, {} cook (min)",
        opt_to_string(r.total_time),
        opt_to_string(r.prep_time),
        opt_to_string(r.cook_time)
    );
    if let Some(serves) = &r.serves {
        println!("  Serves:      {serves}");
    }
    if let Some(calories) = r.calories {
        println!("  Calories:    {calories}");
    }
    if let Some(url) = &r.url {
        println!("  URL:         {url}");
    }
    if let Some(nutrients) = &r.nutrients {
        println!("  Nutrients:");
        for (name, value) in nutrients {
            let value = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string);
            println!("    {name}: {value}");
        }
    }
    if let Some(description) = &r.description {
        println!("\n{description}");
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

fn opt_to_string(v: Option<i64>) -> String {
    v.map_or("-".into(), |v| v.to_string())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Recipe {
        Recipe {
            id: 3,
            cuisine: None,
            title: "Sweet Potato Pie".to_string(),
            url: None,
            rating: Some(4.8),
            total_time: Some(115),
            prep_time: None,
            cook_time: None,
            description: None,
            nutrients: None,
            serves: None,
            calories: None,
        }
    }

    #[test]
    fn test_recipe_row_formats_missing_values() {
        let row = recipe_row(&sample());
        assert_eq!(row.id, 3);
        assert_eq!(row.cuisine, "");
        assert_eq!(row.rating, "4.8");
        assert_eq!(row.total_time, "115");
        assert_eq!(row.calories, "-");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("Recipe 9 not found"), r#"{"error":"Recipe 9 not found"}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème brûlée tart", 10), "Crème b...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }
}
