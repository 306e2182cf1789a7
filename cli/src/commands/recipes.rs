use anyhow::Result;
use std::process;

use ladle_core::db::Database;
use ladle_core::models::{validate_page_request, validate_search_filter};
use ladle_core::query::{RecipeFilter, Sort};

use super::helpers::{json_error, print_recipe_detail, print_recipe_page};

/// Raw paging and ordering options as given on the command line.
pub(crate) struct Paging<'a> {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<&'a str>,
    pub order: Option<&'a str>,
}

pub(crate) fn cmd_list(db: &Database, paging: &Paging, json: bool) -> Result<()> {
    cmd_search(db, &RecipeFilter::default(), paging, json)
}

pub(crate) fn cmd_search(
    db: &Database,
    filter: &RecipeFilter,
    paging: &Paging,
    json: bool,
) -> Result<()> {
    validate_search_filter(filter)?;
    let page = validate_page_request(paging.page, paging.limit)?;
    let sort = Sort::from_params(paging.sort_by, paging.order);

    let result = db.query_recipes(filter, sort, page)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.results.is_empty() {
        let total = result.total;
        eprintln!("No recipes on this page ({total} matching)");
    } else {
        print_recipe_page(&result);
    }

    Ok(())
}

pub(crate) fn cmd_show(db: &Database, id: i64, json: bool) -> Result<()> {
    let Some(recipe) = db.get_recipe(id)? else {
        let message = format!("Recipe {id} not found");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        print_recipe_detail(&recipe);
    }

    Ok(())
}
