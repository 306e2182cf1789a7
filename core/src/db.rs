use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, params, params_from_iter, types::Value};
use serde_json::Map;

use crate::models::{NewRecipe, Recipe, RecipePage};
use crate::query::{PageRequest, RecipeFilter, Sort};

const RECIPE_COLUMNS: &str = "id, cuisine, title, url, rating, total_time, prep_time, cook_time, \
                              description, nutrients_json, serves, calories";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    cuisine TEXT,
                    title TEXT NOT NULL,
                    url TEXT,
                    rating REAL,
                    total_time INTEGER,
                    prep_time INTEGER,
                    cook_time INTEGER,
                    description TEXT,
                    nutrients_json TEXT,
                    serves TEXT,
                    calories INTEGER
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_cuisine ON recipes(cuisine);
                CREATE INDEX IF NOT EXISTS idx_recipes_title ON recipes(title);
                CREATE INDEX IF NOT EXISTS idx_recipes_rating ON recipes(rating);
                CREATE INDEX IF NOT EXISTS idx_recipes_total_time ON recipes(total_time);
                CREATE INDEX IF NOT EXISTS idx_recipes_calories ON recipes(calories);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Open a transaction on the shared connection.
    ///
    /// Inserts made through `self` while the returned guard is alive belong to it;
    /// dropping the guard without committing rolls them back.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.conn
            .unchecked_transaction()
            .context("Failed to begin transaction")
    }

    // --- Row mapping helpers ---

    // Expects columns in RECIPE_COLUMNS order
    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let id: i64 = row.get(0)?;
        let nutrients_json: Option<String> = row.get(9)?;
        Ok(Recipe {
            id,
            cuisine: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            rating: row.get(4)?,
            total_time: row.get(5)?,
            prep_time: row.get(6)?,
            cook_time: row.get(7)?,
            description: row.get(8)?,
            nutrients: nutrients_json.as_deref().and_then(|blob| decode_nutrients(id, blob)),
            serves: row.get(10)?,
            calories: row.get(11)?,
        })
    }

    // --- Recipes ---

    /// Append a recipe row and return its new id. Never matches existing rows.
    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO recipes (cuisine, title, url, rating, total_time, prep_time, cook_time, description, nutrients_json, serves, calories)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                recipe.cuisine,
                recipe.title,
                recipe.url,
                recipe.rating,
                recipe.total_time,
                recipe.prep_time,
                recipe.cook_time,
                recipe.description,
                recipe.nutrients_json,
                recipe.serves,
                recipe.calories,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::recipe_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Run a filtered, sorted, windowed read.
    ///
    /// `total` honors the filter but ignores the window.
    pub fn query_recipes(
        &self,
        filter: &RecipeFilter,
        sort: Sort,
        page: PageRequest,
    ) -> Result<RecipePage> {
        let (where_sql, mut values) = filter.to_sql();

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM recipes{where_sql}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .context("Failed to count recipes")?;

        values.push(Value::Integer(i64::from(page.limit)));
        values.push(Value::Integer(page.offset()));
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes{where_sql} ORDER BY {} LIMIT ? OFFSET ?",
            sort.order_by_sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let results = stmt
            .query_map(params_from_iter(values.iter()), Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecipePage {
            total,
            page: page.page,
            limit: page.limit,
            results,
        })
    }

    #[cfg(test)]
    pub(crate) fn count_recipes(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Decode a stored nutrients blob. Anything but a JSON object reads back as `None`.
fn decode_nutrients(id: i64, blob: &str) -> Option<Map<String, serde_json::Value>> {
    match serde_json::from_str(blob) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!(recipe_id = id, error = %e, "unreadable nutrients blob");
            None
        }
    }
}
