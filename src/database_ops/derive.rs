//! Projects the stable part of the canonical catalog into the user catalog.
//!
//! Additive only: a derived row is created the first time its display name is
//! seen and is never touched again, so edits made by users survive re-imports.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database_ops::db::Db;
use crate::models::{GameBuilding, GameItem};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeriveReport {
    pub items_created: usize,
    pub items_existing: usize,
    pub buildings_created: usize,
    pub buildings_existing: usize,
    pub recipes_created: usize,
    pub recipes_existing: usize,
    pub recipe_items_created: usize,
    /// Canonical lines whose item has no derived counterpart.
    pub recipe_items_dropped: usize,
    pub took_ms: u64,
}

impl DeriveReport {
    pub fn created(&self) -> usize {
        self.items_created + self.buildings_created + self.recipes_created + self.recipe_items_created
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `name -> id` for an already-derived table.
async fn derived_names(conn: &mut SqliteConnection, table: &str) -> Result<HashMap<String, String>> {
    let rows = sqlx::query_as::<_, (String, String)>(&format!("SELECT name, id FROM {table}"))
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Run the whole projection in one transaction.
pub async fn derive_catalog(db: &Db) -> Result<DeriveReport> {
    let started = Instant::now();
    let mut report = DeriveReport::default();
    let _writer = db.write_lock().await;
    let mut tx = db.pool.begin().await?;

    // Items first: recipe lines link to them by name.
    let mut item_ids = derived_names(&mut tx, "items").await?;
    let game_items = sqlx::query_as::<_, GameItem>("SELECT * FROM game_items WHERE stable = 1 ORDER BY id")
        .fetch_all(&mut *tx)
        .await?;
    for item in game_items {
        if item_ids.contains_key(&item.name) {
            report.items_existing += 1;
            continue;
        }
        let id = new_id();
        let inserted = sqlx::query(
            "INSERT INTO items (id, name, description, category, game_class_name) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.form)
        .bind(&item.class_name)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted > 0 {
            report.items_created += 1;
            item_ids.insert(item.name, id);
        }
    }

    let mut building_ids = derived_names(&mut tx, "buildings").await?;
    let game_buildings =
        sqlx::query_as::<_, GameBuilding>("SELECT * FROM game_buildings WHERE stable = 1 ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;
    for building in game_buildings {
        if building_ids.contains_key(&building.name) {
            report.buildings_existing += 1;
            continue;
        }
        let id = new_id();
        let inserted = sqlx::query(
            "INSERT INTO buildings (id, name, description, power_usage, game_class_name) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&id)
        .bind(&building.name)
        .bind(&building.description)
        .bind(building.power_usage)
        .bind(&building.class_name)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted > 0 {
            report.buildings_created += 1;
            building_ids.insert(building.name, id);
        }
    }

    let existing_recipes = derived_names(&mut tx, "recipes").await?;
    let game_recipes = sqlx::query(
        "SELECT id, class_name, name, duration FROM game_recipes WHERE stable = 1 ORDER BY id",
    )
    .fetch_all(&mut *tx)
    .await?;
    let mut seen_recipe_names: Vec<String> = Vec::new();
    for row in game_recipes {
        let game_recipe_id: i64 = row.try_get("id")?;
        let class_name: String = row.try_get("class_name")?;
        let name: String = row.try_get("name")?;
        let duration: f64 = row.try_get("duration")?;
        if existing_recipes.contains_key(&name) || seen_recipe_names.contains(&name) {
            report.recipes_existing += 1;
            continue;
        }

        let recipe_id = new_id();
        sqlx::query("INSERT INTO recipes (id, name, duration, game_class_name) VALUES (?, ?, ?, ?)")
            .bind(&recipe_id)
            .bind(&name)
            .bind(duration)
            .bind(&class_name)
            .execute(&mut *tx)
            .await?;
        report.recipes_created += 1;
        seen_recipe_names.push(name);

        let lines = sqlx::query_as::<_, (String, f64, bool, i64)>(
            "SELECT gi.name, gri.amount, gri.is_input, gri.position \
             FROM game_recipe_items gri JOIN game_items gi ON gi.id = gri.item_id \
             WHERE gri.recipe_id = ? ORDER BY gri.position, gri.id",
        )
        .bind(game_recipe_id)
        .fetch_all(&mut *tx)
        .await?;
        for (item_name, amount, is_input, position) in lines {
            let Some(item_id) = item_ids.get(&item_name) else {
                debug!(recipe = %class_name, item = %item_name, "dropping derived line: item has no derived counterpart");
                report.recipe_items_dropped += 1;
                continue;
            };
            sqlx::query(
                "INSERT INTO recipe_items (id, recipe_id, item_id, amount, is_input, position) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(&recipe_id)
            .bind(item_id)
            .bind(amount)
            .bind(is_input)
            .bind(position)
            .execute(&mut *tx)
            .await?;
            report.recipe_items_created += 1;
        }
    }

    tx.commit().await?;
    report.took_ms = started.elapsed().as_millis() as u64;
    info!(
        items_created = report.items_created,
        buildings_created = report.buildings_created,
        recipes_created = report.recipes_created,
        recipe_items_created = report.recipe_items_created,
        recipe_items_dropped = report.recipe_items_dropped,
        took_ms = report.took_ms,
        "user catalog derived"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::loader::load_dataset;
    use crate::models::RecipeDraft;
    use crate::validation::validate_dataset;
    use crate::source::DatasetKind;
    use serde_json::{json, Value};

    async fn seed(db: &Db, items: Value, recipes: Value) {
        let items = validate_dataset(DatasetKind::Items, &items);
        load_dataset::<GameItem>(db, &items.entries, 1).await;
        let recipes = validate_dataset(DatasetKind::Recipes, &recipes);
        load_dataset::<RecipeDraft>(db, &recipes.entries, 1).await;
    }

    #[tokio::test]
    async fn items_are_deduplicated_by_name_and_edits_survive() {
        let db = Db::in_memory().await.unwrap();
        seed(
            &db,
            json!({
                "Desc_Crystal_C": [{"name": "Power Shard"}],
                "Desc_CrystalShard_C": [{"name": "Power Shard"}],
                "Desc_Unreleased_C": [{"name": "Unreleased", "stable": false}]
            }),
            json!({}),
        )
        .await;

        let first = derive_catalog(&db).await.unwrap();
        assert_eq!(first.items_created, 1);
        assert_eq!(first.items_existing, 1);
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items").fetch_one(&db.pool).await.unwrap();
        assert_eq!(n, 1);

        sqlx::query("UPDATE items SET description = 'my notes' WHERE name = 'Power Shard'")
            .execute(&db.pool)
            .await
            .unwrap();
        let second = derive_catalog(&db).await.unwrap();
        assert_eq!(second.created(), 0);
        let description: Option<String> =
            sqlx::query_scalar("SELECT description FROM items WHERE name = 'Power Shard'")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(description.as_deref(), Some("my notes"));
    }

    #[tokio::test]
    async fn recipe_lines_link_to_derived_items() {
        let db = Db::in_memory().await.unwrap();
        seed(
            &db,
            json!({
                "Desc_IronOre_C": [{"name": "Iron Ore", "form": "solid"}],
                "Desc_IronIngot_C": [{"name": "Iron Ingot"}],
                "Desc_Secret_C": [{"name": "Secret", "stable": false}]
            }),
            json!({
                "Recipe_IronIngot_C": [{
                    "name": "Iron Ingot",
                    "duration": 2,
                    "ingredients": [{"item": "Desc_IronOre_C", "amount": 30}, {"item": "Desc_Secret_C", "amount": 1}],
                    "products": [{"item": "Desc_IronIngot_C", "amount": 30}]
                }]
            }),
        )
        .await;

        let report = derive_catalog(&db).await.unwrap();
        assert_eq!(report.recipes_created, 1);
        assert_eq!(report.recipe_items_created, 2);
        assert_eq!(report.recipe_items_dropped, 1);

        let rows = sqlx::query_as::<_, (String, f64, bool)>(
            "SELECT i.name, ri.amount, ri.is_input FROM recipe_items ri \
             JOIN items i ON i.id = ri.item_id JOIN recipes r ON r.id = ri.recipe_id \
             WHERE r.game_class_name = 'Recipe_IronIngot_C' ORDER BY ri.position",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![("Iron Ore".to_string(), 30.0, true), ("Iron Ingot".to_string(), 30.0, false)]
        );

        let category: Option<String> = sqlx::query_scalar("SELECT category FROM items WHERE name = 'Iron Ore'")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(category.as_deref(), Some("solid"));

        let again = derive_catalog(&db).await.unwrap();
        assert_eq!(again.recipes_existing, 1);
        assert_eq!(again.recipe_items_created, 0);
    }
}
