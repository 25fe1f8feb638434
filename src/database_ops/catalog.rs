//! Canonical catalog primitives: upsert by class identifier, find by key,
//! find-many/delete-many on the recipe join tables.
//!
//! Every function takes a bare connection so callers decide the scope: a
//! pooled connection for single-row upserts, a transaction for recipe
//! relation replacement.

use anyhow::Result;
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::models::{GameBuilding, GameItem, GameRecipe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Created,
    Updated,
    Unchanged,
}

/// Desired/stored shape of one `game_recipe_items` row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeItemLink {
    pub item_id: i64,
    pub amount: f64,
    pub is_input: bool,
    /// Index of the line in the document (ingredients first, then products).
    pub position: i64,
}

pub async fn find_game_item(conn: &mut SqliteConnection, class_name: &str) -> Result<Option<(i64, GameItem)>> {
    let row = sqlx::query("SELECT * FROM game_items WHERE class_name = ?")
        .bind(class_name)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(r) => Ok(Some((r.try_get("id")?, GameItem::from_row(&r)?))),
        None => Ok(None),
    }
}

pub async fn find_game_item_id(conn: &mut SqliteConnection, class_name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM game_items WHERE class_name = ?")
        .bind(class_name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

pub async fn upsert_game_item(conn: &mut SqliteConnection, item: &GameItem) -> Result<(i64, UpsertStatus)> {
    let status = match find_game_item(conn, &item.class_name).await? {
        Some((id, existing)) if existing == *item => return Ok((id, UpsertStatus::Unchanged)),
        Some(_) => UpsertStatus::Updated,
        None => UpsertStatus::Created,
    };
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO game_items \
            (class_name, name, description, stack_size, energy, radioactive, can_be_discarded, \
             sink_points, abbreviation, form, fluid_color, experimental, stable) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (class_name) DO UPDATE SET \
            name = excluded.name, description = excluded.description, \
            stack_size = excluded.stack_size, energy = excluded.energy, \
            radioactive = excluded.radioactive, can_be_discarded = excluded.can_be_discarded, \
            sink_points = excluded.sink_points, abbreviation = excluded.abbreviation, \
            form = excluded.form, fluid_color = excluded.fluid_color, \
            experimental = excluded.experimental, stable = excluded.stable \
         RETURNING id",
    )
    .bind(&item.class_name)
    .bind(&item.name)
    .bind(&item.description)
    .bind(item.stack_size)
    .bind(item.energy)
    .bind(item.radioactive)
    .bind(item.can_be_discarded)
    .bind(item.sink_points)
    .bind(&item.abbreviation)
    .bind(&item.form)
    .bind(&item.fluid_color)
    .bind(item.experimental)
    .bind(item.stable)
    .fetch_one(&mut *conn)
    .await?;
    Ok((id, status))
}

pub async fn find_game_building(
    conn: &mut SqliteConnection,
    class_name: &str,
) -> Result<Option<(i64, GameBuilding)>> {
    let row = sqlx::query("SELECT * FROM game_buildings WHERE class_name = ?")
        .bind(class_name)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(r) => Ok(Some((r.try_get("id")?, GameBuilding::from_row(&r)?))),
        None => Ok(None),
    }
}

pub async fn find_game_building_id(conn: &mut SqliteConnection, class_name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM game_buildings WHERE class_name = ?")
        .bind(class_name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

pub async fn upsert_game_building(
    conn: &mut SqliteConnection,
    building: &GameBuilding,
) -> Result<(i64, UpsertStatus)> {
    let status = match find_game_building(conn, &building.class_name).await? {
        Some((id, existing)) if existing == *building => return Ok((id, UpsertStatus::Unchanged)),
        Some(_) => UpsertStatus::Updated,
        None => UpsertStatus::Created,
    };
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO game_buildings \
            (class_name, name, description, unlocked_by, power_usage, power_generated, \
             supplemental_load_rate, overclockable, somersloop_slots, is_vehicle, experimental, stable) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (class_name) DO UPDATE SET \
            name = excluded.name, description = excluded.description, \
            unlocked_by = excluded.unlocked_by, power_usage = excluded.power_usage, \
            power_generated = excluded.power_generated, \
            supplemental_load_rate = excluded.supplemental_load_rate, \
            overclockable = excluded.overclockable, somersloop_slots = excluded.somersloop_slots, \
            is_vehicle = excluded.is_vehicle, experimental = excluded.experimental, \
            stable = excluded.stable \
         RETURNING id",
    )
    .bind(&building.class_name)
    .bind(&building.name)
    .bind(&building.description)
    .bind(&building.unlocked_by)
    .bind(building.power_usage)
    .bind(building.power_generated)
    .bind(building.supplemental_load_rate)
    .bind(building.overclockable)
    .bind(building.somersloop_slots)
    .bind(building.is_vehicle)
    .bind(building.experimental)
    .bind(building.stable)
    .fetch_one(&mut *conn)
    .await?;
    Ok((id, status))
}

pub async fn find_game_recipe(
    conn: &mut SqliteConnection,
    class_name: &str,
) -> Result<Option<(i64, GameRecipe)>> {
    let row = sqlx::query("SELECT * FROM game_recipes WHERE class_name = ?")
        .bind(class_name)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(r) => Ok(Some((r.try_get("id")?, GameRecipe::from_row(&r)?))),
        None => Ok(None),
    }
}

pub async fn upsert_game_recipe(conn: &mut SqliteConnection, recipe: &GameRecipe) -> Result<(i64, UpsertStatus)> {
    let status = match find_game_recipe(conn, &recipe.class_name).await? {
        Some((id, existing)) if existing == *recipe => return Ok((id, UpsertStatus::Unchanged)),
        Some(_) => UpsertStatus::Updated,
        None => UpsertStatus::Created,
    };
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO game_recipes \
            (class_name, name, unlocked_by, duration, alternate, in_craft_bench, in_workshop, \
             in_build_gun, in_customizer, manual_crafting_multiplier, min_power, max_power, \
             experimental, stable) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (class_name) DO UPDATE SET \
            name = excluded.name, unlocked_by = excluded.unlocked_by, \
            duration = excluded.duration, alternate = excluded.alternate, \
            in_craft_bench = excluded.in_craft_bench, in_workshop = excluded.in_workshop, \
            in_build_gun = excluded.in_build_gun, in_customizer = excluded.in_customizer, \
            manual_crafting_multiplier = excluded.manual_crafting_multiplier, \
            min_power = excluded.min_power, max_power = excluded.max_power, \
            experimental = excluded.experimental, stable = excluded.stable \
         RETURNING id",
    )
    .bind(&recipe.class_name)
    .bind(&recipe.name)
    .bind(&recipe.unlocked_by)
    .bind(recipe.duration)
    .bind(recipe.alternate)
    .bind(recipe.in_craft_bench)
    .bind(recipe.in_workshop)
    .bind(recipe.in_build_gun)
    .bind(recipe.in_customizer)
    .bind(recipe.manual_crafting_multiplier)
    .bind(recipe.min_power)
    .bind(recipe.max_power)
    .bind(recipe.experimental)
    .bind(recipe.stable)
    .fetch_one(&mut *conn)
    .await?;
    Ok((id, status))
}

/// Stored item lines of a recipe as `(row id, link)`, in document order.
pub async fn find_recipe_item_links(
    conn: &mut SqliteConnection,
    recipe_id: i64,
) -> Result<Vec<(i64, RecipeItemLink)>> {
    let rows = sqlx::query(
        "SELECT id, item_id, amount, is_input, position FROM game_recipe_items \
         WHERE recipe_id = ? ORDER BY position, id",
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push((
            r.try_get("id")?,
            RecipeItemLink {
                item_id: r.try_get("item_id")?,
                amount: r.try_get("amount")?,
                is_input: r.try_get("is_input")?,
                position: r.try_get("position")?,
            },
        ));
    }
    Ok(out)
}

pub async fn insert_recipe_item_link(
    conn: &mut SqliteConnection,
    recipe_id: i64,
    link: &RecipeItemLink,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO game_recipe_items (recipe_id, item_id, amount, is_input, position) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(recipe_id)
    .bind(link.item_id)
    .bind(link.amount)
    .bind(link.is_input)
    .bind(link.position)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stored building links of a recipe as `(row id, building id)`.
pub async fn find_recipe_building_links(conn: &mut SqliteConnection, recipe_id: i64) -> Result<Vec<(i64, i64)>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, building_id FROM game_recipe_buildings WHERE recipe_id = ? ORDER BY id",
    )
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn insert_recipe_building_link(conn: &mut SqliteConnection, recipe_id: i64, building_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO game_recipe_buildings (recipe_id, building_id) VALUES (?, ?)")
        .bind(recipe_id)
        .bind(building_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Join tables the relation reconcile is allowed to delete from.
#[derive(Debug, Clone, Copy)]
pub enum JoinTable {
    RecipeItems,
    RecipeBuildings,
}

impl JoinTable {
    fn name(self) -> &'static str {
        match self {
            JoinTable::RecipeItems => "game_recipe_items",
            JoinTable::RecipeBuildings => "game_recipe_buildings",
        }
    }
}

/// Delete join rows by id. Canonical entity rows are never deleted.
pub async fn delete_join_rows(conn: &mut SqliteConnection, table: JoinTable, row_ids: &[i64]) -> Result<u64> {
    if row_ids.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE id IN (", table.name()));
    let mut separated = qb.separated(", ");
    for id in row_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
