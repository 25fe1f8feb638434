//! Catalog loader: one pass per dataset, one upsert per entry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::database_ops::catalog::{
    delete_join_rows, find_game_building_id, find_game_item_id, find_recipe_building_links,
    find_recipe_item_links, insert_recipe_building_link, insert_recipe_item_link, upsert_game_building,
    upsert_game_item, upsert_game_recipe, JoinTable, RecipeItemLink, UpsertStatus,
};
use crate::database_ops::db::Db;
use crate::database_ops::reconcile::reconcile;
use crate::models::{GameBuilding, GameItem, RecipeDraft};
use crate::source::DatasetKind;

/// What happened to a single entry.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub status: UpsertStatus,
    pub relations_added: usize,
    pub relations_removed: usize,
    pub malformed_lines: usize,
    /// One element per skipped line, so repeats are counted.
    pub missing_items: Vec<String>,
    pub missing_buildings: Vec<String>,
}

impl EntryOutcome {
    fn scalar(status: UpsertStatus) -> Self {
        Self {
            status,
            relations_added: 0,
            relations_removed: 0,
            malformed_lines: 0,
            missing_items: Vec::new(),
            missing_buildings: Vec::new(),
        }
    }
}

/// A dataset entity the loader knows how to parse and store.
#[async_trait]
pub trait Importable: Sized + Send + Sync + 'static {
    const KIND: DatasetKind;

    fn parse(class_name: &str, record: &Value) -> Result<Self>;

    async fn upsert(&self, db: &Db) -> Result<EntryOutcome>;
}

#[async_trait]
impl Importable for GameItem {
    const KIND: DatasetKind = DatasetKind::Items;

    fn parse(class_name: &str, record: &Value) -> Result<Self> {
        GameItem::from_record(class_name, record)
    }

    async fn upsert(&self, db: &Db) -> Result<EntryOutcome> {
        let mut conn = db.pool.acquire().await?;
        let (_, status) = upsert_game_item(&mut conn, self).await?;
        Ok(EntryOutcome::scalar(status))
    }
}

#[async_trait]
impl Importable for GameBuilding {
    const KIND: DatasetKind = DatasetKind::Buildings;

    fn parse(class_name: &str, record: &Value) -> Result<Self> {
        GameBuilding::from_record(class_name, record)
    }

    async fn upsert(&self, db: &Db) -> Result<EntryOutcome> {
        let mut conn = db.pool.acquire().await?;
        let (_, status) = upsert_game_building(&mut conn, self).await?;
        Ok(EntryOutcome::scalar(status))
    }
}

#[async_trait]
impl Importable for RecipeDraft {
    const KIND: DatasetKind = DatasetKind::Recipes;

    fn parse(class_name: &str, record: &Value) -> Result<Self> {
        RecipeDraft::from_record(class_name, record)
    }

    /// Upsert the recipe row and reconcile both join tables in one
    /// transaction, so readers never see a recipe mid-replacement.
    async fn upsert(&self, db: &Db) -> Result<EntryOutcome> {
        let class_name = &self.recipe.class_name;
        let _writer = db.write_lock().await;
        let mut tx = db.pool.begin().await?;
        let (recipe_id, status) = upsert_game_recipe(&mut tx, &self.recipe).await?;
        let mut outcome = EntryOutcome::scalar(status);
        outcome.malformed_lines = self.malformed_lines;

        let lines = self
            .ingredients
            .iter()
            .map(|line| (line, true))
            .chain(self.products.iter().map(|line| (line, false)));
        let mut desired_items = Vec::new();
        for (position, (line, is_input)) in lines.enumerate() {
            match find_game_item_id(&mut tx, &line.item_class).await? {
                Some(item_id) => desired_items.push(RecipeItemLink {
                    item_id,
                    amount: line.amount,
                    is_input,
                    position: position as i64,
                }),
                None => {
                    debug!(recipe = %class_name, item = %line.item_class, is_input, "skipping line: item not in catalog");
                    outcome.missing_items.push(line.item_class.clone());
                }
            }
        }

        let mut desired_buildings = Vec::new();
        for building in &self.produced_in {
            match find_game_building_id(&mut tx, building).await? {
                Some(building_id) => desired_buildings.push(building_id),
                None => {
                    debug!(recipe = %class_name, building = %building, "skipping producer: building not in catalog");
                    outcome.missing_buildings.push(building.clone());
                }
            }
        }

        let current_items = find_recipe_item_links(&mut tx, recipe_id).await?;
        let item_diff = reconcile(&current_items, &desired_items);
        delete_join_rows(&mut tx, JoinTable::RecipeItems, &item_diff.to_remove).await?;
        for link in &item_diff.to_add {
            insert_recipe_item_link(&mut tx, recipe_id, link).await?;
        }

        let current_buildings = find_recipe_building_links(&mut tx, recipe_id).await?;
        let building_diff = reconcile(&current_buildings, &desired_buildings);
        delete_join_rows(&mut tx, JoinTable::RecipeBuildings, &building_diff.to_remove).await?;
        for building_id in &building_diff.to_add {
            insert_recipe_building_link(&mut tx, recipe_id, *building_id).await?;
        }

        tx.commit()
            .await
            .with_context(|| format!("commit of recipe {class_name} failed"))?;

        outcome.relations_added = item_diff.to_add.len() + building_diff.to_add.len();
        outcome.relations_removed = item_diff.to_remove.len() + building_diff.to_remove.len();
        if outcome.status == UpsertStatus::Unchanged && !(item_diff.is_empty() && building_diff.is_empty()) {
            outcome.status = UpsertStatus::Updated;
        }
        Ok(outcome)
    }
}

/// Per-dataset counters. Missing-reference sets travel with the report
/// and are merged by the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub kind: Option<DatasetKind>,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub relations_added: usize,
    pub relations_removed: usize,
    pub malformed_lines: usize,
    pub missing_item_refs: usize,
    pub missing_building_refs: usize,
    pub missing_items: BTreeSet<String>,
    pub missing_buildings: BTreeSet<String>,
    pub took_ms: u64,
}

impl LoadReport {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome.status {
            UpsertStatus::Created => self.created += 1,
            UpsertStatus::Updated => self.updated += 1,
            UpsertStatus::Unchanged => self.unchanged += 1,
        }
        self.relations_added += outcome.relations_added;
        self.relations_removed += outcome.relations_removed;
        self.malformed_lines += outcome.malformed_lines;
        self.missing_item_refs += outcome.missing_items.len();
        self.missing_building_refs += outcome.missing_buildings.len();
        self.missing_items.extend(outcome.missing_items);
        self.missing_buildings.extend(outcome.missing_buildings);
    }

    /// Rows written by this pass; zero when re-importing an identical document.
    pub fn net_changes(&self) -> usize {
        self.created + self.updated + self.relations_added + self.relations_removed
    }
}

async fn load_entry<'a, T: Importable>(
    db: &'a Db,
    class_name: &'a str,
    record: &'a Value,
) -> (&'a str, Result<EntryOutcome>) {
    let outcome = match T::parse(class_name, record) {
        Ok(entity) => entity.upsert(db).await,
        Err(e) => Err(e),
    };
    (class_name, outcome)
}

/// Parse and upsert every validated entry of one dataset.
///
/// A failing entry is logged and counted; it never stops the pass. At most
/// `concurrency` entries are in flight; entries are distinct class
/// identifiers, so no two in-flight upserts touch the same row.
pub async fn load_dataset<T: Importable>(db: &Db, entries: &[(String, Value)], concurrency: usize) -> LoadReport {
    let started = Instant::now();
    let mut report = LoadReport {
        kind: Some(T::KIND),
        ..LoadReport::default()
    };

    let pending: Vec<_> = entries
        .iter()
        .map(|(class_name, record)| load_entry::<T>(db, class_name, record))
        .collect();
    let results: Vec<(&str, Result<EntryOutcome>)> = stream::iter(pending)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (class_name, result) in results {
        match result {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                warn!(kind = %T::KIND, class_name = %class_name, error = %e, "entry import failed");
                report.errors += 1;
            }
        }
    }
    report.took_ms = started.elapsed().as_millis() as u64;

    info!(
        kind = %T::KIND,
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        errors = report.errors,
        missing_item_refs = report.missing_item_refs,
        missing_building_refs = report.missing_building_refs,
        took_ms = report.took_ms,
        "dataset loaded"
    );
    report
}
