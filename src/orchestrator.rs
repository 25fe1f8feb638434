//! End-to-end import: fetch, validate, load in dependency order, derive, report.

use futures::future::{join_all, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database_ops::db::Db;
use crate::database_ops::derive::{derive_catalog, DeriveReport};
use crate::database_ops::loader::{load_dataset, Importable, LoadReport};
use crate::database_ops::runs::{import_run_finish, import_run_start, RunStatus};
use crate::models::{GameBuilding, GameItem, RecipeDraft};
use crate::source::fetcher::{FetchOutcome, SourceFetcher};
use crate::source::DatasetKind;
use crate::validation::{validate_dataset, ValidatedDataset, ValidationReport};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no usable dataset was obtained for any type")]
    NoDatasets,
    #[error("stage {stage} runs before its dependency {depends_on}")]
    StageOrder {
        stage: DatasetKind,
        depends_on: DatasetKind,
    },
    #[error("catalog store: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type LoadFn = for<'a> fn(&'a Db, &'a [(String, Value)], usize) -> BoxFuture<'a, LoadReport>;

/// One load phase: which dataset it consumes, what must be loaded before
/// it, and the loader to dispatch to.
pub struct StageDescriptor {
    pub kind: DatasetKind,
    pub depends_on: &'static [DatasetKind],
    pub load: LoadFn,
}

fn load_stage<'a, T: Importable>(
    db: &'a Db,
    entries: &'a [(String, Value)],
    concurrency: usize,
) -> BoxFuture<'a, LoadReport> {
    Box::pin(load_dataset::<T>(db, entries, concurrency))
}

/// Recipes reference items and buildings by class identifier, so both must
/// be stored first or every relation would resolve as missing.
pub static LOAD_STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        kind: DatasetKind::Items,
        depends_on: &[],
        load: load_stage::<GameItem>,
    },
    StageDescriptor {
        kind: DatasetKind::Buildings,
        depends_on: &[],
        load: load_stage::<GameBuilding>,
    },
    StageDescriptor {
        kind: DatasetKind::Recipes,
        depends_on: &[DatasetKind::Items, DatasetKind::Buildings],
        load: load_stage::<RecipeDraft>,
    },
];

/// Every dependency must appear earlier in the table.
pub fn check_stage_order(stages: &[StageDescriptor]) -> Result<(), PipelineError> {
    for (idx, stage) in stages.iter().enumerate() {
        for dep in stage.depends_on {
            if !stages[..idx].iter().any(|s| s.kind == *dep) {
                return Err(PipelineError::StageOrder {
                    stage: stage.kind,
                    depends_on: *dep,
                });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Stop after the documents are fetched and cached.
    pub fetch_only: bool,
    pub skip_derive: bool,
    /// In-flight upserts per dataset.
    pub concurrency: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            fetch_only: false,
            skip_derive: false,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub name: String,
    pub took_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub fetch_only: bool,
    pub fetches: Vec<FetchOutcome>,
    pub validations: Vec<ValidationReport>,
    pub loads: Vec<LoadReport>,
    pub derive: Option<DeriveReport>,
    pub derive_error: Option<String>,
    /// Union of every stage's unresolved item identifiers.
    pub missing_items: BTreeSet<String>,
    pub missing_buildings: BTreeSet<String>,
    pub stages: Vec<StageTiming>,
    pub took_ms: u64,
}

impl ImportReport {
    pub fn load(&self, kind: DatasetKind) -> Option<&LoadReport> {
        self.loads.iter().find(|l| l.kind == Some(kind))
    }

    pub fn fetch(&self, kind: DatasetKind) -> Option<&FetchOutcome> {
        self.fetches.iter().find(|f| f.kind == kind)
    }

    pub fn load_errors(&self) -> usize {
        self.loads.iter().map(|l| l.errors).sum()
    }

    fn settle_status(&mut self) {
        let degraded = self.fetches.iter().any(|f| !f.success)
            || self.validations.iter().any(|v| !v.acceptable || v.invalid > 0)
            || self.load_errors() > 0
            || self.derive_error.is_some();
        self.status = if degraded { RunStatus::Partial } else { RunStatus::Ok };
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "import run #{}: {} ({} ms)", self.run_id, self.status.as_str(), self.took_ms)?;
        for fetch in &self.fetches {
            let source = fetch.source.map(|s| s.to_string()).unwrap_or_else(|| "none".into());
            write!(f, "  {:<9} source={source} bytes={}", fetch.kind.as_str(), fetch.bytes)?;
            if let Some(err) = &fetch.error {
                write!(f, " fallback_reason=\"{err}\"")?;
            }
            writeln!(f)?;
        }
        for v in &self.validations {
            if let Some(kind) = v.kind {
                writeln!(
                    f,
                    "  {:<9} valid={} invalid={}{}",
                    kind.as_str(),
                    v.valid,
                    v.invalid,
                    if v.acceptable { "" } else { " (rejected)" }
                )?;
            }
        }
        for l in &self.loads {
            if let Some(kind) = l.kind {
                writeln!(
                    f,
                    "  {:<9} created={} updated={} unchanged={} errors={}",
                    kind.as_str(),
                    l.created,
                    l.updated,
                    l.unchanged,
                    l.errors
                )?;
            }
        }
        if let Some(recipes) = self.load(DatasetKind::Recipes) {
            writeln!(
                f,
                "imported {} recipes with {} errors; {} distinct missing item references, {} distinct missing building references",
                recipes.created + recipes.updated + recipes.unchanged,
                recipes.errors,
                self.missing_items.len(),
                self.missing_buildings.len()
            )?;
        }
        if let Some(d) = &self.derive {
            writeln!(
                f,
                "derived {} items, {} buildings, {} recipes, {} recipe lines ({} dropped)",
                d.items_created, d.buildings_created, d.recipes_created, d.recipe_items_created, d.recipe_items_dropped
            )?;
        }
        if let Some(err) = &self.derive_error {
            writeln!(f, "derive failed: {err}")?;
        }
        Ok(())
    }
}

pub struct ImportPipeline {
    db: Db,
    fetcher: SourceFetcher,
    stages: &'static [StageDescriptor],
}

impl ImportPipeline {
    pub fn new(db: Db, fetcher: SourceFetcher) -> Self {
        Self {
            db,
            fetcher,
            stages: LOAD_STAGES,
        }
    }

    pub fn with_stages(mut self, stages: &'static [StageDescriptor]) -> Self {
        self.stages = stages;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub async fn run(&self, options: &ImportOptions) -> Result<ImportReport, PipelineError> {
        check_stage_order(self.stages)?;
        let started = Instant::now();
        let run_id = import_run_start(&self.db, options.fetch_only).await?;
        info!(run_id, fetch_only = options.fetch_only, skip_derive = options.skip_derive, "import run started");

        let mut report = ImportReport {
            run_id,
            status: RunStatus::Ok,
            fetch_only: options.fetch_only,
            fetches: Vec::new(),
            validations: Vec::new(),
            loads: Vec::new(),
            derive: None,
            derive_error: None,
            missing_items: BTreeSet::new(),
            missing_buildings: BTreeSet::new(),
            stages: Vec::new(),
            took_ms: 0,
        };

        let phase = Instant::now();
        let outcomes = join_all(self.stages.iter().map(|s| self.fetcher.fetch(s.kind))).await;
        let any_document = outcomes.iter().any(|o| o.document.is_some());
        report.stages.push(timing("fetch", phase.elapsed(), any_document));

        let mut datasets: HashMap<DatasetKind, ValidatedDataset> = HashMap::new();
        if !options.fetch_only {
            for outcome in &outcomes {
                if let Some(document) = &outcome.document {
                    let validated = validate_dataset(outcome.kind, document);
                    report.validations.push(validated.report.clone());
                    if validated.report.acceptable {
                        datasets.insert(outcome.kind, validated);
                    }
                }
            }
        }
        report.fetches = outcomes;

        let usable = if options.fetch_only { any_document } else { !datasets.is_empty() };
        if !usable {
            error!(run_id, "no usable dataset for any type; aborting import");
            report.status = RunStatus::Error;
            report.took_ms = started.elapsed().as_millis() as u64;
            self.finish(&report).await;
            return Err(PipelineError::NoDatasets);
        }

        if options.fetch_only {
            report.settle_status();
            report.took_ms = started.elapsed().as_millis() as u64;
            emit_stage_summary(&report.stages);
            self.finish(&report).await;
            return Ok(report);
        }

        for stage in self.stages {
            let Some(dataset) = datasets.get(&stage.kind) else {
                warn!(kind = %stage.kind, "no acceptable dataset; skipping load stage");
                continue;
            };
            let phase = Instant::now();
            let load = (stage.load)(&self.db, &dataset.entries, options.concurrency).await;
            report.stages.push(timing(&format!("load_{}", stage.kind), phase.elapsed(), load.errors == 0));
            report.missing_items.extend(load.missing_items.iter().cloned());
            report.missing_buildings.extend(load.missing_buildings.iter().cloned());
            report.loads.push(load);
        }
        if !report.missing_items.is_empty() || !report.missing_buildings.is_empty() {
            warn!(
                missing_items = report.missing_items.len(),
                missing_buildings = report.missing_buildings.len(),
                "recipes reference identifiers absent from the catalog"
            );
        }

        if options.skip_derive {
            info!("derive skipped by request");
        } else {
            let phase = Instant::now();
            match derive_catalog(&self.db).await {
                Ok(derived) => {
                    report.stages.push(timing("derive", phase.elapsed(), true));
                    report.derive = Some(derived);
                }
                Err(e) => {
                    error!(error = %e, "derive failed");
                    report.stages.push(timing("derive", phase.elapsed(), false));
                    report.derive_error = Some(format!("{e:#}"));
                }
            }
        }

        report.settle_status();
        report.took_ms = started.elapsed().as_millis() as u64;
        emit_stage_summary(&report.stages);
        self.finish(&report).await;
        info!(run_id, status = report.status.as_str(), took_ms = report.took_ms, "import run finished");
        Ok(report)
    }

    /// Run bookkeeping must never discard an otherwise finished report.
    async fn finish(&self, report: &ImportReport) {
        let json = serde_json::to_value(report).ok();
        if let Err(e) = import_run_finish(&self.db, report.run_id, report.status, json.as_ref()).await {
            warn!(run_id = report.run_id, error = %e, "failed to record import run result");
        }
    }
}

fn timing(name: &str, elapsed: Duration, success: bool) -> StageTiming {
    StageTiming {
        name: name.to_string(),
        took_ms: elapsed.as_millis() as u64,
        success,
    }
}

fn emit_stage_summary(stages: &[StageTiming]) {
    if stages.is_empty() {
        return;
    }
    let mut sorted: Vec<&StageTiming> = stages.iter().collect();
    sorted.sort_by_key(|t| Reverse(t.took_ms));
    let total: u64 = sorted.iter().map(|t| t.took_ms).sum();
    info!(target: "metrics", stages = sorted.len(), total_ms = total, "import stage timing summary");
    for t in sorted {
        let pct = if total == 0 {
            0.0
        } else {
            t.took_ms as f64 / total as f64 * 100.0
        };
        info!(
            target: "metrics",
            stage = %t.name,
            took_ms = t.took_ms,
            pct = format!("{:.1}", pct),
            success = t.success,
            "stage timing detail"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::runs::last_import_run;
    use crate::source::fetcher::test_server::{spawn, Canned};
    use crate::source::fetcher::FetcherOptions;
    use crate::source::FetchSource;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    const ITEMS: &str = r#"{
        "Desc_IronOre_C": [{"name": "Iron Ore", "stackSize": 100, "form": "solid"}],
        "Desc_IronIngot_C": [{"name": "Iron Ingot", "stackSize": 100}]
    }"#;
    const BUILDINGS: &str = r#"{"Build_SmelterMk1_C": [{"name": "Smelter", "powerUsage": 4}]}"#;
    const RECIPES: &str = r#"{
        "Recipe_IngotIron_C": [{
            "name": "Iron Ingot",
            "duration": 2,
            "ingredients": [{"item": "Desc_IronOre_C", "amount": 1}],
            "products": [{"item": "Desc_IronIngot_C", "amount": 1}],
            "producedIn": ["Build_SmelterMk1_C"]
        }]
    }"#;

    fn temp_cache_dir() -> PathBuf {
        std::env::temp_dir().join(format!("game-catalog-pipeline-{}", uuid::Uuid::new_v4()))
    }

    fn options_for(base: &str, cache_dir: PathBuf, allow_stub: bool) -> FetcherOptions {
        let urls = DatasetKind::ALL
            .iter()
            .map(|k| (*k, format!("{base}/{}", k.cache_file_name())))
            .collect();
        FetcherOptions {
            timeout: Duration::from_secs(5),
            cache_dir,
            allow_stub,
            urls,
            ..FetcherOptions::default()
        }
    }

    async fn serve(items: &str, buildings: &str, recipes: &str) -> SocketAddr {
        spawn(HashMap::from([
            ("/items.json", Canned::ok(items)),
            ("/buildings.json", Canned::ok(buildings)),
            ("/recipes.json", Canned::ok(recipes)),
        ]))
        .await
    }

    async fn pipeline(fetcher: FetcherOptions) -> ImportPipeline {
        let db = Db::in_memory().await.unwrap();
        ImportPipeline::new(db, SourceFetcher::new(fetcher).unwrap())
    }

    async fn count(db: &Db, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(&db.pool).await.unwrap()
    }

    #[test]
    fn default_stage_table_is_ordered() {
        assert!(check_stage_order(LOAD_STAGES).is_ok());
        let kinds: Vec<_> = LOAD_STAGES.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![DatasetKind::Items, DatasetKind::Buildings, DatasetKind::Recipes]);
    }

    static MISORDERED: &[StageDescriptor] = &[
        StageDescriptor {
            kind: DatasetKind::Items,
            depends_on: &[],
            load: load_stage::<GameItem>,
        },
        StageDescriptor {
            kind: DatasetKind::Recipes,
            depends_on: &[DatasetKind::Items, DatasetKind::Buildings],
            load: load_stage::<RecipeDraft>,
        },
        StageDescriptor {
            kind: DatasetKind::Buildings,
            depends_on: &[],
            load: load_stage::<GameBuilding>,
        },
    ];

    #[tokio::test]
    async fn misordered_stage_table_is_rejected() {
        match check_stage_order(MISORDERED) {
            Err(PipelineError::StageOrder { stage, depends_on }) => {
                assert_eq!(stage, DatasetKind::Recipes);
                assert_eq!(depends_on, DatasetKind::Buildings);
            }
            other => panic!("unexpected {other:?}"),
        }

        let p = pipeline(options_for("http://127.0.0.1:1", temp_cache_dir(), true))
            .await
            .with_stages(MISORDERED);
        assert!(matches!(
            p.run(&ImportOptions::default()).await,
            Err(PipelineError::StageOrder { .. })
        ));
    }

    #[tokio::test]
    async fn iron_ingot_end_to_end_and_idempotent() {
        let addr = serve(ITEMS, BUILDINGS, RECIPES).await;
        let p = pipeline(options_for(&format!("http://{addr}"), temp_cache_dir(), true)).await;

        let report = p.run(&ImportOptions::default()).await.unwrap();
        assert_eq!(report.status, RunStatus::Ok);
        assert!(report.fetches.iter().all(|f| f.source == Some(FetchSource::Wiki)));
        assert_eq!(report.load(DatasetKind::Items).unwrap().created, 2);
        assert_eq!(report.load(DatasetKind::Recipes).unwrap().created, 1);
        assert!(report.missing_items.is_empty());
        assert!(report.missing_buildings.is_empty());

        let db = p.db();
        assert_eq!(count(db, "SELECT COUNT(*) FROM game_recipe_items").await, 2);
        assert_eq!(count(db, "SELECT COUNT(*) FROM game_recipe_buildings").await, 1);

        let derived = report.derive.as_ref().unwrap();
        assert_eq!(derived.items_created, 2);
        assert_eq!(derived.buildings_created, 1);
        assert_eq!(derived.recipes_created, 1);
        assert_eq!(derived.recipe_items_created, 2);
        assert!(report.to_string().contains("imported 1 recipes with 0 errors"));

        let again = p.run(&ImportOptions::default()).await.unwrap();
        assert_eq!(again.status, RunStatus::Ok);
        assert!(again.loads.iter().all(|l| l.net_changes() == 0));
        assert_eq!(again.derive.as_ref().unwrap().created(), 0);
        assert_eq!(count(db, "SELECT COUNT(*) FROM items").await, 2);
        assert_eq!(count(db, "SELECT COUNT(*) FROM recipe_items").await, 2);

        let run = last_import_run(db).await.unwrap().unwrap();
        assert_eq!(run.id, again.run_id);
        assert_eq!(run.status, "ok");
    }

    #[tokio::test]
    async fn ingot_product_missing_from_items_is_reported() {
        let items = r#"{"Desc_IronOre_C": [{"name": "Iron Ore"}]}"#;
        let recipes = r#"{"Recipe_IronIngot_C": [{
            "name": "Iron Ingot",
            "duration": 2,
            "ingredients": [{"item": "Desc_IronOre_C", "amount": 30}],
            "products": [{"item": "Desc_IronIngot_C", "amount": 30}]
        }]}"#;
        let addr = serve(items, BUILDINGS, recipes).await;
        let p = pipeline(options_for(&format!("http://{addr}"), temp_cache_dir(), true)).await;

        let report = p.run(&ImportOptions::default()).await.unwrap();
        assert_eq!(report.status, RunStatus::Ok);
        assert_eq!(report.load(DatasetKind::Items).unwrap().created, 1);
        assert_eq!(report.load(DatasetKind::Recipes).unwrap().created, 1);
        assert_eq!(report.missing_items, BTreeSet::from(["Desc_IronIngot_C".to_string()]));

        let db = p.db();
        let inputs: Vec<f64> = sqlx::query_scalar("SELECT amount FROM game_recipe_items WHERE is_input = 1")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(inputs, vec![30.0]);
        assert_eq!(count(db, "SELECT COUNT(*) FROM game_recipe_items WHERE is_input = 0").await, 0);
    }

    #[tokio::test]
    async fn unreachable_source_uses_existing_then_stub() {
        let dir = temp_cache_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("items.json"), ITEMS).unwrap();
        let p = pipeline(options_for("http://127.0.0.1:1", dir.clone(), true)).await;

        let report = p.run(&ImportOptions::default()).await.unwrap();
        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.fetch(DatasetKind::Items).unwrap().source, Some(FetchSource::Existing));
        assert_eq!(report.fetch(DatasetKind::Buildings).unwrap().source, Some(FetchSource::Empty));
        assert_eq!(report.fetch(DatasetKind::Recipes).unwrap().source, Some(FetchSource::Empty));
        assert!(dir.join("recipes.json").exists());

        // Placeholders are unstable: loaded into the canonical catalog, never derived.
        assert_eq!(count(p.db(), "SELECT COUNT(*) FROM game_buildings").await, 1);
        assert_eq!(report.derive.as_ref().unwrap().items_created, 2);
        assert_eq!(report.derive.as_ref().unwrap().buildings_created, 0);
        assert_eq!(report.derive.as_ref().unwrap().recipes_created, 0);
    }

    #[tokio::test]
    async fn invalid_entry_does_not_stop_the_run() {
        let items = r#"{
            "Desc_IronOre_C": [{"name": "Iron Ore"}],
            "Desc_Broken_C": [{"description": "no name"}]
        }"#;
        let addr = serve(items, BUILDINGS, RECIPES).await;
        let p = pipeline(options_for(&format!("http://{addr}"), temp_cache_dir(), true)).await;

        let report = p.run(&ImportOptions::default()).await.unwrap();
        assert_eq!(report.status, RunStatus::Partial);
        let items_validation = report.validations.iter().find(|v| v.kind == Some(DatasetKind::Items)).unwrap();
        assert_eq!((items_validation.valid, items_validation.invalid), (1, 1));
        assert_eq!(items_validation.invalid_keys, vec!["Desc_Broken_C"]);

        let recipes = report.load(DatasetKind::Recipes).unwrap();
        assert_eq!(recipes.created, 1);
        assert_eq!(recipes.missing_item_refs, 1);
        assert!(report.missing_items.contains("Desc_IronIngot_C"));
        assert_eq!(count(p.db(), "SELECT COUNT(*) FROM game_recipe_items").await, 1);
    }

    #[tokio::test]
    async fn nothing_usable_is_fatal() {
        let p = pipeline(options_for("http://127.0.0.1:1", temp_cache_dir(), false)).await;
        let result = p.run(&ImportOptions::default()).await;
        assert!(matches!(result, Err(PipelineError::NoDatasets)));

        let run = last_import_run(p.db()).await.unwrap().unwrap();
        assert_eq!(run.status, "error");
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn rejected_documents_are_fatal_when_none_remain() {
        let addr = serve("{}", "[]", "{}").await;
        let p = pipeline(options_for(&format!("http://{addr}"), temp_cache_dir(), true)).await;
        assert!(matches!(
            p.run(&ImportOptions::default()).await,
            Err(PipelineError::NoDatasets)
        ));
    }

    #[tokio::test]
    async fn fetch_only_caches_without_loading() {
        let addr = serve(ITEMS, BUILDINGS, RECIPES).await;
        let dir = temp_cache_dir();
        let p = pipeline(options_for(&format!("http://{addr}"), dir.clone(), true)).await;

        let options = ImportOptions {
            fetch_only: true,
            ..ImportOptions::default()
        };
        let report = p.run(&options).await.unwrap();
        assert!(report.fetch_only);
        assert!(report.loads.is_empty());
        assert!(report.derive.is_none());
        for kind in DatasetKind::ALL {
            assert!(dir.join(kind.cache_file_name()).exists());
        }
        assert_eq!(count(p.db(), "SELECT COUNT(*) FROM game_items").await, 0);
    }

    #[tokio::test]
    async fn skip_derive_leaves_user_catalog_empty() {
        let addr = serve(ITEMS, BUILDINGS, RECIPES).await;
        let p = pipeline(options_for(&format!("http://{addr}"), temp_cache_dir(), true)).await;
        let options = ImportOptions {
            skip_derive: true,
            concurrency: 4,
            ..ImportOptions::default()
        };
        let report = p.run(&options).await.unwrap();
        assert!(report.derive.is_none());
        assert_eq!(count(p.db(), "SELECT COUNT(*) FROM game_items").await, 2);
        assert_eq!(count(p.db(), "SELECT COUNT(*) FROM items").await, 0);
    }
}
