use anyhow::Result;
use std::fmt::Write as _;

use crate::database_ops::db::Db;
use crate::database_ops::runs::last_import_run;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct DbCountsConfig {
    /// Optional override for the catalog database URL.
    pub database_url: Option<String>,
}

const TABLES: &[(&str, &str)] = &[
    ("game_items", "SELECT count(*) FROM game_items"),
    ("game_items (unstable)", "SELECT count(*) FROM game_items WHERE stable = 0"),
    ("game_buildings", "SELECT count(*) FROM game_buildings"),
    ("game_recipes", "SELECT count(*) FROM game_recipes"),
    ("game_recipes (alternate)", "SELECT count(*) FROM game_recipes WHERE alternate = 1"),
    ("game_recipe_items", "SELECT count(*) FROM game_recipe_items"),
    ("game_recipe_buildings", "SELECT count(*) FROM game_recipe_buildings"),
    ("items", "SELECT count(*) FROM items"),
    ("buildings", "SELECT count(*) FROM buildings"),
    ("recipes", "SELECT count(*) FROM recipes"),
    ("recipe_items", "SELECT count(*) FROM recipe_items"),
    ("import_runs", "SELECT count(*) FROM import_runs"),
];

/// Row counts for every catalog table, one `name: count` line each.
pub async fn render(db: &Db) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "CATALOG COUNTS SUMMARY:").ok();
    for (label, sql) in TABLES {
        let n = sqlx::query_scalar::<_, i64>(sql).fetch_one(&db.pool).await?;
        writeln!(out, "{label}: {n}").ok();
    }
    match last_import_run(db).await? {
        Some(run) => {
            writeln!(
                out,
                "last import run: #{} {} (started {}, finished {})",
                run.id,
                run.status,
                run.started_at,
                run.finished_at.as_deref().unwrap_or("-")
            )
            .ok();
        }
        None => {
            writeln!(out, "last import run: none").ok();
        }
    }
    Ok(out)
}

pub async fn run(cfg: DbCountsConfig) -> Result<()> {
    env_util::init_env();
    let db_url = cfg.database_url.unwrap_or_else(env_util::db_url);
    let db = Db::connect(&db_url, 1).await?;
    print!("{}", render(&db).await?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_every_table() {
        let db = Db::in_memory().await.unwrap();
        let out = render(&db).await.unwrap();
        assert!(out.starts_with("CATALOG COUNTS SUMMARY:"));
        assert!(out.contains("game_recipe_buildings: 0"));
        assert!(out.contains("recipe_items: 0"));
        assert!(out.contains("last import run: none"));
    }
}
