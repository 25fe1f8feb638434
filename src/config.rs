//! Importer settings resolved from the environment (and `.env`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::source::fetcher::{default_user_agent, FetcherOptions};
use crate::source::DatasetKind;
use crate::util::env::{db_url, env_flag, env_opt, env_parse};

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub fetcher: FetcherOptions,
    pub concurrency: usize,
}

fn url_var(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::Items => "GAME_DATA_ITEMS_URL",
        DatasetKind::Recipes => "GAME_DATA_RECIPES_URL",
        DatasetKind::Buildings => "GAME_DATA_BUILDINGS_URL",
    }
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let urls: HashMap<DatasetKind, String> = DatasetKind::ALL
            .iter()
            .filter_map(|kind| env_opt(url_var(*kind)).map(|url| (*kind, url)))
            .collect();

        Self {
            database_url: db_url(),
            max_connections: env_parse("DB_MAX_CONNS", 5u32),
            fetcher: FetcherOptions {
                user_agent: env_opt("GAME_DATA_USER_AGENT").unwrap_or_else(default_user_agent),
                timeout: Duration::from_secs(env_parse("GAME_DATA_TIMEOUT_SECS", 30u64).max(1)),
                max_redirects: env_parse("GAME_DATA_MAX_REDIRECTS", 10usize),
                cache_dir: env_opt("GAME_DATA_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data/game")),
                allow_stub: env_flag("GAME_DATA_ALLOW_STUB", true),
                urls,
            },
            concurrency: env_parse("IMPORT_CONCURRENCY", 1usize).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_picked_up() {
        std::env::set_var("GAME_DATA_RECIPES_URL", "http://localhost:9/recipes.json");
        std::env::set_var("IMPORT_CONCURRENCY", "0");
        std::env::set_var("GAME_DATA_TIMEOUT_SECS", "not-a-number");
        let cfg = ImportConfig::from_env();
        assert_eq!(
            cfg.fetcher.urls.get(&DatasetKind::Recipes).map(String::as_str),
            Some("http://localhost:9/recipes.json")
        );
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.fetcher.timeout, Duration::from_secs(30));
    }
}
