//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Default SQLite location used when neither CATALOG_DB_URL nor DATABASE_URL is set.
pub const DEFAULT_DB_URL: &str = "sqlite://data/catalog.db";

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to Cargo project root
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes and 0/false/off/no (case-insensitive).
/// Anything else keeps the default.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => true,
            "0" | "false" | "off" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Catalog database URL (tries specific -> generic -> default).
pub fn db_url() -> String {
    init_env();
    for k in ["CATALOG_DB_URL", "DATABASE_URL"] {
        if let Some(v) = env_opt(k) {
            info!(target = "env", source = k, "using configured catalog database");
            return v;
        }
    }
    DEFAULT_DB_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_keeps_default_for_garbage() {
        std::env::set_var("GAME_CATALOG_TEST_FLAG", "maybe");
        assert!(env_flag("GAME_CATALOG_TEST_FLAG", true));
        assert!(!env_flag("GAME_CATALOG_TEST_FLAG", false));
        std::env::set_var("GAME_CATALOG_TEST_FLAG", "OFF");
        assert!(!env_flag("GAME_CATALOG_TEST_FLAG", true));
        std::env::remove_var("GAME_CATALOG_TEST_FLAG");
    }

    #[test]
    fn parse_falls_back_on_bad_input() {
        std::env::set_var("GAME_CATALOG_TEST_NUM", " 42 ");
        assert_eq!(env_parse::<u64>("GAME_CATALOG_TEST_NUM", 7), 42);
        std::env::set_var("GAME_CATALOG_TEST_NUM", "forty-two");
        assert_eq!(env_parse::<u64>("GAME_CATALOG_TEST_NUM", 7), 7);
        std::env::remove_var("GAME_CATALOG_TEST_NUM");
        assert!(env_opt("GAME_CATALOG_TEST_NUM").is_none());
    }
}
