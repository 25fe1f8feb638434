use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter for the importer when `RUST_LOG` is unset. sqlx logs every
/// statement at info, which drowns the per-stage summaries.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Install the global fmt subscriber for catalog binaries.
///
/// `verbose` lowers the crate's own level to debug without touching the
/// dependency levels, so skipped lines and reconcile deltas become visible.
pub fn init_tracing(verbose: bool) -> Result<(), anyhow::Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new(format!("{DEFAULT_FILTER},game_catalog=debug")),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
