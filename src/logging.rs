use tracing_subscriber::{
    fmt, fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_LOG_DIRECTIVES: &str = "info,fieldforge=info,sqlx=warn";

/// Installs the global subscriber. Logs go to stderr so reports and `--json`
/// output on stdout stay machine-readable. `RUST_LOG` overrides the default
/// directives.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        if verbose {
            EnvFilter::try_new("debug,fieldforge=debug,sqlx=warn")
        } else {
            EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES)
        }
    })?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339()),
        )
        .try_init()?;

    Ok(())
}
