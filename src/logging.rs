use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the diagnostics subscriber.
///
/// Diagnostics go to stderr so they never mix with the report on stdout.
/// `RUST_LOG` picks the level; without it only warnings and errors show.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_reports_error() {
        // Another test may have installed a subscriber first
        let _ = init();
        assert!(init().is_err());
    }
}
