use prospera_core::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber from the loaded configuration.
/// Called once by the host before handling traffic; a second call is a
/// logged no-op rather than a panic.
pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    let result = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };

    if let Err(error) = result {
        tracing::debug!(error = %error, "tracing subscriber was already installed");
    }
}
