use serde::Deserialize;
use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Directive added on top of `RUST_LOG`.
    #[serde(default = "default_directive")]
    pub directive: String,
}

fn default_directive() -> String {
    "sarfi_service=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            directive: default_directive(),
        }
    }
}

pub fn init_tracing(cfg: &LoggingConfig) {
    let directive = cfg
        .directive
        .parse::<Directive>()
        .unwrap_or_else(|_| Directive::from(LevelFilter::INFO));
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match cfg.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().flatten_event(true).init(),
    }
}
