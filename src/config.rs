use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const WORKSPACE_ENV: &str = "CLASSBOOKD_WORKSPACE";
pub const LOG_ENV: &str = "CLASSBOOKD_LOG";

/// Start-up settings read from the environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Workspace opened before the first request, as if `workspace.select`
    /// had been sent.
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            workspace: lookup(WORKSPACE_ENV)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(format!("{}={}", env!("CARGO_CRATE_NAME"), level))
            .unwrap_or_else(|_| EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME"))))
    })
}

/// Console logging on stderr. Stdout carries the IPC responses and must stay
/// clean.
pub fn init_logging() {
    let console_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_filter(log_filter());

    // A second init (tests) is not an error worth reporting.
    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}
