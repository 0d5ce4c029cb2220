//! Logging and metrics setup for the binary.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_METRICS_TEXTFILE: &str = "METRICS_TEXTFILE";

const DEFAULT_FILTER: &str = "feed_harvester=info,harvest=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. Output goes to stderr so stdout
/// stays machine-readable. Calling it twice is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
}

/// Prometheus exposition written to a file at the end of a run, for the
/// node-exporter textfile collector.
pub struct MetricsTextfile {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsTextfile {
    /// `None` unless `METRICS_TEXTFILE` is set.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(ENV_METRICS_TEXTFILE) {
            Ok(p) if !p.trim().is_empty() => Self::install(p.trim()).map(Some),
            _ => Ok(None),
        }
    }

    /// Install the global recorder. Only one recorder may exist per process.
    pub fn install(path: impl Into<PathBuf>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        Ok(Self {
            handle,
            path: path.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn write(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating metrics dir {}", dir.display()))?;
        }
        fs::write(&self.path, self.render())
            .with_context(|| format!("writing metrics to {}", self.path.display()))
    }
}
