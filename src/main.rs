//! Tender Autofill - Entry point
//!
//! Stdio MCP server for differential extraction and filling of tender forms.

use std::path::PathBuf;
use tender_autofill::{run_server_with_config, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn config_from_env() -> ServerConfig {
    let path_var = |name: &str| std::env::var_os(name).map(PathBuf::from);

    ServerConfig {
        resource_dirs: std::env::var("TENDER_AUTOFILL_DIRS")
            .map(|dirs| {
                dirs.split(':')
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        engine_config_path: path_var("TENDER_AUTOFILL_CONFIG"),
        labels_path: path_var("TENDER_AUTOFILL_LABELS"),
        pdfium_dir: path_var("PDFIUM_LIB_DIR"),
        ..ServerConfig::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the MCP transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tender_autofill=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config_from_env();
    tracing::info!(
        resource_dirs = config.resource_dirs.len(),
        "Starting tender autofill server"
    );

    run_server_with_config(config).await
}
