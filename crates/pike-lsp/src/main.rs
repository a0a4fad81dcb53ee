//! pike-lsp binary entry point.
//!
//! Stdout is the protocol channel; all logging goes to stderr, controlled
//! by the `PIKE_LSP_LOG` environment variable (standard `tracing`
//! EnvFilter syntax, default `info`).

use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("PIKE_LSP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pike-lsp starting");
    pike_lsp::run_stdio().await
}
