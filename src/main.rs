//! Entry point for the lofi-archive binary.
//!
//! `serve` runs the HTTP resolver against a local or remote attachment store;
//! `cat` pipes one entry of a local archive to stdout through the same
//! streaming reader.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lofi_archive::cli::{CatArgs, Command, ServeArgs};
use lofi_archive::zip::{self, Lookup};
use lofi_archive::{AppState, AttachmentLocator, Cli, HttpAttachmentStore, LocalAttachmentStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Cat(args) => cat(args).await,
    }
}

/// `RUST_LOG` wins when set; otherwise `-v` raises the default `info`.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn serve(args: ServeArgs) -> Result<()> {
    let locator: Arc<dyn AttachmentLocator> = if args.is_http_store() {
        let store = HttpAttachmentStore::new(args.store.clone())?.with_service_token(args.token);
        Arc::new(store)
    } else {
        let store = LocalAttachmentStore::new(Path::new(&args.store))?.with_read_token(args.token);
        Arc::new(store)
    };

    let app = lofi_archive::app(AppState::new(locator));
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(addr = %args.listen, store = %args.store, "lofi-archive listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("server error")
}

async fn cat(args: CatArgs) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let file = File::open(&args.archive)
            .with_context(|| format!("failed to open {}", args.archive.display()))?;

        let mut entry = match zip::open(file, &args.inner_path)? {
            Lookup::Found(entry) => entry,
            Lookup::NotFound(path) => {
                anyhow::bail!("{path} not found in {}", args.archive.display())
            }
        };

        let mut stdout = io::stdout().lock();
        let copied = io::copy(&mut entry, &mut stdout)?;
        stdout.flush()?;
        tracing::debug!(entry = entry.name(), bytes = copied, "entry written to stdout");
        Ok(())
    })
    .await?
}
