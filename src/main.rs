mod config;
mod server;
mod ytm;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use ytm::{AudioResolver, Catalog};

#[derive(Debug, Parser)]
#[command(name = "audify", version, about = "Music search and audio streaming backend")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Override the listen port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Search songs and print them to stdout (headless).
    Search {
        query: String,
    },
    /// Resolve a video id to its direct audio URL (headless).
    Resolve {
        video_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref()).context("load config")?;
    cfg.apply_env(|k| std::env::var(k).ok())
        .context("apply environment overrides")?;

    let source = cfg.ytm.cookie_source(
        Path::new(config::defaults::LOCAL_COOKIE_FILE),
        std::env::var("YOUTUBE_COOKIES").ok(),
    );
    match &source {
        config::CookieSource::None => {
            tracing::info!(clients = ?cfg.ytm.player_clients, "no cookies found, rotating player clients")
        }
        config::CookieSource::Text(_) => tracing::info!("using cookies from YOUTUBE_COOKIES"),
        other => tracing::info!(source = ?other, "using cookies"),
    }
    let credentials = ytm::Credentials::from_source(source).context("prepare cookies")?;

    let auth = credentials.auth_state().context("load cookies")?;
    if let Some(a) = &auth
        && !a.is_empty()
    {
        tracing::debug!(cookies = a.len(), signed = a.sapisid.is_some(), "loaded cookie jar");
    }
    let catalog = ytm::api::YtmClient::new(cfg.ytm.user_agent(), auth)?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            let addr = SocketAddr::new(cfg.server.host, port.unwrap_or(cfg.server.port));
            let resolver = ytm::resolve::YtDlpResolver::new(cfg.ytm.clone(), credentials);
            let state = server::AppState::new(
                Arc::new(catalog),
                Arc::new(resolver),
                cfg.ytm.search_limit,
            )?;
            server::serve(addr, state).await?;
        }
        Command::Search { query } => {
            let tracks = catalog
                .search_songs(&query, cfg.ytm.capped_search_limit())
                .await?;
            print_tracks(&tracks);
        }
        Command::Resolve { video_id } => {
            if !ytm::resolve::is_valid_video_id(&video_id) {
                anyhow::bail!("invalid video id {video_id:?}");
            }
            let resolver = ytm::resolve::YtDlpResolver::new(cfg.ytm.clone(), credentials);
            let resolved = resolver.resolve(&video_id).await?;
            println!(
                "{}  (strategy={}, mime={})",
                resolved.url,
                resolver.strategies()[resolved.strategy],
                resolved.mime_type.as_deref().unwrap_or("unknown")
            );
        }
    }

    Ok(())
}

fn print_tracks(tracks: &[ytm::models::Track]) {
    for (i, t) in tracks.iter().enumerate() {
        let artists = if t.artists.is_empty() {
            "".to_string()
        } else {
            format!(" - {}", t.artists.join(", "))
        };
        let duration = t
            .duration_text
            .as_deref()
            .map(|d| format!(" [{d}]"))
            .unwrap_or_default();
        println!(
            "{:02}. {}{}{}  (video_id={})",
            i + 1,
            t.title,
            artists,
            duration,
            t.video_id
        );
    }
}
