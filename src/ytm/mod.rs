pub mod api;
pub mod auth;
pub mod models;
pub mod resolve;

use crate::config::CookieSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

pub use resolve::{ResolveError, ResolvedAudio};

/// Song search backed by the YouTube Music catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search_songs(&self, query: &str, limit: usize) -> anyhow::Result<Vec<models::Track>>;
}

/// Turns a video id into a direct, fetchable audio URL.
#[async_trait]
pub trait AudioResolver: Send + Sync {
    /// Tries extraction strategies starting at index `from`.
    async fn resolve_from(&self, video_id: &str, from: usize) -> Result<ResolvedAudio, ResolveError>;

    async fn resolve(&self, video_id: &str) -> Result<ResolvedAudio, ResolveError> {
        self.resolve_from(video_id, 0).await
    }
}

/// Cookies available to both the catalog client and yt-dlp.
#[derive(Debug, Default)]
pub struct Credentials {
    cookie_file: Option<PathBuf>,
    cookies_from_browser: Option<String>,
    // Keeps the env-provided cookie file on disk for the lifetime of the server.
    _temp: Option<TempPath>,
}

impl Credentials {
    pub fn from_source(source: CookieSource) -> anyhow::Result<Self> {
        let creds = match source {
            CookieSource::Browser(browser) => Self {
                cookies_from_browser: Some(browser),
                ..Self::default()
            },
            CookieSource::File(path) => Self {
                cookie_file: Some(path),
                ..Self::default()
            },
            CookieSource::Text(text) => {
                let temp = auth::write_cookie_text(&text)?;
                Self {
                    cookie_file: Some(temp.to_path_buf()),
                    cookies_from_browser: None,
                    _temp: Some(temp),
                }
            }
            CookieSource::None => Self::default(),
        };
        Ok(creds)
    }

    pub fn cookie_file(&self) -> Option<&Path> {
        self.cookie_file.as_deref()
    }

    pub fn cookies_from_browser(&self) -> Option<&str> {
        self.cookies_from_browser.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.cookie_file.is_none() && self.cookies_from_browser.is_none()
    }

    /// Parsed cookies for signing catalog requests. Browser cookies are only
    /// reachable through yt-dlp, so they yield `None` here.
    pub fn auth_state(&self) -> anyhow::Result<Option<auth::AuthState>> {
        match &self.cookie_file {
            Some(p) => Ok(Some(auth::load_netscape_cookies(p)?)),
            None => Ok(None),
        }
    }
}
