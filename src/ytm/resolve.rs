use crate::config::YtmConfig;
use crate::ytm::{AudioResolver, Credentials};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio";

/// One way of asking yt-dlp for a stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Cookie file or browser cookies, default player client.
    Cookies,
    /// Anonymous extraction impersonating the given client (android, ios, tv...).
    PlayerClient(String),
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookies => write!(f, "cookies"),
            Self::PlayerClient(c) => write!(f, "player_client={c}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedAudio {
    pub url: String,
    pub mime_type: Option<String>,
    pub filesize: Option<u64>,
    /// Headers yt-dlp says the media host expects (User-Agent, Accept...).
    pub http_headers: Vec<(String, String)>,
    /// Index of the strategy that produced this URL.
    pub strategy: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Upstream refused us: bot check, sign-in wall, HTTP 403.
    Blocked(String),
    /// The video does not exist or cannot be played by anyone.
    NotFound(String),
    Timeout,
    Failed(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked(e) => write!(f, "blocked by upstream: {e}"),
            Self::NotFound(e) => write!(f, "video unavailable: {e}"),
            Self::Timeout => write!(f, "extraction timed out"),
            Self::Failed(e) => write!(f, "extraction failed: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {}

pub fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug)]
pub struct YtDlpResolver {
    config: YtmConfig,
    credentials: Credentials,
    strategies: Vec<Strategy>,
}

impl YtDlpResolver {
    pub fn new(config: YtmConfig, credentials: Credentials) -> Self {
        let mut strategies = Vec::new();
        if !credentials.is_anonymous() {
            strategies.push(Strategy::Cookies);
        }
        strategies.extend(
            config
                .player_clients
                .iter()
                .filter(|c| !c.trim().is_empty())
                .map(|c| Strategy::PlayerClient(c.trim().to_string())),
        );
        Self {
            config,
            credentials,
            strategies,
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    fn build_args(&self, strategy: &Strategy, user_agent: &str, video_id: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-j",
            "--no-playlist",
            "--no-warnings",
            "-f",
            AUDIO_FORMAT,
            "--user-agent",
            user_agent,
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        match strategy {
            Strategy::Cookies => {
                // Prefer browser cookies when configured (no manual export needed).
                if let Some(browser) = self.credentials.cookies_from_browser() {
                    args.push("--cookies-from-browser".into());
                    args.push(browser.into());
                } else if let Some(cookies) = self.credentials.cookie_file() {
                    args.push("--cookies".into());
                    args.push(cookies.as_os_str().to_owned());
                }
            }
            Strategy::PlayerClient(client) => {
                args.push("--extractor-args".into());
                args.push(format!("youtube:player_client={client}").into());
            }
        }

        args.push(format!("https://www.youtube.com/watch?v={video_id}").into());
        args
    }

    async fn run(
        &self,
        index: usize,
        strategy: &Strategy,
        video_id: &str,
    ) -> Result<ResolvedAudio, ResolveError> {
        let user_agent = self.config.user_agent().to_string();
        let mut cmd = Command::new(&self.config.yt_dlp);
        cmd.args(self.build_args(strategy, &user_agent, video_id))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.resolve_timeout_secs);
        let out = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => return Err(ResolveError::Timeout),
            Ok(Err(e)) => return Err(ResolveError::Failed(format!("run yt-dlp: {e}"))),
            Ok(Ok(out)) => out,
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(classify_failure(stderr.trim()));
        }

        let mut resolved = parse_info(&out.stdout, index)?;
        if !resolved
            .http_headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
        {
            resolved
                .http_headers
                .push(("User-Agent".to_string(), user_agent));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl AudioResolver for YtDlpResolver {
    async fn resolve_from(&self, video_id: &str, from: usize) -> Result<ResolvedAudio, ResolveError> {
        let mut last = ResolveError::Failed("no extraction strategies left".to_string());

        for (index, strategy) in self.strategies.iter().enumerate().skip(from) {
            match self.run(index, strategy, video_id).await {
                Ok(resolved) => {
                    tracing::debug!(video_id, %strategy, "resolved audio url");
                    return Ok(resolved);
                }
                Err(e @ ResolveError::NotFound(_)) => {
                    // No client can play a removed video.
                    tracing::warn!(video_id, %strategy, error = %e, "video unavailable");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(video_id, %strategy, error = %e, "extraction strategy failed");
                    last = e;
                }
            }
        }

        Err(last)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    url: Option<String>,
    ext: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

fn parse_info(stdout: &[u8], strategy: usize) -> Result<ResolvedAudio, ResolveError> {
    // yt-dlp prints one JSON document per line; with --no-playlist there is one.
    let line = std::str::from_utf8(stdout)
        .map_err(|e| ResolveError::Failed(format!("decode yt-dlp stdout: {e}")))?
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ResolveError::Failed("yt-dlp printed nothing".to_string()))?;

    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| ResolveError::Failed(format!("parse yt-dlp json: {e}")))?;

    let url = info
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ResolveError::Failed("yt-dlp returned no url".to_string()))?;

    let mut http_headers: Vec<(String, String)> = info.http_headers.into_iter().collect();
    http_headers.sort();

    Ok(ResolvedAudio {
        url,
        mime_type: info.ext.as_deref().and_then(mime_for_ext).map(str::to_string),
        filesize: info
            .filesize
            .or_else(|| info.filesize_approx.map(|f| f as u64)),
        http_headers,
        strategy,
    })
}

fn mime_for_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "m4a" | "mp4" => Some("audio/mp4"),
        "webm" => Some("audio/webm"),
        "mp3" => Some("audio/mpeg"),
        "opus" | "ogg" => Some("audio/ogg"),
        _ => None,
    }
}

fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_ascii_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .unwrap_or(stderr)
        .to_string();

    const BLOCKED: &[&str] = &[
        "sign in to confirm",
        "http error 403",
        "http error 429",
        "not a bot",
        "use --cookies",
    ];
    const NOT_FOUND: &[&str] = &[
        "video unavailable",
        "private video",
        "has been removed",
        "does not exist",
        "is not a valid url",
        "incomplete youtube id",
    ];
    const TIMEOUT: &[&str] = &["timed out", "timeout"];

    if NOT_FOUND.iter().any(|n| lower.contains(n)) {
        ResolveError::NotFound(message)
    } else if TIMEOUT.iter().any(|n| lower.contains(n)) {
        ResolveError::Timeout
    } else if BLOCKED.iter().any(|n| lower.contains(n)) {
        ResolveError::Blocked(message)
    } else {
        ResolveError::Failed(message)
    }
}
