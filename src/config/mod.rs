use anyhow::Context;
use directories::ProjectDirs;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

pub mod defaults;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ytm: YtmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YtmConfig {
    /// Path to a Netscape cookie file (yt-dlp compatible).
    pub cookies: Option<PathBuf>,
    /// Use yt-dlp `--cookies-from-browser` (e.g. "chrome", "firefox", "brave").
    pub cookies_from_browser: Option<String>,
    /// User agents sent upstream; one is picked at random per client/resolve.
    pub user_agents: Vec<String>,
    /// yt-dlp `player_client` values tried in order when cookies are missing or rejected.
    pub player_clients: Vec<String>,
    pub search_limit: usize,
    /// yt-dlp executable.
    pub yt_dlp: PathBuf,
    pub resolve_timeout_secs: u64,
}

/// Where upstream cookies come from, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    Browser(String),
    File(PathBuf),
    /// Raw Netscape cookie text (from `YOUTUBE_COOKIES`).
    Text(String),
    None,
}

impl YtmConfig {
    pub fn user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(defaults::DEFAULT_USER_AGENT)
    }

    pub fn capped_search_limit(&self) -> usize {
        self.search_limit.min(defaults::MAX_SEARCH_RESULTS)
    }

    /// `local_file` is the working-directory cookie file, passed in so tests
    /// don't depend on the process cwd.
    pub fn cookie_source(&self, local_file: &Path, env_cookies: Option<String>) -> CookieSource {
        if let Some(browser) = &self.cookies_from_browser {
            return CookieSource::Browser(browser.clone());
        }
        if let Some(path) = &self.cookies {
            if path.exists() {
                return CookieSource::File(path.clone());
            }
            tracing::warn!(path = %path.display(), "configured cookie file not found");
        }
        if local_file.exists() {
            return CookieSource::File(local_file.to_path_buf());
        }
        match env_cookies {
            Some(text) if !text.trim().is_empty() => CookieSource::Text(text),
            _ => CookieSource::None,
        }
    }
}

impl Config {
    /// Applies `PORT`, `HOST` and `YTDLP_PATH` through the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT {port:?}"))?;
        }
        if let Some(host) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            self.server.host = host
                .trim()
                .parse()
                .with_context(|| format!("invalid HOST {host:?}"))?;
        }
        if let Some(path) = lookup("YTDLP_PATH").filter(|v| !v.trim().is_empty()) {
            self.ytm.yt_dlp = PathBuf::from(path.trim());
        }
        Ok(())
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj =
        ProjectDirs::from("dev", "audify", "audify").context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        if override_path.is_some() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return Ok(defaults::defaults());
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = defaults::defaults();
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.ytm.search_limit, 15);
        assert_eq!(cfg.ytm.player_clients, vec!["android", "ios"]);
        assert_eq!(cfg.ytm.user_agent(), defaults::DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_search_limit_is_capped() {
        let mut cfg = defaults::defaults();
        cfg.ytm.search_limit = 50;
        assert_eq!(cfg.ytm.capped_search_limit(), defaults::MAX_SEARCH_RESULTS);
        cfg.ytm.search_limit = 5;
        assert_eq!(cfg.ytm.capped_search_limit(), 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[server]
port = 8080

[ytm]
player_clients = ["tv", "web"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.server.host.is_unspecified());
        assert_eq!(cfg.ytm.player_clients, vec!["tv", "web"]);
        assert_eq!(cfg.ytm.search_limit, 15);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = defaults::defaults();
        cfg.apply_env(env(&[
            ("PORT", "10000"),
            ("HOST", "127.0.0.1"),
            ("YTDLP_PATH", "/opt/yt-dlp"),
        ]))
        .unwrap();
        assert_eq!(cfg.server.port, 10000);
        assert_eq!(cfg.server.host.to_string(), "127.0.0.1");
        assert_eq!(cfg.ytm.yt_dlp, PathBuf::from("/opt/yt-dlp"));
    }

    #[test]
    fn test_env_invalid_port() {
        let mut cfg = defaults::defaults();
        assert!(cfg.apply_env(env(&[("PORT", "http")])).is_err());
    }

    #[test]
    fn test_load_missing_override_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[ytm]\nsearch_limit = 5\n").unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.ytm.search_limit, 5);
    }

    #[test]
    fn test_cookie_source_priority() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("cookies.txt");
        let mut ytm = YtmConfig::default();

        assert_eq!(ytm.cookie_source(&local, None), CookieSource::None);
        assert_eq!(
            ytm.cookie_source(&local, Some("text".into())),
            CookieSource::Text("text".into())
        );

        fs::write(&local, "").unwrap();
        assert_eq!(
            ytm.cookie_source(&local, Some("text".into())),
            CookieSource::File(local.clone())
        );

        ytm.cookies = Some(dir.path().join("missing.txt"));
        assert_eq!(ytm.cookie_source(&local, None), CookieSource::File(local.clone()));

        ytm.cookies_from_browser = Some("firefox".into());
        assert_eq!(
            ytm.cookie_source(&local, None),
            CookieSource::Browser("firefox".into())
        );
    }
}
