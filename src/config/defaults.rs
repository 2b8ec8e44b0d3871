use super::{Config, ServerConfig, YtmConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SEARCH_LIMIT: usize = 15;
/// Hard cap on search results regardless of configuration.
pub const MAX_SEARCH_RESULTS: usize = 15;
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 45;

/// Cookie file picked up from the working directory when nothing else is configured.
pub const LOCAL_COOKIE_FILE: &str = "cookies.txt";

pub fn defaults() -> Config {
    Config {
        server: ServerConfig::default(),
        ytm: YtmConfig::default(),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for YtmConfig {
    fn default() -> Self {
        Self {
            cookies: None,
            cookies_from_browser: None,
            user_agents: vec![DEFAULT_USER_AGENT.to_string()],
            player_clients: vec!["android".to_string(), "ios".to_string()],
            search_limit: DEFAULT_SEARCH_LIMIT,
            yt_dlp: PathBuf::from("yt-dlp"),
            resolve_timeout_secs: DEFAULT_RESOLVE_TIMEOUT_SECS,
        }
    }
}
