use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub domain: String,
    pub path: String,
    pub name: String,
    pub value: String,
    pub secure: bool,
    pub expires_utc: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuthState {
    cookies: Vec<Cookie>,
    pub cookie_header: String,
    pub sapisid: Option<String>,
}

impl AuthState {
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

pub fn load_netscape_cookies(path: &Path) -> anyhow::Result<AuthState> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_netscape_cookies(&raw))
}

pub fn parse_netscape_cookies(raw: &str) -> AuthState {
    let mut cookies = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        // `#HttpOnly_` prefixed lines are real cookies, not comments.
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Netscape format: domain \t flag \t path \t secure \t expiration \t name \t value
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 7 {
            continue;
        }

        cookies.push(Cookie {
            domain: parts[0].to_string(),
            path: parts[2].to_string(),
            secure: parts[3].eq_ignore_ascii_case("TRUE"),
            expires_utc: parts[4].parse::<i64>().ok(),
            name: parts[5].to_string(),
            value: parts[6].to_string(),
        });
    }

    let cookie_header = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");

    // For signed requests, YouTube uses SAPISID (sometimes __Secure-3PAPISID works too).
    let sapisid = cookies
        .iter()
        .find(|c| c.name == "SAPISID")
        .map(|c| c.value.clone())
        .or_else(|| {
            cookies
                .iter()
                .find(|c| c.name == "__Secure-3PAPISID")
                .map(|c| c.value.clone())
        });

    AuthState {
        cookies,
        cookie_header,
        sapisid,
    }
}

/// Writes cookie text taken from the environment to a private temp file so
/// yt-dlp can read it with `--cookies`. The file is removed when the returned
/// path is dropped.
pub fn write_cookie_text(raw: &str) -> anyhow::Result<TempPath> {
    // Hosting dashboards often store multi-line values with literal "\n".
    let text = if !raw.contains('\n') && raw.contains("\\n") {
        raw.replace("\\t", "\t").replace("\\n", "\n")
    } else {
        raw.to_string()
    };

    let mut file = tempfile::Builder::new()
        .prefix("audify-cookies-")
        .suffix(".txt")
        .tempfile()
        .context("create cookie temp file")?;
    file.write_all(text.as_bytes())
        .context("write cookie temp file")?;
    if !text.ends_with('\n') {
        file.write_all(b"\n").context("write cookie temp file")?;
    }
    file.flush().context("flush cookie temp file")?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Netscape HTTP Cookie File\n\
.youtube.com\tTRUE\t/\tTRUE\t1767225600\tSAPISID\tabc123\n\
#HttpOnly_.youtube.com\tTRUE\t/\tTRUE\t1767225600\tLOGIN_INFO\txyz\n\
broken line\n\
.youtube.com\tTRUE\t/\tFALSE\t0\tPREF\tf6=40000000\n";

    #[test]
    fn test_parse_cookies() {
        let auth = parse_netscape_cookies(SAMPLE);
        assert_eq!(auth.len(), 3);
        assert_eq!(auth.sapisid.as_deref(), Some("abc123"));
        assert_eq!(
            auth.cookie_header,
            "SAPISID=abc123; LOGIN_INFO=xyz; PREF=f6=40000000"
        );
        assert!(auth.cookies[0].secure);
        assert!(!auth.cookies[2].secure);
        assert_eq!(auth.cookies[0].expires_utc, Some(1767225600));
    }

    #[test]
    fn test_secure_3papisid_fallback() {
        let raw = ".youtube.com\tTRUE\t/\tTRUE\t0\t__Secure-3PAPISID\tfallback\n";
        let auth = parse_netscape_cookies(raw);
        assert_eq!(auth.sapisid.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_empty_input() {
        let auth = parse_netscape_cookies("# nothing here\n\n");
        assert!(auth.is_empty());
        assert!(auth.cookie_header.is_empty());
        assert!(auth.sapisid.is_none());
    }

    #[test]
    fn test_write_cookie_text_unescapes() {
        let raw = ".youtube.com\\tTRUE\\t/\\tTRUE\\t0\\tSAPISID\\tenv\\n";
        let path = write_cookie_text(raw).unwrap();
        let auth = load_netscape_cookies(&path).unwrap();
        assert_eq!(auth.sapisid.as_deref(), Some("env"));
    }

    #[test]
    fn test_write_cookie_text_removed_on_drop() {
        let path = write_cookie_text(SAMPLE).unwrap();
        let on_disk = path.to_path_buf();
        assert!(on_disk.exists());
        drop(path);
        assert!(!on_disk.exists());
    }
}
