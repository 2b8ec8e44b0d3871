use crate::ytm::auth::AuthState;
use crate::ytm::models::Track;
use crate::ytm::Catalog;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT,
};
use serde_json::json;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

const YTM_ORIGIN: &str = "https://music.youtube.com";

/// Search `params` that restrict results to the "Songs" shelf.
const SONGS_FILTER_PARAMS: &str = "EgWKAQIIAWoKEAkQBRAKEAMQBA%3D%3D";

const SEPARATOR: &str = " • ";

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    auth: Option<AuthState>,
    bootstrap: OnceCell<Bootstrap>,
}

#[derive(Debug, Clone)]
pub struct YtmClient {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone)]
struct Bootstrap {
    api_key: String,
    client_version: String,
    visitor_data: Option<String>,
}

impl YtmClient {
    pub fn new(user_agent: &str, auth: Option<AuthState>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).context("invalid user agent")?,
        );
        headers.insert(ORIGIN, HeaderValue::from_static(YTM_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static("https://music.youtube.com/"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(a) = &auth
            && !a.cookie_header.is_empty()
        {
            headers.insert(COOKIE, HeaderValue::from_str(&a.cookie_header)?);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                auth,
                bootstrap: OnceCell::new(),
            }),
        })
    }

    pub async fn search_tracks(&self, query: &str) -> anyhow::Result<Vec<Track>> {
        let v = self.search_raw(query).await?;
        Ok(extract_tracks_from_search(&v))
    }

    pub async fn search_raw(&self, query: &str) -> anyhow::Result<serde_json::Value> {
        let b = self.bootstrap().await?;

        let body = json!({
            "context": {
                "client": {
                    "clientName": "WEB_REMIX",
                    "clientVersion": b.client_version,
                    "hl": "en",
                }
            },
            "query": query,
            "params": SONGS_FILTER_PARAMS
        });

        let v: serde_json::Value = self
            .innertube_post("search", &b)
            .json(&body)
            .send()
            .await
            .context("send search request")?
            .error_for_status()
            .context("search http status")?
            .json()
            .await
            .context("parse search json")?;
        Ok(v)
    }

    async fn bootstrap(&self) -> anyhow::Result<Bootstrap> {
        self.inner
            .bootstrap
            .get_or_try_init(|| async {
                let html = self
                    .inner
                    .http
                    .get("https://music.youtube.com/")
                    .send()
                    .await
                    .context("fetch music.youtube.com for bootstrap")?
                    .error_for_status()
                    .context("bootstrap http status")?
                    .text()
                    .await
                    .context("read bootstrap html")?;

                let api_key = parse_ytcfg_value(&html, "INNERTUBE_API_KEY")
                    .context("parse INNERTUBE_API_KEY")?;
                let client_version = parse_ytcfg_value(&html, "INNERTUBE_CLIENT_VERSION")
                    .context("parse INNERTUBE_CLIENT_VERSION")?;
                let visitor_data = parse_ytcfg_value(&html, "VISITOR_DATA");

                tracing::info!(%client_version, "bootstrapped YouTube Music client");
                Ok(Bootstrap {
                    api_key,
                    client_version,
                    visitor_data,
                })
            })
            .await
            .cloned()
    }

    fn innertube_post(&self, path: &str, b: &Bootstrap) -> reqwest::RequestBuilder {
        let url = format!(
            "{YTM_ORIGIN}/youtubei/v1/{path}?key={}&prettyPrint=false",
            b.api_key
        );

        let mut rb = self
            .inner
            .http
            .post(url)
            .header("X-Youtube-Client-Name", "67")
            .header("X-Youtube-Client-Version", b.client_version.as_str())
            .header(
                "X-Youtube-Bootstrap-Logged-In",
                if self.inner.auth.is_some() {
                    "true"
                } else {
                    "false"
                },
            );

        if let Some(v) = b.visitor_data.as_deref() {
            rb = rb.header("X-Goog-Visitor-Id", v);
        }

        // The hash embeds a timestamp, so it is signed per request.
        if let Some(authz) = self.authorization_at(unix_now()) {
            rb = rb.header(AUTHORIZATION, authz);
        }

        rb
    }

    fn authorization_at(&self, ts: u64) -> Option<String> {
        let sapisid = self.inner.auth.as_ref()?.sapisid.as_deref()?;
        Some(sapisid_hash(ts, YTM_ORIGIN, sapisid))
    }
}

#[async_trait]
impl Catalog for YtmClient {
    async fn search_songs(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Track>> {
        let mut tracks = self.search_tracks(query).await?;
        tracks.truncate(limit);
        Ok(tracks)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn sapisid_hash(ts: u64, origin: &str, sapisid: &str) -> String {
    let input = format!("{ts} {sapisid} {origin}");
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    let out = hasher.finalize();
    format!("SAPISIDHASH {ts}_{}", hex::encode(out))
}

fn extract_tracks_from_search(v: &serde_json::Value) -> Vec<Track> {
    // Best-effort extraction; YouTube's structure changes often.
    // We scan for `musicResponsiveListItemRenderer` nodes that contain a `watchEndpoint.videoId`.
    let mut out = Vec::new();
    scan_value(v, &mut |node| {
        let r = node.get("musicResponsiveListItemRenderer")?;
        parse_list_item(r)
    }, &mut out);

    let mut seen = HashSet::new();
    out.retain(|t| seen.insert(t.video_id.clone()));
    out
}

fn parse_list_item(r: &serde_json::Value) -> Option<Track> {
    let video_id = extract_video_id_from_item(r)?;

    let title = r
        .pointer("/flexColumns/0/musicResponsiveListItemFlexColumnRenderer/text/runs/0/text")
        .and_then(|x| x.as_str())
        .unwrap_or("Unknown title")
        .to_string();

    let byline = r
        .pointer("/flexColumns/1/musicResponsiveListItemFlexColumnRenderer/text/runs")
        .and_then(|x| x.as_array())
        .map(|runs| parse_byline(runs))
        .unwrap_or_default();

    // Some layouts put the duration in a fixed column instead of the byline.
    let duration_text = byline.duration.or_else(|| {
        r.pointer("/fixedColumns/0/musicResponsiveListItemFixedColumnRenderer/text/runs/0/text")
            .and_then(|x| x.as_str())
            .filter(|t| parse_duration_text(t).is_some())
            .map(str::to_string)
    });

    let thumbnail_url = r
        .pointer("/thumbnail/musicThumbnailRenderer/thumbnail/thumbnails")
        .and_then(|x| x.as_array())
        .and_then(|thumbs| thumbs.last())
        .and_then(|t| t.get("url"))
        .and_then(|u| u.as_str())
        .map(str::to_string);

    Some(Track {
        video_id,
        title,
        artists: byline.artists,
        album: byline.album,
        duration_seconds: duration_text.as_deref().and_then(parse_duration_text),
        duration_text,
        thumbnail_url,
    })
}

#[derive(Debug, Default)]
struct Byline {
    artists: Vec<String>,
    album: Option<String>,
    duration: Option<String>,
}

/// Splits the second flex column ("Artist & Artist • Album • 3:45") into parts.
fn parse_byline(runs: &[serde_json::Value]) -> Byline {
    let mut byline = Byline::default();
    let mut group = 0;

    for run in runs {
        let Some(text) = run.get("text").and_then(|t| t.as_str()) else {
            continue;
        };
        if text == SEPARATOR {
            group += 1;
            continue;
        }
        if matches!(text, " & " | ", ") {
            continue;
        }

        match page_type(run) {
            Some("MUSIC_PAGE_TYPE_ARTIST") | Some("MUSIC_PAGE_TYPE_USER_CHANNEL") => {
                byline.artists.push(text.to_string());
            }
            Some("MUSIC_PAGE_TYPE_ALBUM") => byline.album = Some(text.to_string()),
            _ if parse_duration_text(text).is_some() => byline.duration = Some(text.to_string()),
            // Unlinked names in the leading group are artists, unless it's a type label.
            None if group == 0 && !matches!(text, "Song" | "Video") => {
                byline.artists.push(text.to_string());
            }
            _ => {}
        }
    }

    byline
}

fn page_type(run: &serde_json::Value) -> Option<&str> {
    run.pointer(
        "/navigationEndpoint/browseEndpoint/browseEndpointContextSupportedConfigs/browseEndpointContextMusicConfig/pageType",
    )
    .and_then(|x| x.as_str())
}

/// Parse duration text like "3:45" or "1:23:45" into seconds
fn parse_duration_text(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.split(':').collect();
    match parts.len() {
        2 => {
            // MM:SS
            let mins: u32 = parts[0].parse().ok()?;
            let secs: u32 = parts[1].parse().ok()?;
            mins.checked_mul(60)?.checked_add(secs)
        }
        3 => {
            // HH:MM:SS
            let hours: u32 = parts[0].parse().ok()?;
            let mins: u32 = parts[1].parse().ok()?;
            let secs: u32 = parts[2].parse().ok()?;
            hours
                .checked_mul(3600)?
                .checked_add(mins.checked_mul(60)?)?
                .checked_add(secs)
        }
        _ => None,
    }
}

fn extract_video_id_from_item(r: &serde_json::Value) -> Option<String> {
    // Seen variants:
    // - musicResponsiveListItemRenderer.playlistItemData.videoId
    // - musicResponsiveListItemRenderer.navigationEndpoint.watchEndpoint.videoId
    // - musicResponsiveListItemRenderer.flexColumns[0]...runs[0].navigationEndpoint.watchEndpoint.videoId
    r.pointer("/playlistItemData/videoId")
        .or_else(|| r.pointer("/navigationEndpoint/watchEndpoint/videoId"))
        .or_else(|| {
            r.pointer(
                "/flexColumns/0/musicResponsiveListItemFlexColumnRenderer/text/runs/0/navigationEndpoint/watchEndpoint/videoId",
            )
        })
        .and_then(|x| x.as_str())
        .map(|s| s.to_string())
}

fn parse_ytcfg_value(html: &str, key: &str) -> Option<String> {
    // We look for `"KEY":"value"` occurrences in the initial HTML ytcfg payload.
    let needle = format!("{key}\":\"");
    let idx = html.find(&needle)?;
    let start = idx + needle.len();
    let rest = &html[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn scan_value<F>(v: &serde_json::Value, f: &mut F, out: &mut Vec<Track>)
where
    F: FnMut(&serde_json::Value) -> Option<Track>,
{
    if let Some(t) = f(v) {
        out.push(t);
    }
    match v {
        serde_json::Value::Array(a) => {
            for x in a {
                scan_value(x, f, out);
            }
        }
        serde_json::Value::Object(o) => {
            for (_, x) in o {
                scan_value(x, f, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn run(text: &str) -> Value {
        json!({ "text": text })
    }

    fn linked(text: &str, page: &str) -> Value {
        json!({
            "text": text,
            "navigationEndpoint": {
                "browseEndpoint": {
                    "browseId": "UCxyz",
                    "browseEndpointContextSupportedConfigs": {
                        "browseEndpointContextMusicConfig": { "pageType": page }
                    }
                }
            }
        })
    }

    fn song_item(video_id: &str, title: &str, byline: Vec<Value>) -> Value {
        json!({
            "musicResponsiveListItemRenderer": {
                "thumbnail": { "musicThumbnailRenderer": { "thumbnail": { "thumbnails": [
                    { "url": format!("https://i.ytimg.com/{video_id}/small.jpg"), "width": 60 },
                    { "url": format!("https://i.ytimg.com/{video_id}/large.jpg"), "width": 120 }
                ]}}},
                "flexColumns": [
                    { "musicResponsiveListItemFlexColumnRenderer": { "text": { "runs": [
                        { "text": title, "navigationEndpoint": { "watchEndpoint": { "videoId": video_id } } }
                    ]}}},
                    { "musicResponsiveListItemFlexColumnRenderer": { "text": { "runs": byline }}}
                ],
                "playlistItemData": { "videoId": video_id }
            }
        })
    }

    fn search_response(items: Vec<Value>) -> Value {
        json!({
            "contents": { "tabbedSearchResultsRenderer": { "tabs": [ { "tabRenderer": { "content": {
                "sectionListRenderer": { "contents": [
                    { "musicShelfRenderer": { "contents": items } }
                ]}
            }}}]}}
        })
    }

    #[test]
    fn test_extract_song() {
        let v = search_response(vec![song_item(
            "dQw4w9WgXcQ",
            "Never Gonna Give You Up",
            vec![
                linked("Rick Astley", "MUSIC_PAGE_TYPE_ARTIST"),
                run(SEPARATOR),
                linked("Whenever You Need Somebody", "MUSIC_PAGE_TYPE_ALBUM"),
                run(SEPARATOR),
                run("3:33"),
            ],
        )]);

        let tracks = extract_tracks_from_search(&v);
        assert_eq!(tracks.len(), 1);
        let t = &tracks[0];
        assert_eq!(t.video_id, "dQw4w9WgXcQ");
        assert_eq!(t.title, "Never Gonna Give You Up");
        assert_eq!(t.artists, vec!["Rick Astley"]);
        assert_eq!(t.album.as_deref(), Some("Whenever You Need Somebody"));
        assert_eq!(t.duration_text.as_deref(), Some("3:33"));
        assert_eq!(t.duration_seconds, Some(213));
        assert_eq!(
            t.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/dQw4w9WgXcQ/large.jpg")
        );
    }

    #[test]
    fn test_multiple_and_unlinked_artists() {
        let runs = vec![
            run("Song"),
            run(SEPARATOR),
            linked("A", "MUSIC_PAGE_TYPE_ARTIST"),
            run(" & "),
            linked("B", "MUSIC_PAGE_TYPE_ARTIST"),
            run(SEPARATOR),
            run("4:01"),
        ];
        let b = parse_byline(&runs);
        assert_eq!(b.artists, vec!["A", "B"]);
        assert_eq!(b.duration.as_deref(), Some("4:01"));

        let b = parse_byline(&[run("Local Band"), run(SEPARATOR), run("1:02:03")]);
        assert_eq!(b.artists, vec!["Local Band"]);
        assert!(b.album.is_none());
        assert_eq!(b.duration.as_deref(), Some("1:02:03"));
    }

    #[test]
    fn test_dedupes_and_skips_items_without_video() {
        let no_video = json!({ "musicResponsiveListItemRenderer": { "flexColumns": [] } });
        let v = search_response(vec![
            song_item("a", "One", vec![run("X")]),
            no_video,
            song_item("b", "Two", vec![]),
            song_item("a", "One again", vec![run("X")]),
        ]);
        let ids: Vec<_> = extract_tracks_from_search(&v)
            .into_iter()
            .map(|t| t.video_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_fixed_column_duration() {
        let mut item = song_item("c", "Three", vec![linked("Z", "MUSIC_PAGE_TYPE_ARTIST")]);
        item["musicResponsiveListItemRenderer"]["fixedColumns"] = json!([
            { "musicResponsiveListItemFixedColumnRenderer": { "text": { "runs": [ { "text": "2:05" } ] } } }
        ]);
        let t = parse_list_item(&item["musicResponsiveListItemRenderer"]).unwrap();
        assert_eq!(t.duration_text.as_deref(), Some("2:05"));
        assert_eq!(t.duration_seconds, Some(125));
    }

    #[test]
    fn test_parse_duration_text() {
        assert_eq!(parse_duration_text("3:45"), Some(225));
        assert_eq!(parse_duration_text("1:00:00"), Some(3600));
        assert_eq!(parse_duration_text("Album"), None);
        assert_eq!(parse_duration_text("12"), None);
    }

    #[test]
    fn test_parse_duration_text_overflow() {
        assert_eq!(parse_duration_text("99999999:00"), None);
        assert_eq!(parse_duration_text("9999999:00:00"), None);
        assert_eq!(parse_duration_text("4294967295:00"), None);
    }

    #[test]
    fn test_parse_ytcfg_value() {
        let html = r#"ytcfg.set({"INNERTUBE_API_KEY":"AIzaKey","INNERTUBE_CLIENT_VERSION":"1.20250101.01.00"});"#;
        assert_eq!(parse_ytcfg_value(html, "INNERTUBE_API_KEY").as_deref(), Some("AIzaKey"));
        assert_eq!(
            parse_ytcfg_value(html, "INNERTUBE_CLIENT_VERSION").as_deref(),
            Some("1.20250101.01.00")
        );
        assert!(parse_ytcfg_value(html, "VISITOR_DATA").is_none());
    }

    #[test]
    fn test_sapisid_hash() {
        let h = sapisid_hash(1700000000, "https://music.youtube.com", "abc");
        let prefix = "SAPISIDHASH 1700000000_";
        assert!(h.starts_with(prefix));
        assert_eq!(h.len(), prefix.len() + 40);
    }

    fn signed_client() -> YtmClient {
        let auth = crate::ytm::auth::parse_netscape_cookies(
            ".youtube.com\tTRUE\t/\tTRUE\t0\tSAPISID\tsecret\n",
        );
        YtmClient::new("Mozilla/5.0", Some(auth)).unwrap()
    }

    #[test]
    fn test_authorization_signed_per_timestamp() {
        let client = signed_client();
        let first = client.authorization_at(1_700_000_000).unwrap();
        let later = client.authorization_at(1_700_086_400).unwrap();
        assert_ne!(first, later);
        assert!(later.starts_with("SAPISIDHASH 1700086400_"));

        let anonymous = YtmClient::new("Mozilla/5.0", None).unwrap();
        assert!(anonymous.authorization_at(1_700_000_000).is_none());
    }

    #[test]
    fn test_innertube_post_carries_fresh_authorization() {
        let client = signed_client();
        let b = Bootstrap {
            api_key: "key".to_string(),
            client_version: "1.0".to_string(),
            visitor_data: None,
        };
        let req = client.innertube_post("search", &b).build().unwrap();
        let authz = req.headers()[AUTHORIZATION].to_str().unwrap();
        let ts: u64 = authz
            .strip_prefix("SAPISIDHASH ")
            .and_then(|rest| rest.split('_').next())
            .and_then(|t| t.parse().ok())
            .unwrap();
        assert!(unix_now().abs_diff(ts) < 60);
    }

    #[test]
    fn test_client_rejects_bad_user_agent() {
        assert!(YtmClient::new("bad\nagent", None).is_err());
        assert!(YtmClient::new("Mozilla/5.0", None).is_ok());
    }
}
