use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub video_id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<u32>,
    /// Duration as YouTube Music displays it, e.g. "3:45".
    pub duration_text: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Flattened song record returned by `/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongSummary {
    pub video_id: String,
    pub title: String,
    pub artist: String,
    pub thumbnail: String,
    pub duration: String,
}

impl From<&Track> for SongSummary {
    fn from(t: &Track) -> Self {
        Self {
            video_id: t.video_id.clone(),
            title: t.title.clone(),
            artist: t
                .artists
                .first()
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: t.thumbnail_url.clone().unwrap_or_default(),
            duration: t.duration_text.clone().unwrap_or_default(),
        }
    }
}
