use serde::{Deserialize, Serialize};

/// Id the server reports from `/getCurrentSongId` when nothing is playing.
pub const NO_SONG_ID: i64 = -1;

/// Placeholder title/artist of the sentinel song.
const NO_SONG_TEXT: &str = "NONE";

pub const CURRENT_SONG_ID_PATH: &str = "getCurrentSongId";
pub const SONG_DETAILS_PATH: &str = "getSong";

/// A song as reported by `/getSong`. Extra fields in the response are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    #[serde(rename = "SongId")]
    pub id: i64,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Artist")]
    pub artist: String,
}

impl Song {
    pub fn new(id: i64, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// The "no song" sentinel: nothing logged yet, or nothing playing.
    /// Only ever compared against, never written to the history.
    pub fn none() -> Self {
        Self::new(NO_SONG_ID, NO_SONG_TEXT, NO_SONG_TEXT)
    }

    pub fn is_none(&self) -> bool {
        self.id == NO_SONG_ID
    }

    /// Songs are the same track iff their server ids match; text is ignored.
    pub fn same_track(&self, other: &Song) -> bool {
        self.id == other.id
    }
}

impl Default for Song {
    fn default() -> Self {
        Self::none()
    }
}

/// Parse the plain-text body of `/getCurrentSongId`.
///
/// Returns `Ok(None)` for the "nothing playing" id.
pub fn parse_current_song_id(body: &str) -> Result<Option<i64>, std::num::ParseIntError> {
    let id: i64 = body.trim().parse()?;
    Ok((id != NO_SONG_ID).then_some(id))
}

/// Relative URL of the detail request for `id`.
pub fn song_details_path(id: i64) -> String {
    format!("{}?songId={}", SONG_DETAILS_PATH, id)
}
