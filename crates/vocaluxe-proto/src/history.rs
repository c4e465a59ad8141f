//! Day-grouped play history.
//!
//! One file per calendar day, named after the date (`Oct-16-2026.txt`), each
//! line a tab-separated record:
//!
//!   HH:MM:SS  title  artist
//!
//! Files are only ever appended to.

use chrono::{DateTime, Local, NaiveDate};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::protocol::Song;

const FILE_DATE_FORMAT: &str = "%b-%d-%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

/// One parsed history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub time: String,
    pub title: String,
    pub artist: String,
}

pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Day file that entries written on `date` go to.
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.txt", date.format(FILE_DATE_FORMAT)))
    }

    /// Create the history directory and today's file if they are missing.
    /// Existing content is left untouched.
    pub async fn prepare(&self, now: DateTime<Local>) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.file_for(now.date_naive());
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(path)
    }

    /// Append one entry for `song`, stamped with `at`. The file is opened and
    /// closed for this single write.
    pub async fn append(&self, song: &Song, at: DateTime<Local>) -> anyhow::Result<PathBuf> {
        let path = self.file_for(at.date_naive());
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        f.write_all(encode_entry(song, at).as_bytes()).await?;
        f.flush().await?;
        info!("[history] {} - {} -> {}", song.artist, song.title, path.display());
        Ok(path)
    }

    /// Entries already recorded in `path`. A missing file has none.
    /// Bytes that are not UTF-8 (hand edits, Latin-1 titles) are replaced.
    pub fn load_entries(path: &Path) -> anyhow::Result<Vec<HistoryEntry>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let content = String::from_utf8_lossy(&bytes);
        Ok(content.lines().filter_map(parse_entry).collect())
    }
}

fn encode_entry(song: &Song, at: DateTime<Local>) -> String {
    format!(
        "{}\t{}\t{}\n",
        at.format(TIME_FORMAT),
        esc(&song.title),
        esc(&song.artist),
    )
}

fn parse_entry(line: &str) -> Option<HistoryEntry> {
    let mut cols = line.splitn(3, '\t');
    let time = cols.next()?;
    let title = cols.next()?;
    let artist = cols.next()?;
    Some(HistoryEntry {
        time: time.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
    })
}

// Keep one song on one three-column line.
fn esc(s: &str) -> String {
    s.replace('\t', " ").replace('\n', " ").replace('\r', "")
}
