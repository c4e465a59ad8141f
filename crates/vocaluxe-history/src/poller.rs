//! Poll-and-log loop.
//!
//! ```text
//!   ┌───────────┐  fetch failed   ┌──────────────┐
//!   │ Connected │ ──────────────► │ Disconnected │  (status shown once)
//!   │           │ ◄────────────── │              │
//!   └───────────┘  fetch ok       └──────────────┘  (status reset)
//! ```
//!
//! [`PollState::advance`] holds all the decision logic and does no I/O;
//! [`Poller`] sleeps, fetches and applies the resulting [`Step`].

use chrono::Local;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vocaluxe_proto::client::{FetchError, SongSource};
use vocaluxe_proto::history::HistoryLog;
use vocaluxe_proto::protocol::Song;

use crate::status::{RetryReason, Status, StatusSink};

/// What one poll result asks the loop to do.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Step {
    pub status: Option<Status>,
    pub record: Option<Song>,
}

#[derive(Debug)]
pub struct PollState {
    last_logged: Song,
    timed_out: bool,
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

impl PollState {
    pub fn new() -> Self {
        Self {
            last_logged: Song::none(),
            timed_out: false,
        }
    }

    pub fn last_logged(&self) -> &Song {
        &self.last_logged
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn advance(&mut self, outcome: Result<Option<Song>, FetchError>) -> Step {
        let current = match outcome {
            Ok(current) => current,
            Err(e) => {
                if self.timed_out {
                    debug!("[poller] still failing: {}", e);
                    return Step::default();
                }
                warn!("[poller] {}", e);
                self.timed_out = true;
                let reason = if e.is_connection() {
                    RetryReason::Unreachable
                } else {
                    RetryReason::Unknown
                };
                return Step {
                    status: Some(Status::Retrying(reason)),
                    record: None,
                };
            }
        };

        let mut step = Step::default();
        if self.timed_out {
            info!("[poller] Vocaluxe server reachable again");
            self.timed_out = false;
            step.status = Some(Status::Recording);
        }

        if let Some(song) = current {
            if !song.same_track(&self.last_logged) {
                self.last_logged = song.clone();
                step.record = Some(song);
            }
        }
        step
    }
}

pub struct Poller<S> {
    source: S,
    history: HistoryLog,
    interval: Duration,
    state: PollState,
}

impl<S: SongSource> Poller<S> {
    pub fn new(source: S, history: HistoryLog, interval: Duration) -> Self {
        Self {
            source,
            history,
            interval,
            state: PollState::new(),
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Poll until `cancel` fires. Fetch failures are retried forever at the
    /// normal interval; a failed history write ends the loop with an error.
    pub async fn run(
        &mut self,
        sink: &mut impl StatusSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        sink.show(&Status::Recording);
        info!(
            "[poller] polling every {:?}, history in {}",
            self.interval,
            self.history.dir().display()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.source.current_song() => outcome,
            };
            self.apply(outcome, sink).await?;
        }

        info!("[poller] stopped");
        Ok(())
    }

    async fn apply(
        &mut self,
        outcome: Result<Option<Song>, FetchError>,
        sink: &mut impl StatusSink,
    ) -> anyhow::Result<()> {
        let previous = self.state.last_logged.clone();
        let step = self.state.advance(outcome);
        if let Some(status) = step.status {
            sink.show(&status);
        }
        if let Some(song) = step.record {
            // the marker only moves once the line is on disk
            if let Err(e) = self.history.append(&song, Local::now()).await {
                self.state.last_logged = previous;
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use vocaluxe_proto::client::StatusCode;
    use vocaluxe_proto::history::HistoryEntry;

    fn song(id: i64, title: &str, artist: &str) -> Result<Option<Song>, FetchError> {
        Ok(Some(Song::new(id, title, artist)))
    }

    fn idle() -> Result<Option<Song>, FetchError> {
        Ok(None)
    }

    fn down() -> Result<Option<Song>, FetchError> {
        Err(FetchError::Status {
            url: "http://localhost:3000/getCurrentSongId".into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        })
    }

    fn garbled() -> Result<Option<Song>, FetchError> {
        Err(FetchError::Malformed {
            url: "http://localhost:3000/getSong?songId=1".into(),
            detail: "expected value at line 1 column 1".into(),
        })
    }

    /// Plays back a fixed list of poll results, then cancels the loop.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Option<Song>, FetchError>>>,
        cancel: CancellationToken,
    }

    impl ScriptedSource {
        fn new(
            script: Vec<Result<Option<Song>, FetchError>>,
            cancel: CancellationToken,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                cancel,
            }
        }
    }

    impl SongSource for ScriptedSource {
        async fn current_song(&self) -> Result<Option<Song>, FetchError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(outcome) => outcome,
                None => {
                    self.cancel.cancel();
                    Ok(None)
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordedStatus(Vec<Status>);

    impl StatusSink for RecordedStatus {
        fn show(&mut self, status: &Status) {
            self.0.push(*status);
        }
    }

    async fn run_script(
        script: Vec<Result<Option<Song>, FetchError>>,
    ) -> (Vec<Status>, Vec<HistoryEntry>, PollState) {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(script, cancel.clone());
        let mut poller = Poller::new(source, HistoryLog::new(dir.path()), Duration::ZERO);
        let mut sink = RecordedStatus::default();

        poller.run(&mut sink, cancel).await.unwrap();

        let mut entries = Vec::new();
        for file in std::fs::read_dir(dir.path()).unwrap() {
            entries.extend(HistoryLog::load_entries(&file.unwrap().path()).unwrap());
        }
        (sink.0, entries, poller.state)
    }

    fn titles(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_new_song_is_recorded_once() {
        let mut state = PollState::new();
        let step = state.advance(song(1, "A", "X"));
        assert_eq!(step.record, Some(Song::new(1, "A", "X")));
        assert_eq!(step.status, None);

        assert_eq!(state.advance(song(1, "A", "X")), Step::default());
        assert_eq!(state.last_logged().id, 1);
    }

    #[test]
    fn test_dedup_is_by_id_only() {
        let mut state = PollState::new();
        state.advance(song(1, "A", "X"));
        assert_eq!(state.advance(song(1, "A (Live)", "X")), Step::default());
        assert_eq!(state.last_logged().title, "A");

        let step = state.advance(song(2, "A", "X"));
        assert_eq!(step.record.map(|s| s.id), Some(2));
    }

    #[test]
    fn test_idle_keeps_marker() {
        let mut state = PollState::new();
        state.advance(song(3, "C", "Z"));
        assert_eq!(state.advance(idle()), Step::default());
        assert_eq!(state.last_logged().id, 3);
        // same song back after a gap is not logged again
        assert_eq!(state.advance(song(3, "C", "Z")), Step::default());
    }

    #[test]
    fn test_failure_status_shown_once() {
        let mut state = PollState::new();
        let step = state.advance(down());
        assert_eq!(step.status, Some(Status::Retrying(RetryReason::Unreachable)));
        assert!(state.is_timed_out());

        for _ in 0..5 {
            assert_eq!(state.advance(down()), Step::default());
        }
        assert!(state.last_logged().is_none());

        let step = state.advance(idle());
        assert_eq!(step.status, Some(Status::Recording));
        assert_eq!(step.record, None);
        assert!(!state.is_timed_out());
    }

    #[test]
    fn test_malformed_reports_unknown_error() {
        let mut state = PollState::new();
        let step = state.advance(garbled());
        assert_eq!(step.status, Some(Status::Retrying(RetryReason::Unknown)));
        // a later different failure while already retrying stays quiet
        assert_eq!(state.advance(down()), Step::default());
    }

    #[test]
    fn test_recovery_records_new_song_in_same_step() {
        let mut state = PollState::new();
        state.advance(song(1, "A", "X"));
        state.advance(down());
        let step = state.advance(song(2, "B", "Y"));
        assert_eq!(step.status, Some(Status::Recording));
        assert_eq!(step.record.map(|s| s.id), Some(2));
    }

    #[tokio::test]
    async fn test_run_logs_changes_in_order() {
        let (statuses, entries, state) = run_script(vec![
            idle(),
            song(1, "A", "X"),
            song(1, "A", "X"),
            song(2, "B", "Y"),
        ])
        .await;

        assert_eq!(statuses, vec![Status::Recording]);
        assert_eq!(titles(&entries), vec!["A", "B"]);
        assert_eq!(entries[0].artist, "X");
        assert_eq!(entries[1].artist, "Y");
        for entry in &entries {
            assert!(chrono::NaiveTime::parse_from_str(&entry.time, "%H:%M:%S").is_ok());
        }
        assert_eq!(state.last_logged().id, 2);
    }

    #[tokio::test]
    async fn test_run_survives_failures() {
        let (statuses, entries, _) =
            run_script(vec![down(), down(), song(5, "C", "Z")]).await;

        let retrying = statuses
            .iter()
            .filter(|s| matches!(s, Status::Retrying(_)))
            .count();
        assert_eq!(retrying, 1);
        assert_eq!(
            statuses,
            vec![
                Status::Recording,
                Status::Retrying(RetryReason::Unreachable),
                Status::Recording,
            ]
        );
        assert_eq!(titles(&entries), vec!["C"]);
    }

    #[tokio::test]
    async fn test_run_many_failures_then_resume() {
        let mut script: Vec<_> = (0..50).map(|_| down()).collect();
        script.push(song(9, "I", "W"));
        script.push(down());
        script.push(song(9, "I", "W"));
        script.push(song(10, "J", "W"));

        let (statuses, entries, _) = run_script(script).await;
        assert_eq!(titles(&entries), vec!["I", "J"]);
        assert_eq!(statuses.len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = ScriptedSource::new(vec![song(1, "A", "X")], cancel.clone());
        let mut poller =
            Poller::new(source, HistoryLog::new(dir.path()), Duration::from_secs(3600));
        let mut sink = RecordedStatus::default();

        poller.run(&mut sink, cancel).await.unwrap();
        assert!(poller.state().last_logged().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_history_write_failure_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        // a plain file where the history directory should be
        let blocked = dir.path().join("history");
        std::fs::write(&blocked, "").unwrap();

        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(vec![song(1, "A", "X")], cancel.clone());
        let mut poller = Poller::new(source, HistoryLog::new(&blocked), Duration::ZERO);
        let mut sink = RecordedStatus::default();

        assert!(poller.run(&mut sink, cancel.clone()).await.is_err());
        assert!(!cancel.is_cancelled());
        assert!(poller.state().last_logged().is_none());
    }
}
