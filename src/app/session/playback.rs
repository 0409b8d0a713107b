use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, select};

use super::api::{PlaybackStatus, PlayerClient, PlayerError, TransportState};
use super::cache::SessionCache;
use super::process::{ExitOutcome, PlayerProcess, termination_signals};
use crate::app::episode::{
    find_next_episode, find_related_files, format_clock, next_episode_path, parse_episode_info,
};
use crate::db::{Database, MediaFile, now_timestamp};

/// Stopped ticks ignored after a file is handed to the player, while it loads.
const STARTUP_GRACE_TICKS: u32 = 6;

/// Full-library successor of the file currently playing, computed once in the background.
#[derive(Debug, Clone, Default)]
pub(crate) struct LibraryScan {
    slot: Arc<OnceLock<Option<PathBuf>>>,
}

impl LibraryScan {
    pub(crate) fn spawn(roots: Vec<PathBuf>, target: String) -> Self {
        let scan = Self::default();
        let slot = Arc::clone(&scan.slot);
        thread::spawn(move || {
            let found = find_library_successor(&roots, &target);
            match &found {
                Some(path) => {
                    tracing::debug!(file = %target, candidate = %path.display(), "library scan found successor")
                }
                None => tracing::debug!(file = %target, "library scan found no successor"),
            }
            let _ = slot.set(found);
        });
        scan
    }

    #[cfg(test)]
    pub(crate) fn resolved(candidate: Option<PathBuf>) -> Self {
        let scan = Self::default();
        let _ = scan.slot.set(candidate);
        scan
    }

    /// `None` while the scan is still running or when it found nothing.
    pub(crate) fn candidate(&self) -> Option<PathBuf> {
        self.slot.get().cloned().flatten()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Searches each library root in order and returns the first successor of `target`.
pub(crate) fn find_library_successor(roots: &[PathBuf], target: &str) -> Option<PathBuf> {
    let info = match parse_episode_info(target) {
        Ok(info) => info,
        Err(err) => {
            tracing::debug!(file = target, error = %err, "cannot scan library for unparsable file");
            return None;
        }
    };

    roots.iter().find_map(|root| {
        let related = match find_related_files(root, target) {
            Ok(related) => related,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "library scan failed");
                return None;
            }
        };
        let next = find_next_episode(&info, &related)?;
        tracing::debug!(
            show = next.show_name(),
            season = next.season(),
            episode = next.episode(),
            file = %next.file_path().display(),
            "library successor"
        );
        Some(next.into_file_path())
    })
}

/// Everything one playback session needs, built once and driven by [`run_session`].
pub(crate) struct Session<'a> {
    db: &'a Database,
    cache: SessionCache,
    client: PlayerClient,
    process: PlayerProcess,
    library_roots: Vec<PathBuf>,
    scan: LibraryScan,
    last_path: Option<String>,
    grace_ticks: u32,
    finishing: bool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(db: &'a Database, client: PlayerClient, process: PlayerProcess) -> Result<Self> {
        let library_roots = db
            .list_workspaces()
            .context("failed to load workspaces")?
            .into_iter()
            .map(|workspace| PathBuf::from(workspace.directory_path))
            .collect();
        Ok(Self {
            db,
            cache: SessionCache::new(),
            client,
            process,
            library_roots,
            scan: LibraryScan::default(),
            last_path: None,
            grace_ticks: 0,
            finishing: false,
        })
    }

    fn begin_file(&mut self, path: &str) {
        self.last_path = Some(path.to_string());
        self.grace_ticks = STARTUP_GRACE_TICKS;
        self.scan = LibraryScan::spawn(self.library_roots.clone(), path.to_string());
    }

    /// One poll of the player. `Err` only when the player could not be stopped.
    pub(crate) fn tick(&mut self) -> Result<()> {
        let status = match self.client.status() {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(op = "status", error = %err, "status poll failed");
                return Ok(());
            }
        };
        let current = match self.client.playlist() {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(op = "playlist", error = %err, "playlist poll failed");
                None
            }
        };

        tracing::info!(
            file = %status.filename,
            state = %status.state,
            time = %format_clock(status.elapsed_seconds),
            total = %format_clock(status.total_seconds),
            "pinged"
        );
        tracing::debug!(
            show = %status.show_name,
            title = %status.title,
            season = %status.season_number,
            episode = %status.episode_number,
            "player metadata"
        );

        if status.state != TransportState::Stopped {
            self.grace_ticks = 0;
            let key = current.unwrap_or_default();
            if !key.is_empty() {
                self.last_path = Some(key.clone());
            }
            let entry = snapshot(&key, &status, self.cache.get(&key));
            self.cache.set(&key, entry);
            return Ok(());
        }

        if self.grace_ticks > 0 {
            self.grace_ticks -= 1;
            return Ok(());
        }

        self.flush_cache();
        if self.finishing {
            return Ok(());
        }

        let Some(finished) = current.or_else(|| self.last_path.clone()) else {
            tracing::debug!("player stopped with no known file");
            return Ok(());
        };
        self.cache.delete(&finished);
        tracing::info!(file = %finished, "playback finished");

        match self.play_next(&finished) {
            Ok(next) => {
                self.begin_file(&next);
                Ok(())
            }
            Err(PlayerError::MediaFileNotFound(missing)) => {
                tracing::info!(file = %missing, "next episode not on disk, trying library");
                self.play_library_successor(&finished)
            }
            Err(err) => self.abort(&finished, &err),
        }
    }

    /// Fast path: bump the episode token of `finished` and play the sibling file.
    fn play_next(&self, finished: &str) -> Result<String, PlayerError> {
        let next = next_episode_path(finished)
            .ok_or_else(|| PlayerError::MediaFileNotFound(finished.to_string()))?;
        if !Path::new(&next).is_file() {
            return Err(PlayerError::MediaFileNotFound(next));
        }
        self.client.play_file(&next)?;
        Ok(next)
    }

    fn play_library_successor(&mut self, finished: &str) -> Result<()> {
        let Some(candidate) = self.scan.candidate() else {
            if !self.scan.is_done() {
                tracing::warn!(file = finished, "library scan still running");
            }
            return self.abort(finished, &PlayerError::NoNextEpisode(finished.to_string()));
        };

        let candidate = candidate.to_string_lossy().into_owned();
        match self.client.play_file(&candidate) {
            Ok(()) => {
                self.begin_file(&candidate);
                Ok(())
            }
            Err(err) => self.abort(&candidate, &err),
        }
    }

    fn abort(&mut self, file: &str, reason: &PlayerError) -> Result<()> {
        tracing::error!(file, error = %reason, "cannot continue playback, stopping player");
        self.finishing = true;
        self.process
            .stop()
            .with_context(|| format!("failed to stop player after {reason}"))
    }

    /// Stops the player, waits for it to exit, then flushes. A failed stop is still flushed.
    fn shutdown(&self, completion: &Receiver<ExitOutcome>) -> Result<()> {
        let stopped = self.process.stop();
        match &stopped {
            Ok(()) => {
                let _ = completion.recv();
            }
            Err(err) => tracing::error!(error = %err, "failed to stop player"),
        }
        self.flush_cache();
        stopped.context("failed to stop player on termination request")
    }

    /// Writes every cached entry to the store. The first store error abandons the rest.
    pub(crate) fn flush_cache(&self) {
        for key in self.cache.keys() {
            if key.is_empty() {
                continue;
            }
            let Some(entry) = self.cache.get(&key) else {
                continue;
            };
            if let Err(err) = self.db.upsert_media_file(&entry) {
                tracing::error!(op = "flush", file = %key, error = %err, "failed to persist playback position");
                return;
            }
            tracing::debug!(file = %key, second = entry.current_second, "persisted playback position");
        }
    }
}

fn snapshot(path: &str, status: &PlaybackStatus, previous: Option<MediaFile>) -> MediaFile {
    let now = now_timestamp();
    let filename = if status.filename.is_empty() {
        path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
    } else {
        status.filename.clone()
    };
    MediaFile {
        filepath: path.to_string(),
        filename,
        total_seconds: status.total_seconds,
        current_second: status.elapsed_seconds,
        created_at: previous.map_or_else(|| now.clone(), |entry| entry.created_at),
        updated_at: now,
    }
}

/// Starts the player on `first_file` and ticks until it exits or the process is told to quit.
/// The cache is always flushed before returning.
pub(crate) fn run_session(session: &mut Session<'_>, first_file: &str, tick: Duration) -> Result<()> {
    let signals = termination_signals().context("failed to install signal handlers")?;
    drive_session(session, first_file, tick, signals)
}

fn drive_session(
    session: &mut Session<'_>,
    first_file: &str,
    tick: Duration,
    mut signals: Receiver<i32>,
) -> Result<()> {
    let completion = session.process.completion();
    session
        .process
        .start()
        .with_context(|| format!("failed to launch player for {first_file}"))?;
    session.begin_file(first_file);
    let ticker = crossbeam_channel::tick(tick);

    loop {
        let signal_rx = signals.clone();
        select! {
            recv(completion) -> outcome => {
                match outcome {
                    Ok(outcome) if outcome.success() => tracing::info!("player exited"),
                    Ok(ExitOutcome::Exited(status)) => {
                        tracing::warn!(%status, "player exited abnormally")
                    }
                    Ok(ExitOutcome::WaitFailed(reason)) => {
                        tracing::warn!(%reason, "lost track of player process")
                    }
                    Err(_) => tracing::debug!("completion already delivered"),
                }
                session.flush_cache();
                return Ok(());
            }
            recv(signal_rx) -> signal => {
                let Ok(signal) = signal else {
                    signals = crossbeam_channel::never();
                    continue;
                };
                tracing::info!(signal, "termination requested, stopping player");
                return session.shutdown(&completion);
            }
            recv(ticker) -> _ => {
                if let Err(err) = session.tick() {
                    session.flush_cache();
                    return Err(err);
                }
            }
        }
    }
}

/// Full-library successor of `current`, found the same way as the background scan.
pub(crate) fn resolve_successor(roots: &[PathBuf], current: &str) -> Result<String> {
    find_library_successor(roots, current)
        .map(|path| path.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!(PlayerError::NoNextEpisode(current.to_string())))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::process::Command as ProcessCommand;

    use tempfile::TempDir;

    use super::*;
    use crate::http::test_server::{FakePlayer, Reply};

    fn status_json(state: &str, time: i64, length: i64, filename: &str) -> String {
        format!(
            r#"{{"state":"{state}","time":{time},"length":{length},"information":{{"category":{{"meta":{{"filename":"{filename}"}}}}}}}}"#
        )
    }

    fn playlist_json(current_uri: Option<&str>) -> String {
        let leaf = match current_uri {
            Some(uri) => format!(
                r#"{{"id":"4","name":"item","type":"leaf","current":"current","uri":"{uri}"}}"#
            ),
            None => r#"{"id":"4","name":"item","type":"leaf","uri":"file:///elsewhere.mkv"}"#
                .to_string(),
        };
        format!(
            r#"{{"id":"1","name":"","type":"node","children":[{{"id":"2","name":"Playlist","type":"node","children":[{leaf}]}}]}}"#
        )
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, b"").expect("write file");
    }

    fn client_for(server: &FakePlayer) -> PlayerClient {
        PlayerClient::new(
            server.status_url(),
            server.playlist_url(),
            "secret",
            Duration::from_secs(2),
        )
    }

    fn idle_process() -> PlayerProcess {
        PlayerProcess::new(ProcessCommand::new("true"))
    }

    fn played_inputs(server: &FakePlayer) -> Vec<String> {
        server
            .command_targets()
            .into_iter()
            .filter(|target| target.contains("command=in_play"))
            .collect()
    }

    #[test]
    fn playing_tick_caches_position_under_playlist_path() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("playing", 120, 1500, "Show.S01E01.mkv")));
        server.set_playlist(Reply::ok(playlist_json(Some("file:///tv/Show.S01E01.mkv"))));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.tick().expect("tick");

        let cached = session.cache.get("/tv/Show.S01E01.mkv").expect("cached entry");
        assert_eq!(cached.current_second, 120);
        assert_eq!(cached.total_seconds, 1500);
        assert_eq!(cached.filename, "Show.S01E01.mkv");
        assert_eq!(session.last_path.as_deref(), Some("/tv/Show.S01E01.mkv"));
        assert!(db.latest_media_file().expect("query").is_none());
    }

    #[test]
    fn later_snapshots_keep_the_first_created_at() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("playing", 1, 100, "a.mkv")));
        server.set_playlist(Reply::ok(playlist_json(Some("file:///tv/a.mkv"))));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.tick().expect("first tick");
        let first = session.cache.get("/tv/a.mkv").expect("cached");

        server.set_status(Reply::ok(status_json("paused", 2, 100, "a.mkv")));
        session.tick().expect("second tick");
        let second = session.cache.get("/tv/a.mkv").expect("cached");

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.current_second, 2);
    }

    #[test]
    fn failed_status_poll_leaves_state_untouched() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::status(500, "boom"));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.last_path = Some("/tv/Show.S01E01.mkv".to_string());
        session.tick().expect("tick");

        assert_eq!(session.cache.len(), 0);
        assert!(played_inputs(&server).is_empty());
    }

    #[test]
    fn stopped_tick_persists_and_plays_next_sibling() {
        let library = TempDir::new().expect("tempdir");
        let current = library.path().join("Show.S01E05.mkv");
        let next = library.path().join("Show.S01E06.mkv");
        touch(&current);
        touch(&next);
        let current = current.to_string_lossy().into_owned();

        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");

        server.set_status(Reply::ok(status_json("playing", 1400, 1500, "Show.S01E05.mkv")));
        server.set_playlist(Reply::ok(playlist_json(Some(&format!("file://{current}")))));
        session.tick().expect("playing tick");

        server.set_status(Reply::ok(status_json("stopped", 0, 0, "")));
        server.set_playlist(Reply::ok(playlist_json(None)));
        session.tick().expect("stopped tick");

        let stored = db.media_file(&current).expect("query").expect("stored");
        assert_eq!(stored.current_second, 1400);
        assert!(session.cache.get(&current).is_none());

        let played = played_inputs(&server);
        assert_eq!(played.len(), 1);
        assert!(played[0].contains("Show.S01E06.mkv"));
        assert_eq!(
            session.last_path.as_deref(),
            Some(next.to_string_lossy().as_ref())
        );
        assert!(!session.finishing);
    }

    #[test]
    fn stopped_ticks_are_ignored_while_the_next_file_loads() {
        let library = TempDir::new().expect("tempdir");
        let current = library.path().join("Show.S01E01.mkv");
        touch(&current);
        touch(&library.path().join("Show.S01E02.mkv"));
        touch(&library.path().join("Show.S01E03.mkv"));

        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("stopped", 0, 0, "")));
        server.set_playlist(Reply::ok(playlist_json(None)));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.last_path = Some(current.to_string_lossy().into_owned());
        session.tick().expect("stopped tick");
        assert_eq!(played_inputs(&server).len(), 1);

        for _ in 0..STARTUP_GRACE_TICKS {
            session.tick().expect("grace tick");
        }
        assert_eq!(played_inputs(&server).len(), 1);

        session.tick().expect("tick after grace");
        let played = played_inputs(&server);
        assert_eq!(played.len(), 2);
        assert!(played[1].contains("Show.S01E03.mkv"));
    }

    #[test]
    fn missing_sibling_falls_back_to_library_candidate() {
        let library = TempDir::new().expect("tempdir");
        let current = library.path().join("Show.S01E06.mkv");
        let fallback = library.path().join("Season 2").join("Show.S02E01.mkv");
        touch(&current);
        touch(&fallback);

        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("stopped", 0, 0, "")));
        server.set_playlist(Reply::ok(playlist_json(None)));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.last_path = Some(current.to_string_lossy().into_owned());
        session.scan = LibraryScan::resolved(Some(fallback.clone()));
        session.tick().expect("tick");

        let played = played_inputs(&server);
        assert_eq!(played.len(), 1);
        assert!(played[0].contains("Show.S02E01.mkv"));
        assert_eq!(
            session.last_path.as_deref(),
            Some(fallback.to_string_lossy().as_ref())
        );
    }

    #[cfg(unix)]
    #[test]
    fn no_successor_stops_the_player_and_ends_continuation() {
        let library = TempDir::new().expect("tempdir");
        let current = library.path().join("Show.S01E09.mkv");
        touch(&current);

        let mut sleeper = ProcessCommand::new("sleep");
        sleeper.arg("30");
        let process = PlayerProcess::new(sleeper);
        process.start().expect("start");

        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("stopped", 0, 0, "")));
        server.set_playlist(Reply::ok(playlist_json(None)));

        let mut session = Session::new(&db, client_for(&server), process).expect("session");
        session.last_path = Some(current.to_string_lossy().into_owned());
        session.scan = LibraryScan::resolved(None);
        session.tick().expect("tick stops the player");

        assert!(session.finishing);
        session
            .process
            .completion()
            .recv_timeout(Duration::from_secs(5))
            .expect("player should exit after stop");

        session.tick().expect("later tick");
        assert!(played_inputs(&server).is_empty());
    }

    #[test]
    fn stop_failure_is_fatal() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("stopped", 0, 0, "")));
        server.set_playlist(Reply::ok(playlist_json(None)));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.last_path = Some("/nowhere/Show.S01E01.mkv".to_string());
        session.scan = LibraryScan::resolved(None);

        assert!(session.tick().is_err());
        assert!(session.finishing);
    }

    #[test]
    fn flush_skips_entries_without_a_path() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("playing", 30, 60, "mystery.mkv")));
        server.set_playlist(Reply::ok(playlist_json(None)));

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.tick().expect("tick");
        assert!(session.cache.get("").is_some());

        session.flush_cache();
        assert!(db.list_media_files().expect("list").is_empty());
    }

    #[test]
    fn library_successor_searches_workspaces_in_order() {
        let first = TempDir::new().expect("tempdir");
        let second = TempDir::new().expect("tempdir");
        touch(&first.path().join("Unrelated Show").join("Other.S01E02.mkv"));
        touch(&second.path().join("The Bear (2022) [1080p]").join("The.Bear.S02E01.mkv"));
        touch(&second.path().join("The Bear (2022) [1080p]").join("The.Bear.S01E08.mkv"));

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_library_successor(&roots, "/downloads/The.Bear.S01E07.mkv")
            .expect("successor");
        assert!(found.ends_with("The.Bear.S01E08.mkv"));

        assert!(find_library_successor(&roots, "/downloads/The.Bear.S02E01.mkv").is_none());
        assert!(find_library_successor(&roots, "/downloads/no-token.mkv").is_none());
    }

    #[test]
    fn background_scan_eventually_reports_candidate() {
        let library = TempDir::new().expect("tempdir");
        touch(&library.path().join("Show").join("Show.S01E02.mkv"));

        let scan = LibraryScan::spawn(
            vec![library.path().to_path_buf()],
            "/tv/Show.S01E01.mkv".to_string(),
        );
        for _ in 0..100 {
            if scan.is_done() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(scan.is_done());
        assert!(
            scan.candidate()
                .expect("candidate")
                .ends_with("Show.S01E02.mkv")
        );
    }

    #[test]
    fn resolve_successor_uses_the_library_not_the_sibling() {
        let downloads = TempDir::new().expect("tempdir");
        let library = TempDir::new().expect("tempdir");
        let current = downloads.path().join("Show.S01E01.mkv");
        touch(&current);
        touch(&downloads.path().join("Show.S01E02.mkv"));
        touch(&library.path().join("Show").join("Show.S01E03.mkv"));

        let roots = [library.path().to_path_buf()];
        let next = resolve_successor(&roots, &current.to_string_lossy()).expect("successor");
        assert!(next.ends_with("Show.S01E03.mkv"));

        let last = library.path().join("Show").join("Show.S01E03.mkv");
        assert!(resolve_successor(&roots, &last.to_string_lossy()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failed_play_of_existing_sibling_stops_the_player() {
        let library = TempDir::new().expect("tempdir");
        let current = library.path().join("Show.S01E01.mkv");
        touch(&current);
        touch(&library.path().join("Show.S01E02.mkv"));

        let mut sleeper = ProcessCommand::new("sleep");
        sleeper.arg("30");
        let process = PlayerProcess::new(sleeper);
        process.start().expect("start");

        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        server.set_status(Reply::ok(status_json("stopped", 0, 0, "")));
        server.set_playlist(Reply::ok(playlist_json(None)));
        server.set_command(Reply::status(500, "busy"));

        let mut session = Session::new(&db, client_for(&server), process).expect("session");
        session.last_path = Some(current.to_string_lossy().into_owned());
        session.tick().expect("tick stops the player");

        assert!(session.finishing);
        assert_eq!(played_inputs(&server).len(), 1);
        session
            .process
            .completion()
            .recv_timeout(Duration::from_secs(5))
            .expect("player should exit after stop");
    }

    fn serve_playing(server: &FakePlayer, path: &str, second: i64) {
        server.set_status(Reply::ok(status_json("playing", second, 1500, "Show.S01E01.mkv")));
        server.set_playlist(Reply::ok(playlist_json(Some(&format!("file://{path}")))));
    }

    #[cfg(unix)]
    #[test]
    fn session_loop_flushes_when_player_exits() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        serve_playing(&server, "/tv/Show.S01E01.mkv", 42);

        let mut short_lived = ProcessCommand::new("sleep");
        short_lived.arg("1");
        let mut session =
            Session::new(&db, client_for(&server), PlayerProcess::new(short_lived)).expect("session");

        drive_session(
            &mut session,
            "/tv/Show.S01E01.mkv",
            Duration::from_millis(50),
            crossbeam_channel::never(),
        )
        .expect("session ends cleanly");

        let stored = db
            .media_file("/tv/Show.S01E01.mkv")
            .expect("query")
            .expect("position persisted");
        assert_eq!(stored.current_second, 42);
    }

    #[cfg(unix)]
    #[test]
    fn session_loop_stops_player_and_flushes_on_termination() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        serve_playing(&server, "/tv/Show.S01E01.mkv", 42);

        let mut long_lived = ProcessCommand::new("sleep");
        long_lived.arg("30");
        let mut session =
            Session::new(&db, client_for(&server), PlayerProcess::new(long_lived)).expect("session");

        let (signal_tx, signal_rx) = crossbeam_channel::bounded(1);
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(400));
            let _ = signal_tx.send(libc::SIGTERM);
        });

        let started = std::time::Instant::now();
        drive_session(
            &mut session,
            "/tv/Show.S01E01.mkv",
            Duration::from_millis(50),
            signal_rx,
        )
        .expect("session ends cleanly");
        sender.join().expect("signal thread");

        assert!(started.elapsed() < Duration::from_secs(10));
        let stored = db
            .media_file("/tv/Show.S01E01.mkv")
            .expect("query")
            .expect("position persisted");
        assert_eq!(stored.current_second, 42);
    }

    #[test]
    fn failed_stop_on_termination_still_flushes_and_errors() {
        let db = Database::open_in_memory().expect("db");
        let server = FakePlayer::spawn();
        serve_playing(&server, "/tv/Show.S01E01.mkv", 42);

        let mut session = Session::new(&db, client_for(&server), idle_process()).expect("session");
        session.tick().expect("tick");
        let completion = session.process.completion();

        assert!(session.shutdown(&completion).is_err());
        let stored = db
            .media_file("/tv/Show.S01E01.mkv")
            .expect("query")
            .expect("position persisted");
        assert_eq!(stored.current_second, 42);
    }
}
