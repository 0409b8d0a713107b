use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use walkdir::WalkDir;

static EPISODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)[._ ]?[Ss]?(\d{1,2})[EeXx](\d{1,2})").expect("episode pattern is valid")
});

static TAG_GROUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("tag group pattern is valid")
});

static SEASON_EPISODE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(S\d{2})(E)(\d{2})").expect("season/episode token pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("could not parse episode info from: {0}")]
    NoEpisodeToken(String),
    #[error("could not parse {field} number '{value}'")]
    BadNumber { field: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ResolveError {
    #[error("could not parse target filename: {0}")]
    Target(#[from] ParseError),
    #[error("failed to read library directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Show/season/episode parsed from a media filename. Only built by [`parse_episode_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EpisodeInfo {
    show_name: String,
    season: u32,
    episode: u32,
    file_path: PathBuf,
}

impl EpisodeInfo {
    /// Display form of the show name, e.g. `Show Name`.
    pub(crate) fn show_name(&self) -> &str {
        &self.show_name
    }

    pub(crate) fn show_key(&self) -> String {
        normalize_show_name(&self.show_name)
    }

    pub(crate) fn season(&self) -> u32 {
        self.season
    }

    pub(crate) fn episode(&self) -> u32 {
        self.episode
    }

    pub(crate) fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub(crate) fn into_file_path(self) -> PathBuf {
        self.file_path
    }

    fn order(&self, other: &Self) -> Ordering {
        (self.season, self.episode).cmp(&(other.season, other.episode))
    }
}

pub(crate) fn parse_episode_info(file_path: impl AsRef<Path>) -> Result<EpisodeInfo, ParseError> {
    let file_path = file_path.as_ref();
    let filename = file_name_of(file_path);
    let captures = EPISODE_PATTERN
        .captures(&filename)
        .ok_or_else(|| ParseError::NoEpisodeToken(filename.clone()))?;

    let season = parse_number("season", &captures[2])?;
    let episode = parse_number("episode", &captures[3])?;
    let show_name = captures[1].replace(['.', '_'], " ").trim().to_string();

    Ok(EpisodeInfo {
        show_name,
        season,
        episode,
        file_path: file_path.to_path_buf(),
    })
}

fn parse_number(field: &'static str, value: &str) -> Result<u32, ParseError> {
    value.parse::<u32>().map_err(|_| ParseError::BadNumber {
        field,
        value: value.to_string(),
    })
}

fn file_name_of(path: &Path) -> String {
    let raw = path.to_string_lossy();
    match raw.rfind(['/', '\\']) {
        Some(idx) => raw[idx + 1..].to_string(),
        None => raw.into_owned(),
    }
}

/// Comparison key for show names: lowercase, tag groups dropped, only letters and digits kept.
pub(crate) fn normalize_show_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    TAG_GROUP_PATTERN
        .replace_all(&lowered, "")
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .collect()
}

/// Collects every file below each immediate subdirectory of `root` whose normalized
/// name contains the target's show key.
pub(crate) fn find_related_files(
    root: &Path,
    target_filename: &str,
) -> Result<BTreeMap<PathBuf, Vec<PathBuf>>, ResolveError> {
    let target = parse_episode_info(target_filename)?;
    let key = target.show_key();
    tracing::debug!(show = target.show_name(), key = %key, root = %root.display(), "scanning library");

    let entries = fs::read_dir(root).map_err(|source| ResolveError::ReadDir {
        path: root.to_path_buf(),
        source,
    })?;

    let mut results = BTreeMap::new();
    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        if !normalize_show_name(&dir_name).contains(&key) {
            continue;
        }

        let matched = entry.path();
        match collect_files(&matched) {
            Ok(files) => {
                tracing::debug!(directory = %matched.display(), files = files.len(), "matched library directory");
                results.insert(matched, files);
            }
            Err(err) => {
                tracing::warn!(directory = %matched.display(), error = %err, "could not read library directory");
            }
        }
    }
    Ok(results)
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Returns the first episode of the same show that sorts strictly after `target`
/// by (season, episode). Gaps in numbering are skipped over.
pub(crate) fn find_next_episode(
    target: &EpisodeInfo,
    files_by_dir: &BTreeMap<PathBuf, Vec<PathBuf>>,
) -> Option<EpisodeInfo> {
    let key = target.show_key();
    let mut candidates: Vec<EpisodeInfo> = files_by_dir
        .values()
        .flatten()
        .filter_map(|file| parse_episode_info(file).ok())
        .filter(|info| info.show_key() == key)
        .collect();
    candidates.sort_by(|left, right| left.order(right));

    candidates
        .into_iter()
        .find(|candidate| candidate.order(target) == Ordering::Greater)
}

/// Sibling path with the `SxxEyy` episode number bumped by one, without touching disk.
pub(crate) fn next_episode_path(current: &str) -> Option<String> {
    let split = current.rfind(['/', '\\']).map_or(0, |idx| idx + 1);
    let (dir, filename) = current.split_at(split);

    let captures = SEASON_EPISODE_TOKEN.captures(filename)?;
    let episode = captures[3].parse::<u32>().ok()?;
    let whole = captures.get(0)?;
    let replacement = format!("{}{}{:02}", &captures[1], &captures[2], episode + 1);

    Some(format!(
        "{dir}{}{replacement}{}",
        &filename[..whole.start()],
        &filename[whole.end()..]
    ))
}

pub(crate) fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_timestamp_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
