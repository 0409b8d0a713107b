use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::uri::{file_uri_from_path, path_from_file_uri};
use crate::config::HttpConfig;
use crate::http::{HttpError, basic_auth_header, build_agent, get_text};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum PlayerError {
    #[error("player request failed: {0}")]
    Http(#[from] HttpError),
    #[error("could not decode player response: {0}")]
    Decode(String),
    #[error("invalid file URI: {0}")]
    InvalidUri(String),
    #[error("media file not found: {0}")]
    MediaFileNotFound(String),
    #[error("no next episode can be derived from {0}")]
    NoNextEpisode(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TransportState {
    Playing,
    Paused,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Transport state as reported by the status endpoint, flattened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PlaybackStatus {
    pub(crate) state: TransportState,
    pub(crate) elapsed_seconds: i64,
    pub(crate) total_seconds: i64,
    pub(crate) filename: String,
    pub(crate) show_name: String,
    pub(crate) title: String,
    pub(crate) episode_number: String,
    pub(crate) season_number: String,
}

#[derive(Debug, Default, Deserialize)]
struct StatusMessage {
    #[serde(default)]
    state: TransportState,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    length: i64,
    #[serde(default)]
    information: Information,
}

#[derive(Debug, Default, Deserialize)]
struct Information {
    #[serde(default)]
    category: Category,
}

#[derive(Debug, Default, Deserialize)]
struct Category {
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    show_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    episode_number: String,
    #[serde(default)]
    season_number: String,
}

impl From<StatusMessage> for PlaybackStatus {
    fn from(message: StatusMessage) -> Self {
        let meta = message.information.category.meta;
        Self {
            state: message.state,
            elapsed_seconds: message.time,
            total_seconds: message.length,
            filename: meta.filename,
            show_name: meta.show_name,
            title: meta.title,
            episode_number: meta.episode_number,
            season_number: meta.season_number,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum NodeKind {
    Leaf,
    #[default]
    #[serde(other)]
    Folder,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PlaylistNode {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(rename = "type", default)]
    pub(crate) kind: NodeKind,
    #[serde(default)]
    pub(crate) children: Vec<PlaylistNode>,
    #[serde(default)]
    pub(crate) current: Option<String>,
    #[serde(default)]
    pub(crate) uri: Option<String>,
}

impl PlaylistNode {
    fn is_current(&self) -> bool {
        self.current.as_deref().is_some_and(|flag| !flag.is_empty())
    }

    /// Depth-first search for the leaf the player marks as current.
    pub(crate) fn find_current(&self) -> Option<&PlaylistNode> {
        if self.kind == NodeKind::Leaf && self.is_current() {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_current())
    }

    pub(crate) fn current_path(&self) -> Result<Option<String>, PlayerError> {
        let Some(node) = self.find_current() else {
            return Ok(None);
        };
        tracing::debug!(id = %node.id, name = %node.name, "current playlist item");
        node.uri.as_deref().map(path_from_file_uri).transpose()
    }
}

/// Client for the player's local HTTP control interface. Every call is one bounded request.
#[derive(Debug, Clone)]
pub(crate) struct PlayerClient {
    agent: ureq::Agent,
    status_url: String,
    playlist_url: String,
    authorization: String,
}

impl PlayerClient {
    pub(crate) fn new(
        status_url: String,
        playlist_url: String,
        password: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            status_url,
            playlist_url,
            authorization: basic_auth_header("", password),
        }
    }

    pub(crate) fn from_config(http: &HttpConfig) -> Self {
        Self::new(
            http.status_url(),
            http.playlist_url(),
            &http.password,
            http.timeout(),
        )
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String, PlayerError> {
        Ok(get_text(&self.agent, url, &self.authorization, query)?)
    }

    pub(crate) fn status(&self) -> Result<PlaybackStatus, PlayerError> {
        let raw = self.get(&self.status_url, &[])?;
        let message: StatusMessage =
            serde_json::from_str(&raw).map_err(|err| PlayerError::Decode(err.to_string()))?;
        Ok(message.into())
    }

    pub(crate) fn playlist_tree(&self) -> Result<PlaylistNode, PlayerError> {
        let raw = self.get(&self.playlist_url, &[])?;
        serde_json::from_str(&raw).map_err(|err| PlayerError::Decode(err.to_string()))
    }

    /// Native path of the item currently playing; `None` when nothing is marked current.
    pub(crate) fn playlist(&self) -> Result<Option<String>, PlayerError> {
        self.playlist_tree()?.current_path()
    }

    pub(crate) fn play_file(&self, path: &str) -> Result<(), PlayerError> {
        let uri = file_uri_from_path(path);
        self.get(
            &self.status_url,
            &[("command", "in_play"), ("input", uri.as_str())],
        )?;
        tracing::info!(file = path, "played file");

        // The player only refreshes its metadata after a seek.
        self.seek_second(1)
    }

    pub(crate) fn seek_second(&self, second: i64) -> Result<(), PlayerError> {
        let value = second.to_string();
        self.get(
            &self.status_url,
            &[("command", "seek"), ("val", value.as_str())],
        )?;
        tracing::debug!(second, "seeked");
        Ok(())
    }
}
