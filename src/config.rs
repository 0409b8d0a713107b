use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player executable. Empty means auto-detect.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_extra_intf")]
    pub extra_intf: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_web_url")]
    pub web_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,
    #[serde(default = "default_playlist_endpoint")]
    pub playlist_endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            extra_intf: default_extra_intf(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            web_url: default_web_url(),
            port: default_port(),
            password: default_password(),
            status_endpoint: default_status_endpoint(),
            playlist_endpoint: default_playlist_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            database_file: default_database_file(),
        }
    }
}

fn default_extra_intf() -> String {
    "http".to_string()
}

fn default_web_url() -> String {
    "http://127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_password() -> String {
    "villain".to_string()
}

fn default_status_endpoint() -> String {
    "requests/status.json".to_string()
}

fn default_playlist_endpoint() -> String {
    "requests/playlist.json".to_string()
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_tick_ms() -> u64 {
    500
}

fn default_database_file() -> PathBuf {
    PathBuf::from("villain-couch.db")
}

impl HttpConfig {
    pub fn status_url(&self) -> String {
        self.endpoint_url(&self.status_endpoint)
    }

    pub fn playlist_url(&self) -> String {
        self.endpoint_url(&self.playlist_endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}:{}/{}",
            self.web_url.trim_end_matches('/'),
            self.port,
            endpoint.trim_start_matches('/')
        )
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Reads the config at `path`, writing a default one first when it does not exist yet.
pub fn load_or_create(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        let config = Config::default();
        write_default(path, &config)?;
        tracing::info!(path = %path.display(), "created default config");
        return Ok(config);
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_default(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw).map_err(io_error)
}

pub fn resolve_player_bin(config: &PlayerConfig) -> PathBuf {
    resolve_player_bin_from(
        std::env::var_os("VILLAIN_COUCH_PLAYER_BIN"),
        &config.path,
        installed_player_locations,
    )
}

fn resolve_player_bin_from(
    env_value: Option<OsString>,
    configured: &str,
    installed: impl FnOnce() -> Vec<PathBuf>,
) -> PathBuf {
    if let Some(value) = env_value
        && !value.is_empty()
    {
        return PathBuf::from(value);
    }
    let configured = configured.trim();
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    installed()
        .into_iter()
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from("vlc"))
}

const VLC_UNINSTALL_KEYS: [&str; 2] = [
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\VLC media player",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall\VLC media player",
];

fn installed_player_locations() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        let mut found = vec![PathBuf::from("/Applications/VLC.app/Contents/MacOS/VLC")];
        let spotlight =
            command_stdout("mdfind", &["kMDItemCFBundleIdentifier == 'org.videolan.vlc'"]);
        found.extend(spotlight.as_deref().and_then(spotlight_executable));
        found
    } else if cfg!(windows) {
        let mut found: Vec<PathBuf> = VLC_UNINSTALL_KEYS
            .iter()
            .filter_map(|key| command_stdout("reg", &["query", key, "/v", "InstallLocation"]))
            .filter_map(|out| registry_install_location(&out))
            .collect();
        found.push(PathBuf::from(r"C:\Program Files\VideoLAN\VLC\vlc.exe"));
        found.push(PathBuf::from(r"C:\Program Files (x86)\VideoLAN\VLC\vlc.exe"));
        found
    } else {
        Vec::new()
    }
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program)
        .args(args)
        .stderr(std::process::Stdio::null())
        .output()
        .map_err(|err| tracing::debug!(program, error = %err, "player lookup command failed"))
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// First app bundle reported by Spotlight, pointed at its executable.
fn spotlight_executable(output: &str) -> Option<PathBuf> {
    let bundle = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    Some(Path::new(bundle).join("Contents").join("MacOS").join("VLC"))
}

/// Parses `reg query .. /v InstallLocation` output into the `vlc.exe` path.
fn registry_install_location(output: &str) -> Option<PathBuf> {
    let line = output
        .lines()
        .find(|line| line.trim_start().starts_with("InstallLocation"))?;
    let (_, value) = line.split_once("REG_SZ")?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.to_ascii_lowercase().contains("vlc.exe") {
        Some(PathBuf::from(value))
    } else {
        Some(PathBuf::from(format!("{}\\vlc.exe", value.trim_end_matches('\\'))))
    }
}
