//! Configuration for chanwatch.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags (`ConfigOverrides`)
//! 2. Environment variables (YOUTUBE_API_KEY, CHANWATCH_OUTPUT_DIR,
//!    CHANWATCH_CURSOR, CHANWATCH_WEBDRIVER_URL, CHANWATCH_YTDLP)
//! 3. Config file (.chanwatch/config.yaml)
//! 4. Defaults (./videos, ./seen.txt)
//!
//! Config file discovery:
//! - Searches current directory and parents for .chanwatch/config.yaml
//! - Paths in config file are relative to the directory containing .chanwatch/
//!
//! Nothing is cached globally: the CLI resolves a `ResolvedConfig` once and
//! hands it to the orchestrator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::MatchKey;

pub const ENV_API_KEY: &str = "YOUTUBE_API_KEY";
pub const ENV_OUTPUT_DIR: &str = "CHANWATCH_OUTPUT_DIR";
pub const ENV_CURSOR: &str = "CHANWATCH_CURSOR";
pub const ENV_WEBDRIVER_URL: &str = "CHANWATCH_WEBDRIVER_URL";
pub const ENV_YTDLP: &str = "CHANWATCH_YTDLP";

const DEFAULT_OUTPUT_DIR: &str = "videos";
const DEFAULT_CURSOR: &str = "seen.txt";
const DEFAULT_EXTENSION: &str = "mp4";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
const DEFAULT_BROWSER_WAIT_SECS: u64 = 10;
const DEFAULT_YTDLP: &str = "yt-dlp";
const DEFAULT_YTDLP_FORMAT: &str = "mp4";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Errors raised while assembling configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YOUTUBE_API_KEY is not set (required by the api probe)")]
    MissingApiKey,

    #[error("no channel given")]
    MissingChannel,

    #[error("failed to read channel from stdin: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How new items are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Data API search ordered by date
    #[default]
    Api,

    /// Anchors scraped from the channel's videos page
    Scrape,

    /// Channel page rendered by a WebDriver browser
    Browser,
}

/// How media is retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    /// Embedded streaming client
    #[default]
    Stream,

    /// External yt-dlp / youtube-dl process
    Ytdlp,
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    pub channel: Option<String>,
    pub probe: Option<ProbeBackend>,
    pub fetcher: Option<FetchBackend>,
    #[serde(default)]
    pub paths: PathsConfig,
    pub match_keys: Option<Vec<MatchKey>>,
    pub overwrite: Option<bool>,
    pub all_matches: Option<bool>,
    pub title_filter: Option<String>,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub ytdlp: YtDlpConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Output directory (relative to project root)
    pub output: Option<String>,
    /// Cursor file (relative to project root)
    pub cursor: Option<String>,
    /// Output file extension
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowserConfig {
    pub webdriver_url: Option<String>,
    pub wait_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YtDlpConfig {
    pub binary: Option<String>,
    pub format: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
}

/// Values supplied on the command line; `None` defers to lower layers
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub channel: Option<String>,
    pub probe: Option<ProbeBackend>,
    pub fetcher: Option<FetchBackend>,
    pub output_dir: Option<PathBuf>,
    pub cursor_path: Option<PathBuf>,
    pub title_filter: Option<String>,
    pub overwrite: bool,
    pub all_matches: bool,
}

/// Snapshot of the environment variables chanwatch reads
#[derive(Debug, Clone, Default)]
pub struct EnvVars(HashMap<String, String>);

impl EnvVars {
    /// Capture the relevant variables from the process environment
    pub fn from_process() -> Self {
        let vars = [ENV_API_KEY, ENV_OUTPUT_DIR, ENV_CURSOR, ENV_WEBDRIVER_URL, ENV_YTDLP]
            .into_iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self(vars)
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    /// Non-empty value of a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub channel: Option<String>,
    pub api_key: Option<String>,
    pub probe: ProbeBackend,
    pub fetcher: FetchBackend,
    pub output_dir: PathBuf,
    pub cursor_path: PathBuf,
    pub extension: String,
    pub title_filter: Option<String>,
    pub match_keys: Vec<MatchKey>,
    pub overwrite: bool,
    pub all_matches: bool,
    pub webdriver_url: String,
    pub browser_wait: Duration,
    pub ytdlp_binary: String,
    pub ytdlp_format: String,
    pub fetch_timeout: Option<Duration>,
    pub http_timeout: Option<Duration>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// The API key, or a config error if the api probe would need it
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".chanwatch").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from the process environment and the discovered file
pub fn load(overrides: &ConfigOverrides) -> Result<ResolvedConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Read {
        path: PathBuf::from("."),
        source,
    })?;

    let file = match find_config_file(&cwd) {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    resolve(file, &EnvVars::from_process(), overrides)
}

/// Merge all layers. Pure: no I/O, so tests can drive it directly.
pub fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: &EnvVars,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig, ConfigError> {
    let (config_file, file) = match file {
        Some((path, parsed)) => (Some(path), parsed),
        None => (None, ConfigFile::default()),
    };

    // Project root is the parent of .chanwatch/ (grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let output_dir = overrides
        .output_dir
        .clone()
        .or_else(|| env.get(ENV_OUTPUT_DIR).map(PathBuf::from))
        .unwrap_or_else(|| {
            resolve_path(&base_dir, file.paths.output.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR))
        });

    let cursor_path = overrides
        .cursor_path
        .clone()
        .or_else(|| env.get(ENV_CURSOR).map(PathBuf::from))
        .unwrap_or_else(|| {
            resolve_path(&base_dir, file.paths.cursor.as_deref().unwrap_or(DEFAULT_CURSOR))
        });

    let match_keys = file.match_keys.unwrap_or_else(MatchKey::defaults);
    if match_keys.is_empty() {
        return Err(ConfigError::Invalid("match_keys must not be empty".to_string()));
    }

    let extension = file
        .paths
        .extension
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
        .trim_start_matches('.')
        .to_string();
    if extension.is_empty() || extension.contains(['/', '\\']) {
        return Err(ConfigError::Invalid(format!("bad file extension {:?}", extension)));
    }

    let channel = overrides
        .channel
        .clone()
        .or(file.channel)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Ok(ResolvedConfig {
        channel,
        api_key: env.get(ENV_API_KEY).map(|k| k.trim().to_string()),
        probe: overrides.probe.or(file.probe).unwrap_or_default(),
        fetcher: overrides.fetcher.or(file.fetcher).unwrap_or_default(),
        output_dir,
        cursor_path,
        extension,
        title_filter: overrides
            .title_filter
            .clone()
            .or(file.title_filter)
            .filter(|f| !f.is_empty()),
        match_keys,
        overwrite: overrides.overwrite || file.overwrite.unwrap_or(false),
        all_matches: overrides.all_matches || file.all_matches.unwrap_or(false),
        webdriver_url: env
            .get(ENV_WEBDRIVER_URL)
            .map(String::from)
            .or(file.browser.webdriver_url)
            .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
        browser_wait: Duration::from_secs(
            file.browser.wait_seconds.unwrap_or(DEFAULT_BROWSER_WAIT_SECS),
        ),
        ytdlp_binary: env
            .get(ENV_YTDLP)
            .map(String::from)
            .or(file.ytdlp.binary)
            .unwrap_or_else(|| DEFAULT_YTDLP.to_string()),
        ytdlp_format: file
            .ytdlp
            .format
            .unwrap_or_else(|| DEFAULT_YTDLP_FORMAT.to_string()),
        fetch_timeout: file.ytdlp.timeout_seconds.map(Duration::from_secs),
        http_timeout: Some(Duration::from_secs(
            file.http.timeout_seconds.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        )),
        config_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, &EnvVars::default(), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("videos"));
        assert_eq!(config.cursor_path, PathBuf::from("seen.txt"));
        assert_eq!(config.probe, ProbeBackend::Api);
        assert_eq!(config.fetcher, FetchBackend::Stream);
        assert_eq!(config.extension, "mp4");
        assert_eq!(config.match_keys, MatchKey::defaults());
        assert!(!config.overwrite);
        assert!(config.api_key.is_none());
        assert!(config.config_file.is_none());
        assert!(matches!(config.require_api_key(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".chanwatch");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1"
channel: UC123
probe: scrape
fetcher: ytdlp
title_filter: Bruce Falconer
match_keys: [id, title]
paths:
  output: media
  cursor: state/seen.txt
ytdlp:
  binary: youtube-dl
  timeout_seconds: 600
browser:
  wait_seconds: 3
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.probe, Some(ProbeBackend::Scrape));

        let config = resolve(
            Some((config_path, parsed)),
            &EnvVars::default(),
            &ConfigOverrides::default(),
        )
        .unwrap();

        assert_eq!(config.channel.as_deref(), Some("UC123"));
        assert_eq!(config.fetcher, FetchBackend::Ytdlp);
        assert_eq!(config.output_dir, temp.path().join("media"));
        assert_eq!(config.cursor_path, temp.path().join("state/seen.txt"));
        assert_eq!(config.match_keys, vec![MatchKey::Id, MatchKey::Title]);
        assert_eq!(config.title_filter.as_deref(), Some("Bruce Falconer"));
        assert_eq!(config.ytdlp_binary, "youtube-dl");
        assert_eq!(config.fetch_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.browser_wait, Duration::from_secs(3));
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let file = ConfigFile {
            channel: Some("from-file".to_string()),
            paths: PathsConfig {
                output: Some("file-videos".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let env = EnvVars::default()
            .with(ENV_OUTPUT_DIR, "/env/videos")
            .with(ENV_CURSOR, "/env/seen.txt")
            .with(ENV_API_KEY, " secret ");
        let overrides = ConfigOverrides {
            channel: Some("from-cli".to_string()),
            cursor_path: Some(PathBuf::from("/cli/seen.txt")),
            ..Default::default()
        };

        let config = resolve(
            Some((PathBuf::from("/proj/.chanwatch/config.yaml"), file)),
            &env,
            &overrides,
        )
        .unwrap();

        assert_eq!(config.channel.as_deref(), Some("from-cli"));
        assert_eq!(config.output_dir, PathBuf::from("/env/videos"));
        assert_eq!(config.cursor_path, PathBuf::from("/cli/seen.txt"));
        assert_eq!(config.require_api_key().unwrap(), "secret");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let env = EnvVars::default().with(ENV_API_KEY, "").with(ENV_OUTPUT_DIR, "  ");
        let config = resolve(None, &env, &ConfigOverrides::default()).unwrap();

        assert!(config.api_key.is_none());
        assert_eq!(config.output_dir, PathBuf::from("videos"));
    }

    #[test]
    fn test_rejects_empty_match_keys() {
        let file = ConfigFile {
            match_keys: Some(Vec::new()),
            ..Default::default()
        };
        let result = resolve(
            Some((PathBuf::from("/p/.chanwatch/config.yaml"), file)),
            &EnvVars::default(),
            &ConfigOverrides::default(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".chanwatch");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "channel: UC1\n").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(dir.join("config.yaml")));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
