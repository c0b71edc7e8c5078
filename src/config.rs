//! Configuration file parser for `fullfeed.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

pub const DEFAULT_TRACKING_ENDPOINT: &str = "https://www.google-analytics.com/collect";

/// Top-level proxy configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,

    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// `memory`, a `redis://` URL, or unset to disable the article cache.
    pub cache_url: Option<String>,

    /// Disables the network guard so loopback and private hosts can be fetched.
    pub allow_local_fetch: bool,

    /// Copy extracted article titles onto rewritten entries.
    pub propagate_title: bool,

    pub extractor: ExtractorConfig,

    pub tracking: TrackingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            cache_url: None,
            allow_local_fetch: false,
            propagate_title: true,
            extractor: ExtractorConfig::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Readability,
    Jina,
}

/// `[extractor]` table.
///
/// SEC-015: Custom Debug impl masks `jina_api_key` to prevent secret leakage
/// in logs, error messages, and debug output.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,

    /// Reader service base URL (defaults to `https://r.jina.ai`).
    pub jina_base_url: Option<String>,

    /// Jina.ai API key (alternative to JINA_API_KEY env var).
    /// Env var takes precedence over config file.
    pub jina_api_key: Option<String>,
}

/// SEC-015: Mask jina_api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("kind", &self.kind)
            .field("jina_base_url", &self.jina_base_url)
            .field(
                "jina_api_key",
                &self.jina_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ExtractorConfig {
    /// The API key to use, `JINA_API_KEY` first, then the config file.
    pub fn api_key(&self) -> Option<SecretString> {
        pick_api_key(std::env::var("JINA_API_KEY").ok(), self.jina_api_key.as_deref())
    }
}

fn pick_api_key(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|k| !k.trim().is_empty())
        .or_else(|| file.filter(|k| !k.trim().is_empty()).map(str::to_string))
        .map(SecretString::from)
}

/// `[tracking]` table: analytics beacon settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,

    /// Measurement endpoint beacons are sent to.
    pub endpoint: String,

    /// Analytics property the hits are recorded under (`tid`).
    pub property_id: String,

    /// Document host name reported with each hit (`dh`).
    pub hostname: String,

    /// Attach the requesting client's IP (`uip`) to dispatched beacons.
    pub include_client_ip: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_TRACKING_ENDPOINT.to_string(),
            property_id: String::new(),
            hostname: String::new(),
            include_client_ip: true,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "listen",
    "log_level",
    "cache_url",
    "allow_local_fetch",
    "propagate_title",
    "extractor",
    "tracking",
];
const KNOWN_EXTRACTOR_KEYS: &[&str] = &["kind", "jina_base_url", "jina_api_key"];
const KNOWN_TRACKING_KEYS: &[&str] = &[
    "enabled",
    "endpoint",
    "property_id",
    "hostname",
    "include_client_ip",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            listen = %config.listen,
            cache = config.cache_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }
    for (section, known) in [
        ("extractor", KNOWN_EXTRACTOR_KEYS),
        ("tracking", KNOWN_TRACKING_KEYS),
    ] {
        if let Some(table) = raw.get(section).and_then(toml::Value::as_table) {
            for key in table.keys() {
                if !known.contains(&key.as_str()) {
                    tracing::warn!(section = %section, key = %key, "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("fullfeed_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fullfeed.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen.to_string(), "0.0.0.0:8080");
        assert_eq!(config.log_level, "info");
        assert!(config.cache_url.is_none());
        assert!(!config.allow_local_fetch);
        assert!(config.propagate_title);
        assert_eq!(config.extractor.kind, ExtractorKind::Readability);
        assert!(config.tracking.enabled);
        assert!(config.tracking.include_client_ip);
        assert_eq!(config.tracking.endpoint, DEFAULT_TRACKING_ENDPOINT);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/fullfeed_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (dir, path) = write_config("empty", "");
        let config = Config::load(&path).unwrap();
        assert!(config.propagate_title);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "info");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "cache_url = \"memory\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache_url.as_deref(), Some("memory"));
        assert!(config.propagate_title); // default
        assert!(config.tracking.enabled); // default
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
listen = "127.0.0.1:9000"
log_level = "debug"
cache_url = "redis://127.0.0.1:6379/"
allow_local_fetch = true
propagate_title = false

[extractor]
kind = "jina"
jina_base_url = "https://reader.example.com"
jina_api_key = "test-key-123"

[tracking]
enabled = false
endpoint = "https://collect.example.com/collect"
property_id = "UA-1-1"
hostname = "feeds.example.com"
include_client_ip = false
"#;
        let (dir, path) = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.cache_url.as_deref(), Some("redis://127.0.0.1:6379/"));
        assert!(config.allow_local_fetch);
        assert!(!config.propagate_title);
        assert_eq!(config.extractor.kind, ExtractorKind::Jina);
        assert_eq!(
            config.extractor.jina_base_url.as_deref(),
            Some("https://reader.example.com")
        );
        assert_eq!(config.extractor.jina_api_key.as_deref(), Some("test-key-123"));
        assert!(!config.tracking.enabled);
        assert_eq!(config.tracking.property_id, "UA-1-1");
        assert_eq!(config.tracking.hostname, "feeds.example.com");
        assert!(!config.tracking.include_client_ip);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
log_level = "warn"
totally_fake_key = "should not fail"

[tracking]
another_unknown = 42
"#;
        let (dir, path) = write_config("unknown", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "warn");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "propagate_title = \"yes\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_listen_address_returns_error() {
        let (dir, path) = write_config("badlisten", "listen = \"not an address\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_extractor_kind_returns_error() {
        let (dir, path) = write_config("badkind", "[extractor]\nkind = \"magic\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-015: Debug output masks API key
    #[test]
    fn test_debug_masks_api_key() {
        let mut config = Config::default();
        config.extractor.jina_api_key = Some("super-secret-key-12345".to_string());

        let debug_output = format!("{:?}", config);
        assert!(
            !debug_output.contains("super-secret-key-12345"),
            "Debug output should not contain the API key"
        );
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should show [REDACTED] for API key"
        );
    }

    #[test]
    fn test_env_api_key_takes_precedence() {
        let key = pick_api_key(Some("from-env".to_string()), Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-env");

        let key = pick_api_key(None, Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-file");

        let key = pick_api_key(Some("  ".to_string()), Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-file");

        assert!(pick_api_key(None, None).is_none());
        assert!(pick_api_key(None, Some("")).is_none());
    }
}
