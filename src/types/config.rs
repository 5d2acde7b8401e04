//! Configuration structures.
//!
//! Configuration is static: loaded once at startup from an optional JSON file,
//! then overridden from environment variables. Nothing here is re-read at
//! runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global tool server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Filesystem sandbox policy.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Outbound network throttling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Dispatch engine settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Web tool settings.
    #[serde(default)]
    pub web: WebConfig,

    /// IPC transport configuration.
    #[serde(default)]
    pub ipc: IpcConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `TOOLHUB_*` environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("TOOLHUB_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(roots) = lookup("TOOLHUB_ALLOWED_ROOTS") {
            self.sandbox.allowed_roots = roots
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(secs) = lookup("TOOLHUB_CALL_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::validation(format!("TOOLHUB_CALL_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            self.dispatch.call_timeout = Duration::from_secs(secs);
        }
        if let Some(format) = lookup("TOOLHUB_LOG_FORMAT") {
            self.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IPC server bind address (TCP).
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50061".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Filesystem sandbox policy for file-oriented tools and resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directories that file tools may touch. Canonicalized at startup.
    pub allowed_roots: Vec<PathBuf>,

    /// Allowed file extensions (with leading dot). Empty = any extension.
    pub allowed_extensions: Vec<String>,

    /// Create missing roots at startup instead of skipping them.
    #[serde(default)]
    pub create_roots: bool,

    /// Largest file the data tools will load into memory.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_roots: vec![PathBuf::from("./data")],
            allowed_extensions: [
                ".txt", ".md", ".json", ".csv", ".log", ".py", ".js", ".html", ".css",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            create_roots: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// What a network-class call is throttled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKey {
    /// Remote host of the call's URL argument (falls back to the tool name).
    Host,
    /// Tool name.
    Tool,
}

/// Fixed-window rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Calls admitted per key per window.
    pub max_calls: u32,

    /// Key derivation for network-class calls.
    pub key_by: RateLimitKey,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            max_calls: 10,
            key_by: RateLimitKey::Host,
        }
    }
}

/// Dispatch engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Overall per-call deadline. Calls exceeding it report `Timeout`.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Web tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Per-request HTTP timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum accepted response body size in bytes.
    pub max_response_bytes: usize,

    /// Maximum concurrent outbound requests across all web tools.
    pub max_concurrent: usize,

    /// JSON endpoint returning `[{id, title, body}]` used by `search_web`.
    pub search_endpoint: String,

    /// User-Agent header for outbound requests.
    pub user_agent: String,

    /// Hosts considered known. Others are allowed but logged.
    pub allowed_hosts: Vec<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_response_bytes: 1024 * 1024,
            max_concurrent: 5,
            search_endpoint: "https://jsonplaceholder.typicode.com/posts".to_string(),
            user_agent: concat!("toolhub/", env!("CARGO_PKG_VERSION")).to_string(),
            allowed_hosts: vec![
                "example.com".to_string(),
                "httpbin.org".to_string(),
                "jsonplaceholder.typicode.com".to_string(),
            ],
        }
    }
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent TCP connections. Connections beyond this limit
    /// are dropped on accept.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Connections idle beyond this
    /// duration are dropped.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame.
    pub write_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            max_connections: 64,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"rate_limit": {"window": "2s", "max_calls": 3, "key_by": "tool"}}"#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.window, Duration::from_secs(2));
        assert_eq!(config.rate_limit.max_calls, 3);
        assert_eq!(config.rate_limit.key_by, RateLimitKey::Tool);
        assert_eq!(config.dispatch.call_timeout, Duration::from_secs(30));
        assert_eq!(config.sandbox.allowed_roots, vec![PathBuf::from("./data")]);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TOOLHUB_ALLOWED_ROOTS", "/srv/a:/srv/b"),
            ("TOOLHUB_CALL_TIMEOUT_SECS", "5"),
            ("TOOLHUB_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(
            config.sandbox.allowed_roots,
            vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")]
        );
        assert_eq!(config.dispatch.call_timeout, Duration::from_secs(5));
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_bad_timeout_override_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| {
            (k == "TOOLHUB_CALL_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolhub.json");
        std::fs::write(&path, r#"{"server": {"listen_addr": "0.0.0.0:9000"}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert!(Config::load(dir.path().join("missing.json")).is_err());
    }
}
