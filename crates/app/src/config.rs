use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use workbg_core::download::{NetworkConditions, DEFAULT_DOWNLOAD_URL, DEFAULT_MIME_TYPE};
use workbg_worker::HostConfig;

use crate::controller::{ControllerSettings, DownloadTarget};
use crate::error::{AppError, AppResult};

/// How the storage permission is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Ask on the console the first time a download is requested.
    Prompt,
    /// Treat the permission as already granted.
    Granted,
    /// Answer every prompt with a denial.
    Denied,
}

impl FromStr for PermissionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" | "ask" => Ok(Self::Prompt),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(AppError::Config(format!(
                "STORAGE_PERMISSION must be one of prompt, granted, denied; got '{other}'"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// All fields have defaults suitable for running the console locally.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Asset fetched by the `download` command.
    pub download_url: String,
    pub download_mime_type: Option<String>,
    /// Directory the public `Downloads` folder lives under.
    pub public_storage_root: PathBuf,
    pub connect_timeout: Duration,
    pub bind_latency: Duration,
    pub storage_permission: PermissionMode,
    pub network: NetworkConditions,
    /// How long shutdown waits for in-flight downloads before cancelling them.
    pub download_shutdown_grace: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `DOWNLOAD_URL`                 | the sample MP3          |
    /// | `DOWNLOAD_MIME_TYPE`           | `audio/mpeg`            |
    /// | `PUBLIC_STORAGE_ROOT`          | `$HOME`, else `.`       |
    /// | `CONNECT_TIMEOUT_MS`           | `5000`                  |
    /// | `BIND_LATENCY_MS`              | `50`                    |
    /// | `STORAGE_PERMISSION`           | `prompt`                |
    /// | `NETWORK_METERED`              | `false`                 |
    /// | `NETWORK_ROAMING`              | `false`                 |
    /// | `DOWNLOAD_SHUTDOWN_GRACE_SECS` | `30`                    |
    pub fn from_env() -> AppResult<Self> {
        let download_url =
            std::env::var("DOWNLOAD_URL").unwrap_or_else(|_| DEFAULT_DOWNLOAD_URL.into());

        let download_mime_type = match std::env::var("DOWNLOAD_MIME_TYPE") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(v.trim().to_string()),
            Err(_) => Some(DEFAULT_MIME_TYPE.to_string()),
        };

        let public_storage_root = std::env::var("PUBLIC_STORAGE_ROOT")
            .or_else(|_| std::env::var("HOME"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let connect_timeout = Duration::from_millis(parse_var("CONNECT_TIMEOUT_MS", 5000)?);
        let bind_latency = Duration::from_millis(parse_var("BIND_LATENCY_MS", 50)?);
        let storage_permission = parse_var("STORAGE_PERMISSION", PermissionMode::Prompt)?;
        let network = NetworkConditions {
            metered: parse_var("NETWORK_METERED", false)?,
            roaming: parse_var("NETWORK_ROAMING", false)?,
        };
        let download_shutdown_grace =
            Duration::from_secs(parse_var("DOWNLOAD_SHUTDOWN_GRACE_SECS", 30)?);

        Ok(Self {
            download_url,
            download_mime_type,
            public_storage_root,
            connect_timeout,
            bind_latency,
            storage_permission,
            network,
            download_shutdown_grace,
        })
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            bind_latency: self.bind_latency,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            connect_timeout: self.connect_timeout,
        }
    }

    pub fn download_target(&self) -> DownloadTarget {
        DownloadTarget {
            url: self.download_url.clone(),
            mime_type: self.download_mime_type.clone(),
        }
    }
}

/// Parse `key` if set, otherwise return `default`.
fn parse_var<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}
