use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, LinkResult};

/// Port the host listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 20500;
/// Address used when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Connection and launch settings for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host name or address of the simulation host.
    pub host: String,
    /// TCP port the host listens on; also passed as `-PORT=` when launching.
    pub port: u16,
    /// Deadline applied to every non-blocking request.
    pub timeout: Duration,
    /// Launch the host executable when the first connection attempt fails.
    pub auto_start: bool,
    /// Host executable; falls back to [`default_executable`] when unset.
    pub executable: Option<PathBuf>,
    /// Pass `-NEWINSTANCE` so a distinct host process is started.
    pub new_instance: bool,
    /// Pass `-NOSPLASH`.
    pub no_splash: bool,
    /// Pass `-NOSHOW`.
    pub no_show: bool,
    /// Pass `-HIDDEN` to run the host without its user interface.
    pub hidden: bool,
    /// `-KEY=VALUE` pairs appended to the launch command line.
    pub params: BTreeMap<String, String>,
    /// Additional raw arguments passed through to the host.
    pub extra_args: Vec<String>,
    /// Extra environment variables applied to the launched process.
    pub env: BTreeMap<String, String>,
    /// Optional working directory for the launched process.
    pub working_directory: Option<PathBuf>,
    /// Upper bound on how long to wait for a launched host to accept connections.
    pub spawn_timeout: Duration,
    /// Delay between connection attempts while waiting for a launched host.
    pub retry_interval: Duration,
    /// Mirror every exchange to the log at debug level.
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(10),
            auto_start: false,
            executable: None,
            new_instance: false,
            no_splash: true,
            no_show: false,
            hidden: false,
            params: BTreeMap::new(),
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            spawn_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(100),
            debug: false,
        }
    }
}

impl SessionConfig {
    /// Target a specific host and port with every other setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Defaults overridden by `ROBOLINK_*` environment variables.
    ///
    /// Recognised: `ROBOLINK_HOST`, `ROBOLINK_PORT`, `ROBOLINK_TIMEOUT_MS`,
    /// `ROBOLINK_EXECUTABLE`, `ROBOLINK_AUTO_START`, `ROBOLINK_DEBUG`.
    pub fn from_env() -> LinkResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LinkResult<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup("ROBOLINK_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("ROBOLINK_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| LinkError::config(format!("invalid ROBOLINK_PORT: {port}")))?;
        }
        if let Some(ms) = lookup("ROBOLINK_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| LinkError::config(format!("invalid ROBOLINK_TIMEOUT_MS: {ms}")))?;
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("ROBOLINK_EXECUTABLE") {
            config.executable = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup("ROBOLINK_AUTO_START") {
            config.auto_start = parse_flag("ROBOLINK_AUTO_START", &flag)?;
        }
        if let Some(flag) = lookup("ROBOLINK_DEBUG") {
            config.debug = parse_flag("ROBOLINK_DEBUG", &flag)?;
        }
        Ok(config)
    }

    /// Load a JSON document; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> LinkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|err| LinkError::config(format!("{}: {err}", path.display())))
    }

    /// `host:port` as used for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Executable to launch: the configured one or the platform default.
    pub fn resolved_executable(&self) -> PathBuf {
        self.executable.clone().unwrap_or_else(default_executable)
    }

    /// Command-line arguments for launching the host.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.new_instance {
            args.push("-NEWINSTANCE".to_string());
        }
        if self.no_splash {
            args.push("-NOSPLASH".to_string());
        }
        if self.no_show {
            args.push("-NOSHOW".to_string());
        }
        if self.hidden {
            args.push("-HIDDEN".to_string());
        }
        args.push(format!("-PORT={}", self.port));
        for (key, value) in &self.params {
            args.push(format!("-{key}={value}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_new_instance(mut self, enabled: bool) -> Self {
        self.new_instance = enabled;
        self
    }

    pub fn with_hidden(mut self, enabled: bool) -> Self {
        self.hidden = enabled;
        self
    }

    pub fn with_no_show(mut self, enabled: bool) -> Self {
        self.no_show = enabled;
        self
    }

    pub fn with_no_splash(mut self, enabled: bool) -> Self {
        self.no_splash = enabled;
        self
    }

    /// Add a `-KEY=VALUE` launch parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a passthrough launch argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add an environment variable for the launched process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_spawn_timeout(mut self, timeout: Duration) -> Self {
        self.spawn_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }
}

fn parse_flag(key: &str, value: &str) -> LinkResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(LinkError::config(format!("invalid {key}: {other}"))),
    }
}

/// Where the host is installed by default on this platform.
pub fn default_executable() -> PathBuf {
    if cfg!(windows) {
        return PathBuf::from(r"C:\RoboDK\bin\RoboDK.exe");
    }
    if cfg!(target_os = "macos") {
        return PathBuf::from("/Applications/RoboDK.app/Contents/MacOS/RoboDK");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/opt"))
        .join("RoboDK")
        .join("bin")
        .join("RoboDK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn launch_args_carry_flags_port_and_params() {
        let config = SessionConfig::new("localhost", 20600)
            .with_new_instance(true)
            .with_hidden(true)
            .with_param("TREE_STATE", "-1")
            .with_arg("station.rdk");
        assert_eq!(
            config.launch_args(),
            vec![
                "-NEWINSTANCE",
                "-NOSPLASH",
                "-HIDDEN",
                "-PORT=20600",
                "-TREE_STATE=-1",
                "station.rdk",
            ]
        );
        assert_eq!(config.address(), "localhost:20600");
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("ROBOLINK_HOST", "10.0.0.7"),
            ("ROBOLINK_PORT", "20501"),
            ("ROBOLINK_TIMEOUT_MS", "2500"),
            ("ROBOLINK_AUTO_START", "yes"),
        ]
        .into_iter()
        .collect();
        let config =
            SessionConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 20501);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert!(config.auto_start);
        assert!(!config.debug);
    }

    #[test]
    fn bad_environment_values_are_config_errors() {
        let err = SessionConfig::from_lookup(|key| {
            (key == "ROBOLINK_PORT").then(|| "not-a-port".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn json_documents_fill_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "port": 20777, "hidden": true }"#).unwrap();
        let config = SessionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.port, 20777);
        assert!(config.hidden);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
