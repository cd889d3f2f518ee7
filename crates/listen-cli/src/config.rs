//! Configuration file management for listen-in.
//!
//! Provides an optional TOML config file at `~/.config/listen-in/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use listen_core::attach::AttachOptions;
use listen_core::locate::LocateOptions;

/// Process name used when nothing else names one.
pub const DEFAULT_PROCESS_NAME: &str = "uci";
pub const DEFAULT_LOCATOR: &str = "pidof";
pub const DEFAULT_BACKEND: &str = "procfd";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub target: TargetSection,
    pub locate: LocateSection,
    pub attach: AttachSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSection {
    pub process_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocateSection {
    /// `"pidof"` or `"procfs"`.
    pub mode: Option<String>,
    pub pidof_binary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttachSection {
    /// `"procfd"` or `"tail"`.
    pub backend: Option<String>,
    pub tail_binary: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub backlog_lines: Option<usize>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the listen-in config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/listen-in` or
/// `~/.config/listen-in`, never the platform-specific `dirs::config_dir()`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("listen-in");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("listen-in")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read
// -----------------------------------------------------------------------

/// Load and parse the config file. A missing file is `Ok(None)`; a file
/// that exists but cannot be read or parsed is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = parse_config(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

pub fn parse_config(contents: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(contents)?)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub process_name: Option<String>,
    pub locator: Option<String>,
    pub backend: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub backlog_lines: Option<usize>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub process_name: String,
    pub locator: String,
    pub backend: String,
    pub locate_options: LocateOptions,
    pub attach_options: AttachOptions,
}

impl ListenConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Process name: `PROCESS_NAME` arg > `LISTEN_IN_PROCESS` > `target.process_name` > `"uci"`
    /// - Locator: `--locator` > `LISTEN_IN_LOCATOR` > `locate.mode` > `"pidof"`
    /// - Backend: `--backend` > `LISTEN_IN_BACKEND` > `attach.backend` > `"procfd"`
    /// - Poll interval and backlog: flag > config file > default
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file_config = load_config()?;
        Self::resolve_with(cli, file_config.unwrap_or_default())
    }

    /// Resolve against an already-loaded config file.
    pub fn resolve_with(cli: &CliOverrides, file: ConfigFile) -> Result<Self> {
        let process_name = pick(
            cli.process_name.clone(),
            "LISTEN_IN_PROCESS",
            file.target.process_name,
            DEFAULT_PROCESS_NAME,
        );
        if process_name.trim().is_empty() {
            bail!("process name must not be empty");
        }

        let locator = pick(
            cli.locator.clone(),
            "LISTEN_IN_LOCATOR",
            file.locate.mode,
            DEFAULT_LOCATOR,
        );
        let backend = pick(
            cli.backend.clone(),
            "LISTEN_IN_BACKEND",
            file.attach.backend,
            DEFAULT_BACKEND,
        );

        let mut locate_options = LocateOptions::default();
        if let Some(binary) = file.locate.pidof_binary {
            locate_options.pidof_binary = binary;
        }

        let mut attach_options = AttachOptions::default();
        if let Some(binary) = file.attach.tail_binary {
            attach_options.tail_binary = binary;
        }
        if let Some(ms) = cli.poll_interval_ms.or(file.attach.poll_interval_ms) {
            if ms == 0 {
                bail!("poll interval must be at least 1 ms");
            }
            attach_options.poll_interval = Duration::from_millis(ms);
        }
        if let Some(lines) = cli.backlog_lines.or(file.attach.backlog_lines) {
            attach_options.backlog_lines = lines;
        }

        Ok(Self {
            process_name,
            locator,
            backend,
            locate_options,
            attach_options,
        })
    }
}

/// One step of the chain for a string setting.
fn pick(cli: Option<String>, env_var: &str, file: Option<String>, default: &str) -> String {
    if let Some(value) = cli {
        value
    } else if let Ok(value) = std::env::var(env_var) {
        value
    } else if let Some(value) = file {
        value
    } else {
        default.to_string()
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn clear_env() {
        unsafe { std::env::remove_var("LISTEN_IN_PROCESS") };
        unsafe { std::env::remove_var("LISTEN_IN_LOCATOR") };
        unsafe { std::env::remove_var("LISTEN_IN_BACKEND") };
    }

    #[test]
    fn parse_full_config_file() {
        let cfg = parse_config(
            r#"
[target]
process_name = "stockfish"

[locate]
mode = "procfs"
pidof_binary = "/usr/bin/pidof"

[attach]
backend = "tail"
tail_binary = "/usr/bin/tail"
poll_interval_ms = 50
backlog_lines = 0
"#,
        )
        .unwrap();

        assert_eq!(cfg.target.process_name.as_deref(), Some("stockfish"));
        assert_eq!(cfg.locate.mode.as_deref(), Some("procfs"));
        assert_eq!(cfg.locate.pidof_binary.as_deref(), Some("/usr/bin/pidof"));
        assert_eq!(cfg.attach.backend.as_deref(), Some("tail"));
        assert_eq!(cfg.attach.tail_binary.as_deref(), Some("/usr/bin/tail"));
        assert_eq!(cfg.attach.poll_interval_ms, Some(50));
        assert_eq!(cfg.attach.backlog_lines, Some(0));
    }

    #[test]
    fn parse_partial_config_file() {
        let cfg = parse_config("[attach]\nbackend = \"tail\"\n").unwrap();
        assert!(cfg.target.process_name.is_none());
        assert!(cfg.locate.mode.is_none());
        assert_eq!(cfg.attach.backend.as_deref(), Some("tail"));
    }

    #[test]
    fn parse_rejects_unknown_keys() {
        assert!(parse_config("[attach]\nbackend_name = \"tail\"\n").is_err());
        assert!(parse_config("not toml at all [").is_err());
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        clear_env();

        let config = ListenConfig::resolve_with(&CliOverrides::default(), ConfigFile::default())
            .unwrap();
        assert_eq!(config.process_name, "uci");
        assert_eq!(config.locator, "pidof");
        assert_eq!(config.backend, "procfd");
        assert_eq!(config.locate_options.pidof_binary, "pidof");
        assert_eq!(config.attach_options.tail_binary, "tail");
        assert_eq!(config.attach_options.poll_interval, Duration::from_millis(200));
        assert_eq!(config.attach_options.backlog_lines, 10);
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var("LISTEN_IN_PROCESS", "from-env") };
        unsafe { std::env::set_var("LISTEN_IN_BACKEND", "tail") };

        let mut file = ConfigFile::default();
        file.target.process_name = Some("from-file".to_string());
        file.attach.poll_interval_ms = Some(500);

        let cli = CliOverrides {
            process_name: Some("from-cli".to_string()),
            backend: Some("procfd".to_string()),
            poll_interval_ms: Some(25),
            ..CliOverrides::default()
        };
        let config = ListenConfig::resolve_with(&cli, file).unwrap();
        clear_env();

        assert_eq!(config.process_name, "from-cli");
        assert_eq!(config.backend, "procfd");
        assert_eq!(config.attach_options.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var("LISTEN_IN_PROCESS", "from-env") };
        unsafe { std::env::set_var("LISTEN_IN_LOCATOR", "procfs") };

        let mut file = ConfigFile::default();
        file.target.process_name = Some("from-file".to_string());
        file.locate.mode = Some("pidof".to_string());
        file.attach.backend = Some("tail".to_string());

        let config = ListenConfig::resolve_with(&CliOverrides::default(), file).unwrap();
        clear_env();

        assert_eq!(config.process_name, "from-env");
        assert_eq!(config.locator, "procfs");
        assert_eq!(config.backend, "tail");
    }

    #[test]
    fn resolve_rejects_zero_poll_interval() {
        let _lock = lock_env();
        clear_env();

        let cli = CliOverrides {
            poll_interval_ms: Some(0),
            ..CliOverrides::default()
        };
        let err = ListenConfig::resolve_with(&cli, ConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("poll interval"), "got: {err}");
    }

    #[test]
    fn resolve_rejects_empty_process_name() {
        let _lock = lock_env();
        clear_env();

        let cli = CliOverrides {
            process_name: Some("  ".to_string()),
            ..CliOverrides::default()
        };
        assert!(ListenConfig::resolve_with(&cli, ConfigFile::default()).is_err());
    }

    #[test]
    fn load_config_missing_file_is_none() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = load_config();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("listen-in");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[attach\nbackend = ").unwrap();

        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = load_config();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("failed to parse config file"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("listen-in/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
