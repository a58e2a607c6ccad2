//! TOML-based configuration for svnwc.
//!
//! A [`WcConfig`] is loaded once per invocation and then passed by reference
//! into the status classifier, the driver and the resolver. Commands for the
//! external editor and merge tool are stored as `_env` fields naming
//! environment variables; they are resolved at runtime via
//! [`WcConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::ConflictChoice;
use crate::errors::ConfigError;

/// Name of the administrative directory inside a working-copy root.
pub const ADMIN_DIR: &str = ".svnwc";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WcConfig {
    #[serde(default)]
    pub log: LogConfig,

    /// Status walk settings (ignore patterns).
    #[serde(default)]
    pub status: StatusConfig,

    /// Textual merge settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Conflict resolution settings.
    #[serde(default)]
    pub resolve: ResolveConfig,
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Settings for the status walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Glob patterns applied to every unversioned name, in addition to the
    /// `svn:ignore` property of its parent directory.
    #[serde(default = "default_global_ignores")]
    pub global_ignores: Vec<String>,
}

fn default_global_ignores() -> Vec<String> {
    ["*.o", "*.lo", "*.la", "*.rej", "*~", "#*#", ".#*", ".*.swp", ".DS_Store"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            global_ignores: default_global_ignores(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// How conflicting hunks are rendered into the working file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStyle {
    /// `<<<<<<<` mine `=======` theirs `>>>>>>>`.
    #[default]
    Merge,
    /// Like `Merge`, with the base text between `|||||||` and `=======`.
    Diff3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub conflict_style: ConflictStyle,

    /// Length of the conflict marker runs (default 7).
    #[serde(default = "default_marker_size")]
    pub marker_size: usize,
}

fn default_marker_size() -> usize {
    7
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            conflict_style: ConflictStyle::default(),
            marker_size: default_marker_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Choice applied when no `--accept` is given and no prompt is possible.
    #[serde(default = "default_accept")]
    pub accept: String,

    /// Environment variable holding the editor command.
    #[serde(default = "default_editor_env")]
    pub editor_env: String,

    /// Environment variable holding the three-way merge tool command.
    #[serde(default = "default_merge_tool_env")]
    pub merge_tool_env: String,

    /// Resolved editor command (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub editor: Option<String>,

    /// Resolved merge tool command (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub merge_tool: Option<String>,
}

fn default_accept() -> String {
    "postpone".into()
}
fn default_editor_env() -> String {
    "SVN_EDITOR".into()
}
fn default_merge_tool_env() -> String {
    "SVN_MERGE".into()
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            accept: default_accept(),
            editor_env: default_editor_env(),
            merge_tool_env: default_merge_tool_env(),
            editor: None,
            merge_tool: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl WcConfig {
    /// Load a [`WcConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: WcConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Pick the first existing file among `explicit`, the working copy's
    /// admin area and `user_dir`; fall back to defaults when none exists.
    ///
    /// An explicit path that does not exist is an error.
    pub fn discover(
        explicit: Option<&Path>,
        wc_root: Option<&Path>,
        user_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        let candidates: Vec<PathBuf> = [
            wc_root.map(|root| root.join(ADMIN_DIR).join("config.toml")),
            user_dir.map(|dir| dir.join("svnwc").join("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        for candidate in candidates {
            if candidate.is_file() {
                return Self::load_from_file(candidate);
            }
        }
        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Resolve the `*_env` fields from environment variables.
    ///
    /// Missing variables only log a warning; the interactive resolver checks
    /// the `Option` fields before offering `edit` or `launch`.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        self.resolve.editor = resolve_optional_env(&self.resolve.editor_env, "resolve.editor_env")
            .or_else(|| resolve_optional_env("EDITOR", "resolve.editor_env"));
        self.resolve.merge_tool =
            resolve_optional_env(&self.resolve.merge_tool_env, "resolve.merge_tool_env");

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
        if !LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: format!("'{}' is not one of {}", self.log.level, LEVELS.join(", ")),
            });
        }
        if !(3..=32).contains(&self.merge.marker_size) {
            return Err(ConfigError::InvalidValue {
                field: "merge.marker_size".into(),
                detail: "marker size must be between 3 and 32".into(),
            });
        }
        if ConflictChoice::from_str_val(&self.resolve.accept).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "resolve.accept".into(),
                detail: format!("unknown resolution '{}'", self.resolve.accept),
            });
        }
        for pattern in &self.status.global_ignores {
            if pattern.is_empty() || pattern.contains('/') {
                return Err(ConfigError::InvalidValue {
                    field: "status.global_ignores".into(),
                    detail: format!("pattern '{pattern}' must be a non-empty file name glob"),
                });
            }
        }
        Ok(())
    }

    /// Default choice for non-interactive resolution.
    pub fn default_accept(&self) -> ConflictChoice {
        ConflictChoice::from_str_val(&self.resolve.accept).unwrap_or(ConflictChoice::Postpone)
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Render this config as TOML (used by `config init`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            debug!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[log]
level = "debug"

[status]
global_ignores = ["*.tmp", "target"]

[merge]
conflict_style = "diff3"
marker_size = 9

[resolve]
accept = "theirs-full"
editor_env = "TEST_SVNWC_EDITOR"
merge_tool_env = "TEST_SVNWC_MERGE"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: WcConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.status.global_ignores, vec!["*.tmp", "target"]);
        assert_eq!(config.merge.conflict_style, ConflictStyle::Diff3);
        assert_eq!(config.merge.marker_size, 9);
        assert_eq!(config.default_accept(), ConflictChoice::TheirsFull);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config: WcConfig = toml::from_str("").unwrap();
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.merge.conflict_style, ConflictStyle::Merge);
        assert_eq!(config.merge.marker_size, 7);
        assert!(config.status.global_ignores.iter().any(|p| p == "*.o"));
        assert_eq!(config.default_accept(), ConflictChoice::Postpone);
        config.validate().unwrap();
    }

    #[test]
    fn test_file_not_found() {
        let result = WcConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WcConfig::default();
        config.resolve.accept = "whatever".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "resolve.accept"
        ));

        let mut config = WcConfig::default();
        config.merge.marker_size = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "merge.marker_size"
        ));

        let mut config = WcConfig::default();
        config.log.level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_discover_prefers_wc_config() {
        let dir = tempfile::tempdir().unwrap();
        let admin = dir.path().join(ADMIN_DIR);
        std::fs::create_dir_all(&admin).unwrap();
        let mut f = std::fs::File::create(admin.join("config.toml")).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = WcConfig::discover(None, Some(dir.path()), None).unwrap();
        assert_eq!(config.merge.marker_size, 9);

        let empty = tempfile::tempdir().unwrap();
        let config = WcConfig::discover(None, Some(empty.path()), None).unwrap();
        assert_eq!(config.merge.marker_size, 7);

        assert!(WcConfig::discover(Some(Path::new("/nonexistent.toml")), None, None).is_err());
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_SVNWC_MERGE", "kdiff3");
        let mut config: WcConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.resolve.merge_tool.as_deref(), Some("kdiff3"));
        std::env::remove_var("TEST_SVNWC_MERGE");
    }

    #[test]
    fn test_to_toml_round_trips_defaults() {
        let text = WcConfig::default().to_toml().unwrap();
        let parsed: WcConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.merge.marker_size, 7);
        assert_eq!(parsed.resolve.accept, "postpone");
    }
}
