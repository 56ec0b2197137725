//! Repository configuration (`<repo>/config.toml`).
//!
//! Covers the default branch, the commit author used by the CLI, domain-file
//! patterns and the external merge tool, and the default log level.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bimgit_core::{CommandResolver, MergeOptions, Signature};
use serde::Deserialize;

/// File name of the configuration inside a repository.
pub const CONFIG_FILE: &str = "config.toml";

/// Written by `bimgit init` when no config exists yet.
pub const DEFAULT_CONFIG_TOML: &str = r#"[repo]
default_branch = "main"

[author]
name = "bimgit"
email = "bimgit@localhost"

[merge]
domain_files = ["*.ifc"]

[merge.resolver]
# command = "ifcmerge"
args = []
timeout_seconds = 300

[log]
level = "info"
"#;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level repository configuration.
///
/// Missing fields use defaults. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BimgitConfig {
    #[serde(default)]
    pub repo: RepoConfig,

    #[serde(default)]
    pub author: AuthorConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// RepoConfig
// ---------------------------------------------------------------------------

/// Repository-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// Branch used when a command omits one (default: `"main"`).
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
        }
    }
}

fn default_branch() -> String {
    "main".to_owned()
}

// ---------------------------------------------------------------------------
// AuthorConfig
// ---------------------------------------------------------------------------

/// Identity stamped on commits made through the CLI.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorConfig {
    #[serde(default = "default_author_name")]
    pub name: String,
    #[serde(default = "default_author_email")]
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

impl AuthorConfig {
    /// A signature for this author at the current time.
    #[must_use]
    pub fn signature(&self) -> Signature {
        Signature::now(&self.name, &self.email)
    }
}

fn default_author_name() -> String {
    "bimgit".to_owned()
}

fn default_author_email() -> String {
    "bimgit@localhost".to_owned()
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Merge settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Glob patterns for files offered to the merge tool.
    #[serde(default = "default_domain_files")]
    pub domain_files: Vec<String>,

    /// External merge tool.
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            domain_files: default_domain_files(),
            resolver: ResolverConfig::default(),
        }
    }
}

fn default_domain_files() -> Vec<String> {
    vec![bimgit_core::merge::DEFAULT_DOMAIN_PATTERN.to_owned()]
}

impl MergeConfig {
    /// Engine options built from this section.
    ///
    /// # Errors
    /// Returns `ConfigError` if a domain pattern is not a valid glob.
    pub fn options(&self) -> Result<MergeOptions, ConfigError> {
        let mut options =
            MergeOptions::with_domain_files(&self.domain_files).map_err(|e| ConfigError {
                path: None,
                message: format!("merge.domain_files: {e}"),
            })?;
        options.resolver_timeout = Duration::from_secs(self.resolver.timeout_seconds.into());
        Ok(options)
    }

    /// The configured merge tool, if any.
    #[must_use]
    pub fn command_resolver(&self) -> Option<CommandResolver> {
        self.resolver
            .command
            .as_ref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| CommandResolver::new(c.clone(), self.resolver.args.clone()))
    }
}

/// External merge tool, run as `<command> [args] <base> <ours> <theirs> -o <out>`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Program to run. Absent: conflicts are never auto-resolved.
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments placed before the file paths.
    #[serde(default)]
    pub args: Vec<String>,

    /// Kill the tool after this many seconds (default: 300).
    #[serde(default = "default_resolver_timeout")]
    pub timeout_seconds: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_seconds: default_resolver_timeout(),
        }
    }
}

const fn default_resolver_timeout() -> u32 {
    300
}

// ---------------------------------------------------------------------------
// LogConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: `"info"`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl BimgitConfig {
    /// Load `config.toml` from a repository root.
    ///
    /// # Errors
    /// See [`load`](Self::load).
    pub fn load_repo(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE))
    }

    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - Invalid TOML, unknown fields, or bad glob patterns are errors.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or a domain
    /// pattern that is not a valid glob.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        config.merge.options()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = BimgitConfig::default();
        assert_eq!(cfg.repo.default_branch, "main");
        assert_eq!(cfg.author.name, "bimgit");
        assert_eq!(cfg.author.email, "bimgit@localhost");
        assert_eq!(cfg.merge.domain_files, ["*.ifc"]);
        assert_eq!(cfg.merge.resolver.command, None);
        assert_eq!(cfg.merge.resolver.timeout_seconds, 300);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.merge.command_resolver().is_none());
    }

    #[test]
    fn parse_empty_string() {
        let cfg = BimgitConfig::parse("").unwrap();
        assert_eq!(cfg, BimgitConfig::default());
    }

    #[test]
    fn template_matches_defaults() {
        assert_eq!(
            BimgitConfig::parse(DEFAULT_CONFIG_TOML).unwrap(),
            BimgitConfig::default()
        );
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[repo]
default_branch = "trunk"

[author]
name = "Site Office"
email = "office@example.com"

[merge]
domain_files = ["*.ifc", "models/**/*.step"]

[merge.resolver]
command = "ifcmerge"
args = ["--quiet"]
timeout_seconds = 60

[log]
level = "debug"
"#;
        let cfg = BimgitConfig::parse(toml).unwrap();
        assert_eq!(cfg.repo.default_branch, "trunk");
        assert_eq!(cfg.author.name, "Site Office");
        assert_eq!(cfg.merge.domain_files.len(), 2);
        assert_eq!(cfg.merge.resolver.args, ["--quiet"]);
        assert_eq!(cfg.log.level, "debug");

        let options = cfg.merge.options().unwrap();
        assert_eq!(options.resolver_timeout, Duration::from_secs(60));
        assert!(options.is_domain_file("models/a/b.step"));
        assert_eq!(
            cfg.merge.command_resolver().map(|r| r.program().to_owned()),
            Some("ifcmerge".to_owned())
        );
    }

    #[test]
    fn unknown_field_reports_line() {
        let err = BimgitConfig::parse("[repo]\ndefault_branch = \"main\"\ncolour = 1\n").unwrap_err();
        assert!(err.message.contains("line 3"), "{}", err.message);
    }

    #[test]
    fn bad_glob_rejected_at_load() {
        let err = BimgitConfig::parse("[merge]\ndomain_files = [\"[oops\"]\n").unwrap_err();
        assert!(err.message.contains("merge.domain_files"), "{}", err.message);
    }

    #[test]
    fn blank_command_means_no_resolver() {
        let cfg = BimgitConfig::parse("[merge.resolver]\ncommand = \"  \"\n").unwrap();
        assert!(cfg.merge.command_resolver().is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_author_round_trips(name in "[A-Za-z][A-Za-z ]{0,20}", email in "[a-z]{1,8}@[a-z]{1,8}\\.com") {
            let toml = format!("[author]\nname = \"{name}\"\nemail = \"{email}\"\n");
            let cfg = BimgitConfig::parse(&toml).unwrap();
            proptest::prop_assert_eq!(&cfg.author.name, &name);
            proptest::prop_assert_eq!(&cfg.author.email, &email);
            proptest::prop_assert_eq!(cfg.repo, RepoConfig::default());
        }
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BimgitConfig::load_repo(dir.path()).unwrap();
        assert_eq!(cfg, BimgitConfig::default());
    }

    #[test]
    fn load_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[repo\n").unwrap();
        let err = BimgitConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }
}
