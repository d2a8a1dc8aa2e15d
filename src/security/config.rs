use std::path::PathBuf;

use serde::Deserialize;

/// Interpreter name that matches any bare binary invocation when its
/// `executables` list is empty.
pub const BINARY_INTERPRETER: &str = "binary";

/// Top-level layout of `shell-security.yaml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SecurityFile {
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityConfig {
    /// Master switch. When false, every command passes through unchanged.
    #[serde(default)]
    pub enable_validation: bool,

    #[serde(default)]
    pub allowed_paths: Vec<AllowedPath>,

    #[serde(default)]
    pub allowed_interpreters: Vec<AllowedInterpreter>,

    #[serde(default)]
    pub command_parsing: CommandParsing,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Verdict for commands that survive the syntax checks when no
    /// interpreter whitelist is configured. Must be set explicitly whenever
    /// validation is enabled; there is no implicit default.
    #[serde(default)]
    pub default_policy: Option<DefaultPolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    Deny,
    Allow,
}

/// A directory in which scripts or binaries may reside.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AllowedPath {
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recursive: bool,
    /// Component depth below `path` a file may sit at when `recursive` is
    /// true. Negative means unlimited.
    #[serde(default = "unlimited_depth")]
    pub max_depth: i32,
}

fn unlimited_depth() -> i32 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AllowedInterpreter {
    pub name: String,
    #[serde(default)]
    pub executables: Vec<String>,
    /// Extensions with leading dot, e.g. ".py".
    #[serde(default)]
    pub file_extensions: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandParsing {
    #[serde(default)]
    pub allow_pipes: bool,
    #[serde(default)]
    pub allow_redirection: bool,
    #[serde(default)]
    pub allow_chaining: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_denied_commands: bool,
    #[serde(default)]
    pub log_allowed_commands: bool,
}
