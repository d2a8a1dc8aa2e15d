use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use crate::error::{AgentError, Result};
use crate::security::config::{
    AllowedInterpreter, AllowedPath, DefaultPolicy, SecurityConfig, SecurityFile,
    BINARY_INTERPRETER,
};
use crate::security::parser::{self, SimpleCommand};

/// Verdict for one command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: String,
    pub normalized_command: String,
}

impl ValidationResult {
    fn allow(command: &str) -> Self {
        Self {
            valid: true,
            reason: String::new(),
            normalized_command: command.to_string(),
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            valid: false,
            reason,
            normalized_command: String::new(),
        }
    }
}

/// Validates commands against the operator's shell security policy.
///
/// The config is an immutable snapshot guarded by a read-write lock:
/// [`CommandValidator::validate`] and [`CommandValidator::is_enabled`] take
/// the read side, [`CommandValidator::reload`] swaps the snapshot under the
/// write side. A failed reload leaves the previous config in force.
pub struct CommandValidator {
    config_path: PathBuf,
    config: RwLock<SecurityConfig>,
}

impl CommandValidator {
    /// Load the policy from `path`. Errors are fatal to the caller: a worker
    /// that cannot read its security policy must not start.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = Self::load(&path)?;
        Ok(Self {
            config_path: path,
            config: RwLock::new(config),
        })
    }

    fn load(path: &Path) -> Result<SecurityConfig> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Security(format!("failed to read {}: {}", path.display(), e))
        })?;
        let file: SecurityFile = serde_yaml::from_str(&raw).map_err(|e| {
            AgentError::Security(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let config = file.security;
        if config.enable_validation
            && config.allowed_interpreters.is_empty()
            && config.default_policy.is_none()
        {
            return Err(AgentError::Security(
                "security.defaultPolicy must be set to \"deny\" or \"allow\" \
                 when validation is enabled and no interpreter whitelist is configured"
                    .to_string(),
            ));
        }
        Ok(config)
    }

    fn config(&self) -> RwLockReadGuard<'_, SecurityConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.config().enable_validation
    }

    /// Re-read the policy file and swap it in atomically.
    pub fn reload(&self) -> Result<()> {
        let fresh = Self::load(&self.config_path)?;
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *config = fresh;
        tracing::info!(path = %self.config_path.display(), "security config reloaded");
        Ok(())
    }

    /// Validate `command` against the current policy snapshot.
    pub fn validate(&self, command: &str) -> ValidationResult {
        let config = self.config();

        let command = command.trim();
        if !config.enable_validation {
            return ValidationResult::allow(command);
        }
        if command.is_empty() {
            return self.denied(&config, "empty command".to_string(), None);
        }

        // Fail closed: anything the grammar cannot account for is denied.
        let script = match parser::parse(command) {
            Ok(script) => script,
            Err(e) => {
                return self.denied(&config, format!("command parsing failed: {}", e), None)
            }
        };

        // Unconditional checks, regardless of commandParsing toggles.
        if let Some(kind) = script.substitutions.first() {
            return self.denied(
                &config,
                format!("command substitution not allowed: {}", kind),
                None,
            );
        }
        if script.has_background() {
            return self.denied(&config, "background execution not allowed".to_string(), None);
        }

        let parsing = &config.command_parsing;
        if !parsing.allow_pipes && script.has_pipes() {
            return self.denied(&config, "pipes not allowed".to_string(), None);
        }
        if !parsing.allow_redirection && script.has_redirections() {
            return self.denied(&config, "redirection not allowed".to_string(), None);
        }
        if !parsing.allow_chaining && script.has_chaining() {
            return self.denied(&config, "command chaining not allowed".to_string(), None);
        }

        if config.allowed_interpreters.is_empty() {
            // No whitelist configured; the operator-chosen default applies.
            match config.default_policy {
                Some(DefaultPolicy::Allow) => {}
                _ => {
                    return self.denied(
                        &config,
                        "command not in whitelist - default deny policy".to_string(),
                        None,
                    )
                }
            }
        } else {
            // A redirection-only command has no words to resolve.
            let simple = script
                .first_simple_command()
                .filter(|command| !command.words.is_empty());
            let Some(simple) = simple else {
                return self.denied(&config, "missing command".to_string(), None);
            };
            if let Err(reason) = check_whitelist(&config, simple) {
                return self.denied(&config, reason, Some(simple));
            }
        }

        if config.logging.log_allowed_commands {
            tracing::info!(command, "command allowed");
        }
        ValidationResult::allow(command)
    }

    fn denied(
        &self,
        config: &SecurityConfig,
        reason: String,
        command: Option<&SimpleCommand>,
    ) -> ValidationResult {
        if config.logging.log_denied_commands {
            let interpreter = command.and_then(|c| c.words.first().cloned()).unwrap_or_default();
            let args = command.map(|c| c.words[1..].to_vec());
            tracing::warn!(reason = %reason, interpreter = %interpreter, args = ?args, "command denied");
        }
        ValidationResult::deny(reason)
    }
}

/// Resolve the command head against the interpreter whitelist and check the
/// target path rules. Returns the denial reason on failure.
fn check_whitelist(config: &SecurityConfig, command: &SimpleCommand) -> std::result::Result<(), String> {
    // Callers dispatch here only for commands with at least one word.
    let head = &command.words[0];

    let Some(interpreter) = find_interpreter(config, head) else {
        return Err(format!("interpreter '{}' not allowed", head));
    };

    if interpreter.name == BINARY_INTERPRETER {
        return check_binary(config, head);
    }

    // First non-option argument names the file the interpreter will run.
    let Some(target) = command.words[1..].iter().find(|arg| !arg.starts_with('-')) else {
        return Err("missing file path".to_string());
    };

    let abs = match absolutize(Path::new(target)) {
        Ok(p) => p,
        Err(e) => return Err(format!("invalid file path '{}': {}", target, e)),
    };
    if !abs.is_file() {
        return Err(format!("file does not exist: {}", abs.display()));
    }
    if !extension_allowed(&abs, interpreter) {
        return Err(format!(
            "file extension not allowed for interpreter '{}': {}",
            interpreter.name,
            abs.display()
        ));
    }
    if !config.allowed_paths.iter().any(|p| path_allowed(&abs, p)) {
        return Err(format!(
            "file path not in allowed directories: {}",
            abs.display()
        ));
    }
    Ok(())
}

fn find_interpreter<'a>(config: &'a SecurityConfig, head: &str) -> Option<&'a AllowedInterpreter> {
    // The head may be a bare name or a path; match on the final component.
    let name = Path::new(head)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| head.to_string());

    config.allowed_interpreters.iter().find(|interpreter| {
        interpreter.executables.iter().any(|e| *e == name)
            || (interpreter.name == BINARY_INTERPRETER && interpreter.executables.is_empty())
    })
}

/// A bare binary is allowed when it resolves inside some allowed path entry.
fn check_binary(config: &SecurityConfig, head: &str) -> std::result::Result<(), String> {
    let head_path = Path::new(head);
    for allowed in &config.allowed_paths {
        let candidate = if head_path.is_absolute() {
            head_path.to_path_buf()
        } else {
            allowed.path.join(head_path)
        };
        if let Ok(abs) = absolutize(&candidate) {
            if path_allowed(&abs, allowed) {
                return Ok(());
            }
        }
    }
    Err(format!("binary executable '{}' not in allowed paths", head))
}

fn extension_allowed(path: &Path, interpreter: &AllowedInterpreter) -> bool {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    interpreter
        .file_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
}

/// Containment check for one allowed-path entry: the file must sit under the
/// root, no `..` escape; non-recursive roots require the file's directory to
/// be the root itself; recursive roots bound the component depth.
fn path_allowed(file: &Path, allowed: &AllowedPath) -> bool {
    let Ok(root) = absolutize(&allowed.path) else {
        return false;
    };
    let Ok(file) = absolutize(file) else {
        return false;
    };
    let Ok(rel) = file.strip_prefix(&root) else {
        return false;
    };

    if !allowed.recursive {
        return file.parent() == Some(root.as_path());
    }
    if allowed.max_depth >= 0 {
        // Directory levels between the root and the file.
        let depth = rel.components().count().saturating_sub(1);
        if depth > allowed.max_depth as usize {
            return false;
        }
    }
    true
}

/// Absolute, lexically normalized form of `path`: anchored at the current
/// directory when relative, with `.` and `..` components resolved without
/// touching the filesystem.
fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(path: &str, recursive: bool, max_depth: i32) -> AllowedPath {
        AllowedPath {
            path: PathBuf::from(path),
            description: String::new(),
            recursive,
            max_depth,
        }
    }

    #[test]
    fn path_containment_rejects_escape() {
        let entry = allowed("/opt/scripts", true, -1);
        assert!(path_allowed(Path::new("/opt/scripts/a.py"), &entry));
        assert!(path_allowed(Path::new("/opt/scripts/sub/a.py"), &entry));
        assert!(!path_allowed(Path::new("/opt/other/a.py"), &entry));
        assert!(!path_allowed(Path::new("/opt/scripts/../secrets/a.py"), &entry));
    }

    #[test]
    fn non_recursive_requires_exact_directory() {
        let entry = allowed("/opt/scripts", false, -1);
        assert!(path_allowed(Path::new("/opt/scripts/a.py"), &entry));
        assert!(!path_allowed(Path::new("/opt/scripts/sub/a.py"), &entry));
    }

    #[test]
    fn recursive_depth_limit() {
        let entry = allowed("/opt/scripts", true, 1);
        assert!(path_allowed(Path::new("/opt/scripts/a.py"), &entry));
        assert!(path_allowed(Path::new("/opt/scripts/sub/a.py"), &entry));
        assert!(!path_allowed(Path::new("/opt/scripts/sub/deep/a.py"), &entry));
    }

    #[test]
    fn absolutize_normalizes_dots() {
        let p = absolutize(Path::new("/a/b/../c/./d")).unwrap();
        assert_eq!(p, PathBuf::from("/a/c/d"));
    }
}
