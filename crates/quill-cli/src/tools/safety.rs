//! Path-safety policy for file-mutating tools
//!
//! Resolution order: system deny-list (always denied, no prompt), `..`
//! traversal (always denied), inside the project directory (allowed
//! silently), anywhere else (operator confirmation, deny by default).

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use quill_agent::Operator;

/// System path prefixes that are never writable, confirmed or not.
const DENIED_PREFIXES: &[&str] = &[
    "/etc/",
    "/private/etc/",
    "/sys/",
    "/proc/",
    "/dev/",
    "/root/",
    "/boot/",
    "/bin/",
    "/sbin/",
    "/lib",
    "/usr/bin/",
    "/usr/sbin/",
    "/usr/lib",
    "/System/",
    "/Library/System",
];

/// Outcome of the pure policy check
#[derive(Debug, PartialEq)]
pub enum PathCheck {
    /// Inside the project directory
    Allowed(PathBuf),
    /// Hard deny with a reason; confirmation cannot override
    Denied(String),
    /// Outside the project; requires operator confirmation
    NeedsConfirmation(PathBuf),
}

/// Apply the policy against a given project root. Symlinks are resolved
/// before the deny-list and containment checks.
pub fn check_path(path: &str, project_root: &Path, operation: &str) -> PathCheck {
    // `..` segments in the requested path are denied outright, resolved or not
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return PathCheck::Denied(format!(
            "Security: {} denied. Path contains '..' traversal: {}",
            operation, path
        ));
    }

    let absolute = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        project_root.join(path)
    };

    // Resolve symlinks where possible; for paths that don't exist yet,
    // resolve the nearest existing ancestor so a symlinked parent can't
    // smuggle a write elsewhere.
    let resolved = resolve_best_effort(&absolute);

    let resolved_str = resolved.to_string_lossy();
    for prefix in DENIED_PREFIXES {
        if resolved_str.starts_with(prefix) {
            return PathCheck::Denied(format!(
                "Security: {} denied. Cannot modify system path: {}",
                operation, path
            ));
        }
    }

    let root = resolve_best_effort(project_root);
    if resolved.starts_with(&root) {
        PathCheck::Allowed(resolved)
    } else {
        PathCheck::NeedsConfirmation(resolved)
    }
}

/// Canonicalize as much of the path as exists, re-joining the trailing
/// non-existent components.
fn resolve_best_effort(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    let mut missing = Vec::new();
    let mut current = path.to_path_buf();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name.to_owned());
        }
        if let Ok(resolved) = parent.canonicalize() {
            let mut result = resolved;
            for part in missing.iter().rev() {
                result.push(part);
            }
            return result;
        }
        current = parent.to_path_buf();
    }
    path.to_path_buf()
}

/// Full policy including the interactive confirmation step.
///
/// Returns the resolved path to operate on, or a denial string for the model.
pub async fn validate_path(
    path: &str,
    operation: &str,
    operator: &Arc<dyn Operator>,
) -> Result<PathBuf, String> {
    let cwd = std::env::current_dir().map_err(|e| format!("Security: {}", e))?;

    match check_path(path, &cwd, operation) {
        PathCheck::Allowed(resolved) => Ok(resolved),
        PathCheck::Denied(reason) => Err(reason),
        PathCheck::NeedsConfirmation(resolved) => {
            if operator
                .confirm_outside_path(&resolved.to_string_lossy(), operation)
                .await
            {
                tracing::info!(path = %resolved.display(), "User approved {} outside project", operation);
                Ok(resolved)
            } else {
                tracing::warn!(path = %resolved.display(), "User denied {} outside project", operation);
                Err(format!(
                    "Security: {} denied by user. Path '{}' is outside the project directory.",
                    operation, path
                ))
            }
        }
    }
}
