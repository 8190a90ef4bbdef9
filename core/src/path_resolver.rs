//! Symlink-hardened path canonicalisation and the allow-root containment
//! test. Resolves `~`/relative paths, follows symlinks where the target
//! exists, and falls back to a lexical normalization when it doesn't.

use std::path::{Component, Path, PathBuf};

use crate::error::rule_ids;
use crate::policy::Policy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathViolation {
    pub rule_id: &'static str,
    pub reason: String,
}

/// Expands `~`, resolves relative paths against `base`, normalises
/// separators, and realpaths the result. Never fails: if the target is
/// missing, realpath the parent and re-append the basename; if the parent
/// is also missing, fall back to the normalised (non-realpathed) form.
pub fn resolve(path: &str, base: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    let candidate = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    let candidate = normalize_separators(&candidate);

    match candidate.canonicalize() {
        Ok(real) => real,
        Err(_) => {
            let parent = candidate.parent().map(Path::to_path_buf);
            let basename = candidate.file_name().map(|n| n.to_owned());
            match (parent, basename) {
                (Some(parent), Some(basename)) => match parent.canonicalize() {
                    Ok(real_parent) => real_parent.join(basename),
                    Err(_) => normalize_components(&candidate),
                },
                _ => normalize_components(&candidate),
            }
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn normalize_separators(path: &Path) -> PathBuf {
    // Normalise backslashes to forward slashes even off Windows so that
    // prefix comparisons behave consistently regardless of the host.
    let as_str = path.to_string_lossy().replace('\\', "/");
    PathBuf::from(as_str)
}

/// Removes `.` and resolves `..` lexically, without touching the
/// filesystem. Used as the last-resort fallback when neither the target
/// nor its parent exist.
fn normalize_components(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `under(root, target)`: a component-wise prefix match, true when
/// `target == root` or `target` begins with `root` followed by a path
/// separator.
pub fn under(root: &Path, target: &Path) -> bool {
    target == root || target.starts_with(root)
}

/// Runs the three-stage firewall test in the documented order: allowed
/// roots, then system-critical prefixes, then home-sensitive folders.
pub fn check_path_access(target: &Path, policy: &Policy) -> Result<(), PathViolation> {
    let in_allowed_root = policy
        .allowed_roots
        .iter()
        .any(|root| under(root, target));
    if !in_allowed_root {
        return Err(PathViolation {
            rule_id: rule_ids::PATH_OUTSIDE_ALLOWED_ROOTS,
            reason: format!("{} is not under any configured allowed root", target.display()),
        });
    }

    for blocked in &policy.restricted_paths.system_critical {
        if under(blocked, target) {
            return Err(PathViolation {
                rule_id: rule_ids::PATH_BLOCKED,
                reason: format!(
                    "{} falls under the restricted system path {}",
                    target.display(),
                    blocked.display()
                ),
            });
        }
    }

    if let Some(home) = dirs::home_dir() {
        for folder in &policy.user_space.deny_on_any_access {
            let sensitive = home.join(folder);
            if under(&sensitive, target) {
                return Err(PathViolation {
                    rule_id: rule_ids::PATH_HOME_SENSITIVE,
                    reason: format!(
                        "{} falls under the home-sensitive folder {}",
                        target.display(),
                        sensitive.display()
                    ),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::policy::Policy;

    #[test]
    fn resolves_relative_against_base() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path();
        std::fs::write(base.join("file.txt"), b"hi").expect("write");
        let resolved = resolve("file.txt", base);
        assert_eq!(resolved, base.canonicalize().expect("canon").join("file.txt"));
    }

    #[test]
    fn missing_target_falls_back_to_parent_realpath() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path();
        let resolved = resolve("does-not-exist.txt", base);
        assert_eq!(
            resolved,
            base.canonicalize().expect("canon").join("does-not-exist.txt")
        );
    }

    #[test]
    fn missing_parent_falls_back_to_normalized_form() {
        let resolved = resolve("nope/also-nope/x.txt", Path::new("/definitely/not/here"));
        assert_eq!(resolved, PathBuf::from("/definitely/not/here/nope/also-nope/x.txt"));
    }

    #[test]
    fn under_requires_component_boundary() {
        assert!(under(Path::new("/work"), Path::new("/work/sub/file.txt")));
        assert!(under(Path::new("/work"), Path::new("/work")));
        assert!(!under(Path::new("/work"), Path::new("/workbench/file.txt")));
    }

    #[test]
    fn outside_allowed_roots_denies() {
        let mut policy = Policy::default();
        policy.allowed_roots = vec![PathBuf::from("/work")];
        let err = check_path_access(Path::new("/etc/passwd"), &policy).unwrap_err();
        assert_eq!(err.rule_id, rule_ids::PATH_OUTSIDE_ALLOWED_ROOTS);
    }

    #[test]
    fn allowed_root_but_system_critical_blocks() {
        let mut policy = Policy::default();
        policy.allowed_roots = vec![PathBuf::from("/")];
        let err = check_path_access(Path::new("/etc/passwd"), &policy).unwrap_err();
        assert_eq!(err.rule_id, rule_ids::PATH_BLOCKED);
    }

    #[test]
    fn no_allowed_roots_configured_denies_everything() {
        let policy = Policy::default();
        assert!(policy.allowed_roots.is_empty());
        let err = check_path_access(Path::new("/work/file.txt"), &policy).unwrap_err();
        assert_eq!(err.rule_id, rule_ids::PATH_OUTSIDE_ALLOWED_ROOTS);
    }
}
