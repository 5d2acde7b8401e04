//! Filesystem path containment.
//!
//! Every path a tool touches must canonicalize to a location under one of the
//! configured roots and, for files, carry an allowed extension. A
//! [`GuardedPath`] is only valid for the I/O call that immediately follows
//! its resolution: handlers resolve again right before reading or writing.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::types::{Error, Result, SandboxConfig};

/// Whether the caller intends to read or write the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
}

/// What the path is expected to name. Directories skip the extension check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    File,
    Directory,
}

/// Sandbox policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("path '{path}' is outside the allowed directories")]
    PathTraversal { path: String },

    #[error("file extension '{extension}' is not allowed")]
    DisallowedExtension { extension: String },

    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },
}

impl SecurityError {
    /// Subtype name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::PathTraversal { .. } => "PathTraversal",
            SecurityError::DisallowedExtension { .. } => "DisallowedExtension",
            SecurityError::InvalidPath { .. } => "InvalidPath",
        }
    }

    /// Rewrite the caller-visible text of the error.
    pub fn map_text(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            SecurityError::PathTraversal { path } => SecurityError::PathTraversal { path: f(&path) },
            SecurityError::DisallowedExtension { extension } => SecurityError::DisallowedExtension {
                extension: f(&extension),
            },
            SecurityError::InvalidPath { reason } => SecurityError::InvalidPath { reason: f(&reason) },
        }
    }

    fn traversal(raw: &str) -> Self {
        SecurityError::PathTraversal {
            path: raw.to_string(),
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        SecurityError::InvalidPath {
            reason: reason.into(),
        }
    }
}

impl From<SecurityError> for Error {
    fn from(err: SecurityError) -> Self {
        Error::security(err.to_string())
    }
}

/// A canonical path proven to satisfy the sandbox policy.
///
/// Deliberately neither `Clone` nor serializable.
#[derive(Debug)]
pub struct GuardedPath {
    path: PathBuf,
    root: PathBuf,
    access: AccessMode,
}

impl GuardedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the root that contains it (safe to echo to callers).
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(Path::new(""))
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

/// Resolves raw caller paths against the allow-listed roots.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl PathGuard {
    /// Build a guard. Roots are canonicalized now; missing roots are skipped
    /// with a warning, so a guard without roots rejects every path.
    pub fn new<R, E>(roots: R, extensions: E) -> Self
    where
        R: IntoIterator,
        R::Item: AsRef<Path>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let roots = roots
            .into_iter()
            .filter_map(|root| {
                let root = root.as_ref();
                match std::fs::canonicalize(root) {
                    Ok(canon) => Some(canon),
                    Err(e) => {
                        tracing::warn!("Sandbox root {} skipped: {}", root.display(), e);
                        None
                    }
                }
            })
            .collect();

        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| ext.len() > 1)
            .collect();

        Self { roots, extensions }
    }

    /// Build from sandbox configuration, creating roots when asked to.
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        if config.create_roots {
            for root in &config.allowed_roots {
                std::fs::create_dir_all(root).map_err(|e| {
                    Error::internal(format!("cannot create sandbox root {}: {}", root.display(), e))
                })?;
            }
        }
        let guard = Self::new(&config.allowed_roots, &config.allowed_extensions);
        if guard.roots.is_empty() {
            tracing::warn!("No usable sandbox roots; file tools will reject every path");
        }
        Ok(guard)
    }

    /// Canonical roots, in configuration order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve `raw` and prove it satisfies the policy for `access`/`kind`.
    pub fn resolve(
        &self,
        raw: &str,
        access: AccessMode,
        kind: PathKind,
    ) -> std::result::Result<GuardedPath, SecurityError> {
        if raw.trim().is_empty() {
            return Err(SecurityError::invalid("path is empty"));
        }
        if raw.contains('\0') {
            return Err(SecurityError::invalid("path contains a NUL byte"));
        }

        let requested = Path::new(raw);
        let absolute = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|_| SecurityError::invalid("working directory unavailable"))?
                .join(requested)
        };

        let canonical = canonicalize_lenient(&absolute).ok_or_else(|| SecurityError::traversal(raw))?;

        let root = self
            .roots
            .iter()
            .find(|root| canonical.starts_with(root))
            .ok_or_else(|| SecurityError::traversal(raw))?;

        if access == AccessMode::Write && &canonical == root {
            return Err(SecurityError::invalid("cannot write to a sandbox root"));
        }

        if kind == PathKind::File && !self.extensions.is_empty() {
            let extension = canonical
                .extension()
                .map(|e| normalize_extension(&e.to_string_lossy()))
                .unwrap_or_default();
            if !self.extensions.contains(&extension) {
                return Err(SecurityError::DisallowedExtension { extension });
            }
        }

        Ok(GuardedPath {
            path: canonical,
            root: root.clone(),
            access,
        })
    }

    /// Replace root prefixes in `message` so errors do not reveal the
    /// server's filesystem layout.
    pub fn redact(&self, message: &str) -> String {
        self.roots.iter().fold(message.to_string(), |msg, root| {
            msg.replace(&*root.to_string_lossy(), "<root>")
        })
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Canonicalize the longest existing ancestor (resolving symlinks), then
/// append the not-yet-existing tail. Returns `None` when the tail tries to
/// climb with `..`, since that cannot be resolved against real directories.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    for ancestor in path.ancestors() {
        let Ok(mut canonical) = std::fs::canonicalize(ancestor) else {
            continue;
        };
        let tail = path.strip_prefix(ancestor).ok()?;
        for component in tail.components() {
            match component {
                Component::Normal(part) => canonical.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        return Some(canonical);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, PathGuard) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let guard = PathGuard::new([dir.path().join("data")], [".txt", "CSV"]);
        (dir, guard)
    }

    fn path_str(p: &Path) -> String {
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn test_file_inside_root_resolves() {
        let (dir, guard) = sandbox();
        let raw = path_str(&dir.path().join("data/notes.txt"));
        let guarded = guard.resolve(&raw, AccessMode::Read, PathKind::File).unwrap();
        assert_eq!(guarded.relative(), Path::new("notes.txt"));
        assert_eq!(guarded.access(), AccessMode::Read);
    }

    #[test]
    fn test_dot_dot_escape_rejected() {
        let (dir, guard) = sandbox();
        let raw = path_str(&dir.path().join("data/../secret.txt"));
        let err = guard.resolve(&raw, AccessMode::Read, PathKind::File).unwrap_err();
        assert_eq!(err.kind(), "PathTraversal");
    }

    #[test]
    fn test_relative_escape_rejected() {
        let (_dir, guard) = sandbox();
        let err = guard
            .resolve("../../etc/passwd", AccessMode::Read, PathKind::File)
            .unwrap_err();
        assert!(matches!(err, SecurityError::PathTraversal { .. }));
    }

    #[test]
    fn test_absolute_outside_rejected() {
        let (_dir, guard) = sandbox();
        let err = guard.resolve("/etc/passwd", AccessMode::Read, PathKind::File).unwrap_err();
        assert_eq!(err.kind(), "PathTraversal");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, guard) = sandbox();
        let link = dir.path().join("data/link.txt");
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), &link).unwrap();

        let err = guard
            .resolve(&path_str(&link), AccessMode::Read, PathKind::File)
            .unwrap_err();
        assert_eq!(err.kind(), "PathTraversal");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_escape_rejected_for_new_files() {
        let (dir, guard) = sandbox();
        let outside = dir.path().join("outside");
        std::fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, dir.path().join("data/escape")).unwrap();

        let raw = path_str(&dir.path().join("data/escape/new.txt"));
        let err = guard.resolve(&raw, AccessMode::Write, PathKind::File).unwrap_err();
        assert_eq!(err.kind(), "PathTraversal");
    }

    #[test]
    fn test_extension_allow_list_case_insensitive() {
        let (dir, guard) = sandbox();
        let ok = path_str(&dir.path().join("data/report.CSV"));
        assert!(guard.resolve(&ok, AccessMode::Write, PathKind::File).is_ok());

        let bad = path_str(&dir.path().join("data/run.sh"));
        let err = guard.resolve(&bad, AccessMode::Write, PathKind::File).unwrap_err();
        assert_eq!(
            err,
            SecurityError::DisallowedExtension {
                extension: ".sh".into()
            }
        );
    }

    #[test]
    fn test_directories_skip_extension_check() {
        let (dir, guard) = sandbox();
        let raw = path_str(&dir.path().join("data"));
        assert!(guard.resolve(&raw, AccessMode::Read, PathKind::Directory).is_ok());
    }

    #[test]
    fn test_write_into_new_subdirectory_allowed() {
        let (dir, guard) = sandbox();
        let raw = path_str(&dir.path().join("data/reports/2024/out.txt"));
        let guarded = guard.resolve(&raw, AccessMode::Write, PathKind::File).unwrap();
        assert_eq!(guarded.relative(), Path::new("reports/2024/out.txt"));
    }

    #[test]
    fn test_dot_dot_in_missing_tail_rejected() {
        let (dir, guard) = sandbox();
        let raw = path_str(&dir.path().join("data/missing/../../secret.txt"));
        let err = guard.resolve(&raw, AccessMode::Write, PathKind::File).unwrap_err();
        assert_eq!(err.kind(), "PathTraversal");
    }

    #[test]
    fn test_write_to_root_rejected() {
        let (dir, guard) = sandbox();
        let raw = path_str(&dir.path().join("data"));
        let err = guard.resolve(&raw, AccessMode::Write, PathKind::Directory).unwrap_err();
        assert_eq!(err.kind(), "InvalidPath");
    }

    #[test]
    fn test_empty_and_nul_paths_rejected() {
        let (_dir, guard) = sandbox();
        assert_eq!(
            guard.resolve("  ", AccessMode::Read, PathKind::File).unwrap_err().kind(),
            "InvalidPath"
        );
        assert_eq!(
            guard.resolve("a\0b.txt", AccessMode::Read, PathKind::File).unwrap_err().kind(),
            "InvalidPath"
        );
    }

    #[test]
    fn test_missing_roots_reject_everything() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::new([dir.path().join("nope")], Vec::<String>::new());
        assert!(guard.roots().is_empty());
        let raw = path_str(&dir.path().join("nope/file.txt"));
        assert!(guard.resolve(&raw, AccessMode::Read, PathKind::File).is_err());
    }

    #[test]
    fn test_redact_hides_roots() {
        let (_dir, guard) = sandbox();
        let root = path_str(&guard.roots()[0]);
        let redacted = guard.redact(&format!("failed to open {root}/notes.txt"));
        assert_eq!(redacted, "failed to open <root>/notes.txt");
    }

    #[test]
    fn test_from_config_creates_roots() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            allowed_roots: vec![dir.path().join("fresh")],
            allowed_extensions: vec![],
            create_roots: true,
            ..SandboxConfig::default()
        };
        let guard = PathGuard::from_config(&config).unwrap();
        assert_eq!(guard.roots().len(), 1);
    }
}
