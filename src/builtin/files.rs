//! File tools: read, write (atomic) and list, all inside the sandbox roots.
//!
//! The engine guards the path arguments before the handler starts; each
//! handler resolves its path again right before touching the filesystem.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::guard::{AccessMode, PathKind};
use crate::tools::{
    CallContext, HandlerError, RegistryError, Schema, SideEffectClass, ToolDescriptor,
    ToolRegistry, ValidatedArguments,
};

/// Listing stops after this many entries and reports `truncated`.
const MAX_LISTING_ENTRIES: usize = 10_000;

pub(crate) fn mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "py" => "text/x-python",
        "js" => "text/javascript",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        _ => return None,
    };
    Some(mime)
}

pub(crate) fn modified_rfc3339(meta: &Metadata) -> Option<String> {
    meta.modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

// =============================================================================
// read_file
// =============================================================================

#[derive(Debug, Deserialize)]
struct ReadArgs {
    file_path: String,
}

async fn read_file(args: ValidatedArguments, ctx: CallContext) -> Result<Value, HandlerError> {
    let ReadArgs { file_path } = args.parse()?;

    let guarded = ctx.read_file(&file_path)?;
    let meta = tokio::fs::metadata(guarded.as_path()).await?;
    if !meta.is_file() {
        return Err(HandlerError::invalid_input(format!("path is not a file: {file_path}")));
    }
    let content = tokio::fs::read_to_string(guarded.as_path()).await?;

    Ok(json!({
        "file_path": file_path,
        "content": content,
        "size": meta.len(),
        "mime_type": mime_type(guarded.as_path()),
        "last_modified": modified_rfc3339(&meta),
        "lines": content.lines().count(),
        "characters": content.chars().count(),
    }))
}

// =============================================================================
// write_file
// =============================================================================

#[derive(Debug, Deserialize)]
struct WriteArgs {
    file_path: String,
    content: String,
    #[serde(default)]
    create_backup: bool,
}

/// Write `content` to a hidden sibling of `target`, then rename it over the
/// target. Until the rename, the original file is untouched. The sibling is
/// removed if the write fails or the future is dropped before the rename.
pub(crate) async fn write_atomic(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(parent)?;
    // TempPath deletes the sibling on drop, including on cancellation.
    let (std_file, temp_path) = temp.into_parts();

    let mut file = tokio::fs::File::from_std(std_file);
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    temp_path.persist(target).map_err(|e| e.error)?;
    Ok(())
}

async fn write_file(args: ValidatedArguments, ctx: CallContext) -> Result<Value, HandlerError> {
    let WriteArgs {
        file_path,
        content,
        create_backup,
    } = args.parse()?;

    let guarded = ctx.write_file(&file_path)?;
    let target = guarded.as_path();
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut backup_path = None;
    if create_backup && tokio::fs::try_exists(target).await? {
        let mut backup = target.as_os_str().to_owned();
        backup.push(".backup");
        tokio::fs::copy(target, PathBuf::from(backup)).await?;
        backup_path = Some(format!("{file_path}.backup"));
    }

    write_atomic(target, content.as_bytes()).await?;
    let meta = tokio::fs::metadata(target).await?;
    tracing::debug!(size = meta.len(), "file written");

    Ok(json!({
        "file_path": file_path,
        "size": meta.len(),
        "lines": content.lines().count(),
        "characters": content.chars().count(),
        "backup_created": backup_path.is_some(),
        "backup_path": backup_path,
        "success": true,
    }))
}

// =============================================================================
// list_directory
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListArgs {
    directory_path: Option<String>,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    include_hidden: bool,
    #[serde(default)]
    file_filter: String,
}

async fn list_directory(args: ValidatedArguments, ctx: CallContext) -> Result<Value, HandlerError> {
    let ListArgs {
        directory_path,
        recursive,
        include_hidden,
        file_filter,
    } = args.parse()?;

    // Without a path, list the first root and report paths relative to it.
    let (raw, shown) = match directory_path {
        Some(path) => (path.clone(), path),
        None => {
            let root = ctx
                .guard()
                .roots()
                .first()
                .ok_or_else(|| HandlerError::failed("no sandbox roots configured"))?;
            (root.to_string_lossy().into_owned(), String::new())
        }
    };

    let guarded = ctx.read_dir(&raw)?;
    let meta = tokio::fs::metadata(guarded.as_path()).await?;
    if !meta.is_dir() {
        return Err(HandlerError::invalid_input(format!("path is not a directory: {shown}")));
    }

    let base = PathBuf::from(&shown);
    let mut files = Vec::new();
    let mut directories = Vec::new();
    let mut truncated = false;
    let mut pending = vec![(guarded.into_path_buf(), PathBuf::new(), 0usize)];

    'walk: while let Some((dir, relative, level)) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // Unreadable subdirectories are skipped.
            Err(e) if level > 0 => {
                tracing::debug!("skipping unreadable directory: {}", e.kind());
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !include_hidden && name.starts_with('.') {
                continue;
            }
            // DirEntry metadata does not follow symlinks.
            let meta = entry.metadata().await?;
            let file_type = meta.file_type();
            let child = relative.join(&name);

            let kind = if file_type.is_dir() {
                "directory"
            } else if file_type.is_symlink() {
                "symlink"
            } else {
                "file"
            };
            if kind != "directory" && !file_filter.is_empty() && !name.contains(&file_filter) {
                continue;
            }

            let mime = if kind == "file" { mime_type(Path::new(&name)) } else { None };
            let info = json!({
                "name": name,
                "path": base.join(&child).to_string_lossy(),
                "type": kind,
                "size": meta.len(),
                "last_modified": modified_rfc3339(&meta),
                "level": level,
                "mime_type": mime,
            });

            if file_type.is_dir() {
                directories.push(info);
                if recursive {
                    pending.push((entry.path(), child, level + 1));
                }
            } else {
                files.push(info);
            }

            if files.len() + directories.len() >= MAX_LISTING_ENTRIES {
                truncated = true;
                break 'walk;
            }
        }
    }

    let by_path = |a: &Value, b: &Value| a["path"].as_str().cmp(&b["path"].as_str());
    files.sort_by(by_path);
    directories.sort_by(by_path);

    Ok(json!({
        "directory_path": shown,
        "total_files": files.len(),
        "total_directories": directories.len(),
        "files": files,
        "directories": directories,
        "recursive": recursive,
        "include_hidden": include_hidden,
        "truncated": truncated,
    }))
}

// =============================================================================
// Registration
// =============================================================================

pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        ToolDescriptor::new(
            "read_file",
            "Read content from a text file",
            Schema::object().required("file_path", Schema::string().describe("Path to the file to read")),
        )
        .side_effect(SideEffectClass::FilesystemRead)
        .path_field("file_path", AccessMode::Read, PathKind::File),
        read_file,
    )?;

    registry.register(
        ToolDescriptor::new(
            "write_file",
            "Write content to a text file",
            Schema::object()
                .required("file_path", Schema::string().describe("Path to the file to write"))
                .required("content", Schema::string().describe("Content to write to the file"))
                .optional(
                    "create_backup",
                    Schema::boolean()
                        .describe("Create backup of existing file")
                        .default_value(json!(false)),
                ),
        )
        .side_effect(SideEffectClass::FilesystemWrite)
        .path_field("file_path", AccessMode::Write, PathKind::File),
        write_file,
    )?;

    registry.register(
        ToolDescriptor::new(
            "list_directory",
            "List contents of a directory",
            Schema::object()
                .optional(
                    "directory_path",
                    Schema::string().describe("Path to the directory to list (default: first sandbox root)"),
                )
                .optional(
                    "recursive",
                    Schema::boolean()
                        .describe("List subdirectories recursively")
                        .default_value(json!(false)),
                )
                .optional(
                    "include_hidden",
                    Schema::boolean()
                        .describe("Include hidden files and directories")
                        .default_value(json!(false)),
                )
                .optional(
                    "file_filter",
                    Schema::string()
                        .describe("Filter files by name substring")
                        .default_value(json!("")),
                ),
        )
        .side_effect(SideEffectClass::FilesystemRead)
        .path_field("directory_path", AccessMode::Read, PathKind::Directory),
        list_directory,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::PathGuard;
    use crate::types::CallId;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(root: &Path) -> CallContext {
        let guard = PathGuard::new([root], [".txt", ".md", ".json", ".csv"]);
        CallContext::new(CallId::new(), "test", Arc::new(guard))
    }

    fn args(value: Value) -> ValidatedArguments {
        crate::tools::validate(&Schema::object(), &value).unwrap()
    }

    #[tokio::test]
    async fn test_read_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "one\ntwo\nthree").unwrap();

        let raw = path.to_string_lossy().into_owned();
        let out = read_file(args(json!({"file_path": raw})), ctx(dir.path())).await.unwrap();
        assert_eq!(out["content"], "one\ntwo\nthree");
        assert_eq!(out["lines"], 3);
        assert_eq!(out["size"], 13);
        assert_eq!(out["mime_type"], "text/plain");
        assert!(out["last_modified"].is_string());
    }

    #[tokio::test]
    async fn test_read_missing_file_hides_path() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("absent.txt").to_string_lossy().into_owned();
        let err = read_file(args(json!({"file_path": raw})), ctx(dir.path())).await.unwrap_err();
        assert_eq!(err.to_string(), "file not found");
    }

    #[tokio::test]
    async fn test_write_file_atomic_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("out.md");
        let raw = path.to_string_lossy().into_owned();

        let first = write_file(args(json!({"file_path": raw, "content": "v1"})), ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(first["backup_created"], false);

        let second = write_file(
            args(json!({"file_path": raw, "content": "v2", "create_backup": true})),
            ctx(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(second["backup_created"], true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v2");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sub").join("out.md.backup")).unwrap(),
            "v1"
        );

        // No temporary files are left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("sub"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    fn temp_leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_write_keeps_original_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("big.txt");
        std::fs::write(&target, "original").unwrap();

        let content = vec![b'x'; 64 * 1024 * 1024];
        let outcome =
            tokio::time::timeout(Duration::from_millis(5), write_atomic(&target, &content)).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        if outcome.is_err() {
            assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
        }
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_sibling() {
        let dir = tempfile::tempdir().unwrap();
        // Renaming a file over a non-empty directory fails.
        let target = dir.path().join("occupied");
        std::fs::create_dir_all(target.join("child")).unwrap();

        assert!(write_atomic(&target, b"data").await.is_err());
        assert!(target.join("child").is_dir());
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_write_outside_root_rejected_by_handler() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_file(
            args(json!({"file_path": "/tmp/../etc/evil.txt", "content": "x"})),
            ctx(dir.path()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HandlerError::Security(_)));
    }

    #[tokio::test]
    async fn test_list_directory_recursive_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "h").unwrap();
        std::fs::write(dir.path().join("nested").join("b.csv"), "b").unwrap();

        let flat = list_directory(args(json!({})), ctx(dir.path())).await.unwrap();
        assert_eq!(flat["total_files"], 1);
        assert_eq!(flat["total_directories"], 1);
        assert_eq!(flat["files"][0]["path"], "a.txt");

        let deep = list_directory(
            args(json!({"recursive": true, "include_hidden": true, "file_filter": ".csv"})),
            ctx(dir.path()),
        )
        .await
        .unwrap();
        let paths: Vec<&str> = deep["files"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|f| f["path"].as_str())
            .collect();
        assert_eq!(paths, vec!["nested/b.csv"]);
        assert_eq!(deep["files"][0]["level"], 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_directory_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let out = list_directory(args(json!({"recursive": true})), ctx(dir.path())).await.unwrap();
        assert_eq!(out["total_directories"], 0);
        assert_eq!(out["files"][0]["type"], "symlink");
        assert_eq!(out["total_files"], 1);
    }
}
