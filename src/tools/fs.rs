//! Filesystem helpers behind the file-management tools.
//!
//! Every helper returns a [`FileOperationResult`] instead of an error: the
//! envelope is what gets rendered back to the model, and `success` is true
//! exactly when the underlying OS call succeeded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl FileOperationResult {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
            data: None,
        }
    }

    fn ok_with(message: String, data: String) -> Self {
        Self {
            success: true,
            message,
            data: Some(data),
        }
    }

    fn fail(message: String) -> Self {
        warn!("{message}");
        Self {
            success: false,
            message,
            data: None,
        }
    }

    /// Text sent back as tool content. `label` names the data section, if any.
    pub fn render(&self, label: Option<&str>) -> String {
        if !self.success {
            return self.message.clone();
        }
        match (label, &self.data) {
            (Some(label), Some(data)) => format!("Message: {} \n{label}: {data}", self.message),
            _ => format!("Message: {}", self.message),
        }
    }
}

async fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        // The following write reports the real failure.
        let _ = fs::create_dir_all(parent).await;
    }
}

pub async fn write_file(path: &Path, content: &str) -> FileOperationResult {
    debug!(path = %path.display(), bytes = content.len(), "write_file");
    ensure_parent(path).await;

    match fs::write(path, content).await {
        Ok(()) => FileOperationResult::ok(format!(
            "File successfully written to {}",
            path.display()
        )),
        Err(e) => FileOperationResult::fail(format!("Failed to write file: {e}")),
    }
}

pub async fn read_file(path: &Path) -> FileOperationResult {
    debug!(path = %path.display(), "read_file");

    // invalid UTF-8 sequences are replaced, not rejected
    match fs::read(path).await {
        Ok(bytes) => FileOperationResult::ok_with(
            format!("File successfully read from {}", path.display()),
            String::from_utf8_lossy(&bytes).into_owned(),
        ),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            FileOperationResult::fail(format!("File not found: {}", path.display()))
        }
        Err(e) => FileOperationResult::fail(format!("Failed to read file: {e}")),
    }
}

pub async fn move_file(old_path: &Path, new_path: &Path) -> FileOperationResult {
    debug!(from = %old_path.display(), to = %new_path.display(), "move_file");

    if fs::metadata(old_path).await.is_err() {
        return FileOperationResult::fail(format!(
            "Source file does not exist: {}",
            old_path.display()
        ));
    }
    ensure_parent(new_path).await;

    let moved = match fs::rename(old_path, new_path).await {
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!("rename crosses devices, falling back to copy + delete");
            copy_then_remove(old_path, new_path).await
        }
        other => other,
    };

    match moved {
        Ok(()) => FileOperationResult::ok(format!(
            "File successfully moved from {} to {}",
            old_path.display(),
            new_path.display()
        )),
        Err(e) => FileOperationResult::fail(format!("Failed to move file: {e}")),
    }
}

async fn copy_then_remove(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to).await?;
    fs::remove_file(from).await
}

pub async fn list_directory(dir: &Path) -> FileOperationResult {
    debug!(dir = %dir.display(), "list_directory");

    match fs::metadata(dir).await {
        Ok(meta) if !meta.is_dir() => {
            return FileOperationResult::fail(format!(
                "Path is not a directory: {}",
                dir.display()
            ));
        }
        Ok(_) => {}
        Err(_) => {
            return FileOperationResult::fail(format!(
                "Directory does not exist: {}",
                dir.display()
            ));
        }
    }

    match collect_entries(dir).await {
        Ok(mut entries) => {
            entries.sort_by(|a, b| a.1.cmp(&b.1));
            let listing = entries
                .into_iter()
                .map(|(is_dir, name)| {
                    let tag = if is_dir { "[DIR]" } else { "[FILE]" };
                    format!("{tag} {name}")
                })
                .collect::<Vec<_>>()
                .join("\n");
            FileOperationResult::ok_with(
                format!("Directory listed successfully: {}", dir.display()),
                listing,
            )
        }
        Err(e) => FileOperationResult::fail(format!("Failed to list directory: {e}")),
    }
}

async fn collect_entries(dir: &Path) -> std::io::Result<Vec<(bool, String)>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        entries.push((is_dir, entry.file_name().to_string_lossy().into_owned()));
    }
    Ok(entries)
}

pub async fn file_info(path: &Path) -> FileOperationResult {
    debug!(path = %path.display(), "file_info");

    let meta = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => return FileOperationResult::fail(format!("Failed to get file info: {e}")),
    };

    let info = [
        ("size", meta.len().to_string()),
        ("created", format_time(meta.created())),
        ("modified", format_time(meta.modified())),
        ("accessed", format_time(meta.accessed())),
        ("isDirectory", meta.is_dir().to_string()),
        ("isFile", meta.is_file().to_string()),
        ("permissions", permissions(&meta)),
    ];
    let formatted = info
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n");

    FileOperationResult::ok_with(
        format!("File info retrieved for {}", path.display()),
        formatted,
    )
}

fn format_time(time: std::io::Result<SystemTime>) -> String {
    time.map(|t| DateTime::<Utc>::from(t).to_rfc3339())
        .unwrap_or_else(|_| "unavailable".into())
}

#[cfg(unix)]
fn permissions(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:03o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permissions(_meta: &std::fs::Metadata) -> String {
    "n/a".into()
}
