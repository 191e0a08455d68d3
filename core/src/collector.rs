// File collector
// Walks a cloned repository and picks out the files worth scanning.

use std::path::{Path, PathBuf};

/// Directories that never contain first-party source worth scanning.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "vendor",
    ".vscode",
    "target",
    "__pycache__",
];

/// File extensions the detectors know how to analyze.
pub const SCANNABLE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "cpp", "c", "h", "php", "rb", "go", "rs", "cs",
    "swift", "kt", "scala",
];

/// A file selected for scanning.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Path within the repository, e.g. "src/app.js".
    pub relative_path: String,
    /// Display name, e.g. "app.js".
    pub file_name: String,
    /// Lowercased extension without the dot.
    pub extension: String,
    pub size: u64,
}

/// Collects up to `max_files` scannable files under `root`, in traversal
/// order. Files larger than `max_file_size` bytes and everything inside
/// [`EXCLUDED_DIRS`] are skipped; once the cap is hit the rest of the tree
/// is ignored.
///
/// Unreadable directories are logged and skipped rather than failing the
/// walk, so an unreadable repository simply yields no candidates.
pub async fn collect_files(root: &Path, max_files: usize, max_file_size: u64) -> Vec<CandidateFile> {
    let mut files = Vec::new();
    walk(root, root, max_files, max_file_size, &mut files).await;
    files
}

async fn walk(
    root: &Path,
    dir: &Path,
    max_files: usize,
    max_file_size: u64,
    files: &mut Vec<CandidateFile>,
) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("failed to read directory {}: {}", dir.display(), e);
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to list {}: {}", dir.display(), e);
                break;
            }
        };

        if files.len() >= max_files {
            tracing::debug!("file cap of {} reached, ignoring remaining entries", max_files);
            return;
        }

        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!("failed to inspect {}: {}", path.display(), e);
                continue;
            }
        };

        if file_type.is_dir() {
            let name = entry.file_name();
            if !EXCLUDED_DIRS.contains(&name.to_string_lossy().as_ref()) {
                Box::pin(walk(root, &path, max_files, max_file_size, files)).await;
            }
            continue;
        }

        if !file_type.is_file() {
            continue;
        }

        let extension = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => continue,
        };
        if !SCANNABLE_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }

        let size = match entry.metadata().await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::warn!("failed to stat {}: {}", path.display(), e);
                continue;
            }
        };
        if size > max_file_size {
            tracing::debug!(
                "skipping {} ({} bytes exceeds the {} byte limit)",
                path.display(),
                size,
                max_file_size
            );
            continue;
        }

        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        let file_name = entry.file_name().to_string_lossy().to_string();

        files.push(CandidateFile {
            path,
            relative_path,
            file_name,
            extension,
            size,
        });
    }
}
