use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

/// Collect the XML documents to embed into.
///
/// A file path is returned as is. A directory is walked recursively and
/// every `*.xml` file below it is returned, sorted by path. Files whose
/// stem already ends with `skip_suffix` are earlier outputs and are left
/// out.
pub fn scan_documents(path: &Path, skip_suffix: &str) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut results = Vec::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let file = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if file.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }

        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if !skip_suffix.is_empty() && stem.ends_with(skip_suffix) {
            debug!("Skipping earlier output {}", file.display());
            continue;
        }

        results.push(file.to_path_buf());
    }

    results.sort();
    results
}

/// Input file stem, used as the default output prefix.
pub fn file_prefix(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}
