use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use crate::{config::RunConfig, error::Result};

/// Returns `path` if it is free, otherwise the first free `path2`, `path3`, ...
///
/// For files the counter goes before the extension, `best.json` becomes `best2.json`.
///
/// # Arguments
/// * `path` - The wanted path.
/// * `exist_ok` - Hand back `path` even when it already exists.
pub fn increment_path(path: &Path, exist_ok: bool) -> PathBuf {
    if exist_ok || !path.exists() {
        return path.to_path_buf();
    }

    let (stem, suffix) = match (path.is_file(), path.extension()) {
        (true, Some(ext)) => (
            path.with_extension("").into_os_string(),
            format!(".{}", ext.to_string_lossy()),
        ),
        _ => (path.as_os_str().to_os_string(), String::new()),
    };

    (2..)
        .map(|n| {
            let mut candidate = stem.clone();
            candidate.push(format!("{n}{suffix}"));
            PathBuf::from(candidate)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Creates the directory a run writes its artifacts into.
///
/// An explicit `save_dir` is used as is, otherwise the configured project and name are
/// incremented into a fresh directory. A `labels/` subdirectory is made when `save_txt` is set.
pub fn prepare_save_dir(cfg: &RunConfig, save_dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match save_dir {
        Some(dir) => dir,
        None => increment_path(&cfg.run_dir(), cfg.exist_ok),
    };

    if cfg.save_txt {
        fs::create_dir_all(dir.join("labels"))?;
    } else {
        fs::create_dir_all(&dir)?;
    }

    info!("results will be saved to {}", dir.display());
    Ok(dir)
}
