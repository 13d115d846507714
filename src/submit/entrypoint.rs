//! Deterministic entry-point search over a staged job directory.

use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};

/// Canonical script names, tried in priority order before any other script.
pub const CANONICAL_SCRIPTS: [&str; 5] = ["run.sh", "main.sh", "job.sh", "start.sh", "submit.sh"];

/// The script the scheduler is instructed to execute, and the directory it
/// must run from.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    pub dir: PathBuf,
    pub script: String,
}

fn search_dir(dir: &Path) -> Result<Option<EntryPoint>> {
    let mut names: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }

    for canonical in CANONICAL_SCRIPTS {
        if names.iter().any(|n| n == canonical) {
            return Ok(Some(EntryPoint {
                dir: dir.to_path_buf(),
                script: canonical.to_string(),
            }));
        }
    }

    let mut scripts: Vec<&String> = names.iter().filter(|n| n.ends_with(".sh")).collect();
    scripts.sort();
    match scripts.len() {
        0 => Ok(None),
        1 => Ok(Some(EntryPoint {
            dir: dir.to_path_buf(),
            script: scripts[0].clone(),
        })),
        _ => Err(GatewayError::Validation(format!(
            "ambiguous entry point: multiple candidate scripts found ({}); \
             include one of {} to disambiguate",
            scripts
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            CANONICAL_SCRIPTS.join(", ")
        ))),
    }
}

fn single_subdirectory(dir: &Path) -> Result<Option<PathBuf>> {
    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    Ok(if subdirs.len() == 1 {
        subdirs.pop()
    } else {
        None
    })
}

/// Locate the entry-point script in a staged job directory.
///
/// Canonical names win; otherwise a lone `.sh` file is accepted. If nothing
/// is found and the directory holds exactly one subdirectory (an archive
/// that wrapped its contents in a folder), the search repeats one level
/// down. Anything else fails with a descriptive error; the pipeline never
/// guesses among multiple candidates.
pub fn find_entry_point(root: &Path) -> Result<EntryPoint> {
    if let Some(entry) = search_dir(root)? {
        return Ok(entry);
    }

    if let Some(nested) = single_subdirectory(root)? {
        if let Some(entry) = search_dir(&nested)? {
            return Ok(entry);
        }
    }

    Err(GatewayError::Validation(format!(
        "no shell script found in the staged job directory; include {} or any single .sh file",
        CANONICAL_SCRIPTS.join(", ")
    )))
}
