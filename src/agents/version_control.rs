use crate::error::{GomodError, Result};
use crate::ports::{RepoStatus, StatusReader};
use crate::utils::path_validator::PathValidator;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// VersionControlAgent reads working-tree status through git with hardened
/// input validation.
pub struct VersionControlAgent {
    project_path: PathBuf,
}

impl VersionControlAgent {
    pub fn new<P: AsRef<Path>>(project_path: P) -> Result<Self> {
        let project_path = Self::validate_git_path(project_path.as_ref())?;
        Ok(Self { project_path })
    }

    /// Modified, untracked and deleted paths relative to the repository root.
    pub fn repo_status(&self) -> Result<RepoStatus> {
        let output = self.run_git(&["status", "--porcelain", "-z", "--untracked-files=all"])?;
        Self::ensure_success(&output, "git status")?;
        let status = parse_porcelain_z(&String::from_utf8_lossy(&output.stdout));
        debug!(
            modified = status.modified.len(),
            not_added = status.not_added.len(),
            deleted = status.deleted.len(),
            "read working tree status"
        );
        Ok(status)
    }

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(&self.project_path)
            .args(args)
            .output()
            .map_err(|e| {
                GomodError::GitOperation(format!(
                    "Failed to execute git command '{}': {e}",
                    args.join(" ")
                ))
            })
    }

    fn ensure_success(output: &Output, command: &str) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }

        Err(GomodError::GitOperation(format!(
            "{} failed: {}",
            command,
            String::from_utf8_lossy(&output.stderr)
        )))
    }

    fn validate_git_path(path: &Path) -> Result<PathBuf> {
        let dangerous = [';', '|', '&', '$', '`', '\n', '\r'];
        let path_str = path.to_string_lossy();
        if let Some(ch) = dangerous.iter().find(|c| path_str.contains(**c)) {
            return Err(GomodError::GitOperation(format!(
                "Path contains dangerous character: '{}'",
                ch
            )));
        }

        if !path.is_absolute() {
            return Err(GomodError::GitOperation(
                "Only absolute paths are allowed for Git operations".to_string(),
            ));
        }

        PathValidator::validate_project_path(path)
            .map_err(|err| GomodError::GitOperation(format!("Invalid Git path: {}", err)))
    }
}

impl StatusReader for VersionControlAgent {
    fn status(&self) -> Result<RepoStatus> {
        self.repo_status()
    }
}

/// Parse `git status --porcelain -z` output.
///
/// Renames and copies are followed by an extra NUL-terminated entry with the
/// source path.
pub fn parse_porcelain_z(raw: &str) -> RepoStatus {
    let mut status = RepoStatus::default();
    let mut entries = raw.split('\0').filter(|entry| !entry.is_empty());

    while let Some(entry) = entries.next() {
        if entry.len() < 4 {
            continue;
        }
        let (code, path) = entry.split_at(3);
        let mut flags = code.chars();
        let index = flags.next().unwrap_or(' ');
        let worktree = flags.next().unwrap_or(' ');
        let path = path.to_string();

        match (index, worktree) {
            ('?', '?') => status.not_added.push(path),
            ('!', '!') => {}
            ('R', _) => {
                status.not_added.push(path);
                if let Some(source) = entries.next() {
                    status.deleted.push(source.to_string());
                }
            }
            ('C', _) => {
                status.not_added.push(path);
                entries.next();
            }
            ('D', _) | (_, 'D') => status.deleted.push(path),
            ('A', _) => status.not_added.push(path),
            _ => status.modified.push(path),
        }
    }

    status
}
