//! Environment introspection for the `terminal` command.
//!
//! Builds a plain-text summary of the working directory that is handed to the
//! model as system context.

use anyhow::{Context as _, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

/// Project manifests worth showing to the model, with the ecosystem they imply.
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "Rust"),
    ("go.mod", "Go"),
    ("package.json", "Node.js"),
    ("pyproject.toml", "Python"),
];

/// Manifests longer than this are cut off.
const MAX_MANIFEST_CHARS: usize = 4000;

/// Summarize `dir`: shell and OS, a directory listing, git status, and any
/// recognised project manifest.
pub fn gather_filesystem_info(dir: &Path) -> Result<String> {
    let mut info = String::new();

    writeln!(info, "Current directory: {}", dir.display())?;
    writeln!(info, "Shell: {}", get_shell())?;
    writeln!(info, "OS: {}\n", get_os_info())?;

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    info.push_str("Files and directories:\n");
    for entry in &entries {
        let metadata = entry.metadata()?;
        let kind = if metadata.is_dir() { "Directory" } else { "File" };
        writeln!(
            info,
            "- {} ({}, {} bytes)",
            entry.file_name().to_string_lossy(),
            kind,
            metadata.len()
        )?;
    }

    if dir.join(".git").exists() {
        info.push_str("\nThis is a git repository.\n");
        if let Some(status) = git_status(dir) {
            info.push_str("Git status summary:\n");
            info.push_str(&status);
        }
    }

    let go_files: Vec<String> = entries
        .iter()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".go"))
        .collect();
    if !go_files.is_empty() && !dir.join("go.mod").is_file() {
        info.push_str("\nThis is a Go project.\n");
    }
    if !go_files.is_empty() {
        writeln!(info, "Go files found: {}", go_files.join(", "))?;
    }

    for (marker, ecosystem) in PROJECT_MARKERS {
        let path = dir.join(marker);
        if !path.is_file() {
            continue;
        }
        writeln!(info, "\nThis is a {} project.", ecosystem)?;
        if let Ok(contents) = std::fs::read_to_string(&path) {
            writeln!(info, "\n{} content:", marker)?;
            info.extend(contents.chars().take(MAX_MANIFEST_CHARS));
            if !info.ends_with('\n') {
                info.push('\n');
            }
        }
    }

    Ok(info)
}

fn git_status(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["status", "--short", "--branch"])
        .current_dir(dir)
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Get the user's shell from $SHELL environment variable.
fn get_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

/// Get OS information from uname.
fn get_os_info() -> String {
    #[cfg(unix)]
    {
        if let Ok(output) = Command::new("uname").arg("-sr").output() {
            if output.status.success() {
                return String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
        }
    }

    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_files_and_directories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("a_dir")).unwrap();

        let info = gather_filesystem_info(dir.path()).unwrap();

        assert!(info.starts_with(&format!("Current directory: {}", dir.path().display())));
        assert!(info.contains("- b.txt (File, 5 bytes)"));
        let dir_pos = info.find("- a_dir (Directory").unwrap();
        let file_pos = info.find("- b.txt").unwrap();
        assert!(dir_pos < file_pos);
        assert!(!info.contains("git repository"));
    }

    #[test]
    fn test_detects_project_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\n",
        )
        .unwrap();

        let info = gather_filesystem_info(dir.path()).unwrap();

        assert!(info.contains("This is a Rust project."));
        assert!(info.contains("Cargo.toml content:"));
        assert!(info.contains("name = \"demo\""));
    }

    #[test]
    fn test_detects_go_sources_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();
        std::fs::write(dir.path().join("util.go"), "package main\n").unwrap();

        let info = gather_filesystem_info(dir.path()).unwrap();

        assert!(info.contains("This is a Go project."));
        assert!(info.contains("Go files found: main.go, util.go"));
        assert!(!info.contains("go.mod content:"));
    }

    #[test]
    fn test_go_module_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module demo\n").unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n").unwrap();

        let info = gather_filesystem_info(dir.path()).unwrap();

        assert_eq!(info.matches("This is a Go project.").count(), 1);
        assert!(info.contains("Go files found: main.go"));
        assert!(info.contains("module demo"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(gather_filesystem_info(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_get_os_info() {
        assert!(!get_os_info().is_empty());
    }
}
