// src/cli/handlers/check.rs

use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::{CancellationToken, constants::PAR_EXTENSION, core::par_list::ParList};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Check parameter files for errors")]
struct CheckArgs {
    /// Files or directories to scan.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Reject legacy par-file syntax.
    #[arg(long)]
    strict: bool,
}

/// Collects the `.par` files under `root` (or `root` itself when it is a file).
fn par_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == PAR_EXTENSION))
        .collect();
    files.sort();
    files
}

/// Entry point for `clpar check`.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let check_args = CheckArgs::try_parse_from(&args)?;
    let mut total = 0;
    let mut failed = 0;

    for root in &check_args.paths {
        for file in par_files(root) {
            total += 1;
            let name = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match ParList::read(&name, &file, check_args.strict) {
                Ok(list) => {
                    log::debug!("{}: {} parameters", file.display(), list.len());
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {}", "✗".red().bold(), e);
                }
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} of {} parameter files failed to parse", failed, total));
    }
    println!("{} {} parameter files OK", "✓".green().bold(), total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_par_files_walks_directories() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pkg");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a.par"), "x,i,h,1,,,\"\"\n").unwrap();
        std::fs::write(nested.join("b.par"), "y,s,h,\"\",,,\"\"\n").unwrap();
        std::fs::write(nested.join("notes.txt"), "").unwrap();

        // --- Execute ---
        let files = par_files(dir.path());

        // --- Assert ---
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "par"));
    }

    #[test]
    fn test_check_reports_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.par"), "x,q,h,1,,,\"\"\n").unwrap();
        let args = vec![dir.path().display().to_string()];
        let err = handle(args, &CancellationToken::default()).unwrap_err();
        assert!(err.to_string().contains("1 of 1"));
    }
}
