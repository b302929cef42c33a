// src/cli/handlers/lpar.rs

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use super::commons;
use crate::CancellationToken;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Pretty-print a parameter file")]
struct LparArgs {
    /// The .par file to list.
    file: PathBuf,

    /// Also show choice lists and ranges.
    #[arg(short, long)]
    verbose: bool,

    /// Reject legacy par-file syntax.
    #[arg(long)]
    strict: bool,
}

/// Entry point for `clpar lpar`.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let lpar_args = LparArgs::try_parse_from(&args)?;
    let list = commons::read_par_file(&lpar_args.file, lpar_args.strict)?;
    println!("{}", list.lpar(lpar_args.verbose));
    Ok(())
}
