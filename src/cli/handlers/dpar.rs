// src/cli/handlers/dpar.rs

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use super::commons;
use crate::{
    CancellationToken,
    constants::NARGS_PARAM,
    core::{par_list::ParList, value::NativeValue},
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Dump a parameter file")]
struct DparArgs {
    /// The .par file to dump.
    file: PathBuf,

    /// Task name used in the dump (defaults to the file stem).
    #[arg(long)]
    task: Option<String>,

    /// Emit JSON instead of `task.param = value` lines.
    #[arg(long)]
    json: bool,
}

/// One parameter as emitted by `dpar --json`.
#[derive(Serialize, Debug)]
struct ParamDump<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_code: &'a str,
    mode: &'a str,
    value: NativeValue,
    prompt: &'a str,
}

fn to_json(list: &ParList) -> Result<String> {
    let mut dump = Vec::new();
    for par in list.params().iter().filter(|p| p.name() != NARGS_PARAM) {
        dump.push(ParamDump {
            name: par.name(),
            type_code: par.type_code(),
            mode: par.mode(),
            value: par.get_native(None, None)?,
            prompt: par.prompt(),
        });
    }
    Ok(serde_json::to_string_pretty(&dump)?)
}

/// Entry point for `clpar dpar`.
pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let dpar_args = DparArgs::try_parse_from(&args)?;
    let list = commons::read_par_file(&dpar_args.file, false)?;
    if dpar_args.json {
        println!("{}", to_json(&list)?);
    } else {
        let task = commons::task_name_for(&dpar_args.file, dpar_args.task.as_deref());
        println!("{}", list.dpar(&task));
    }
    Ok(())
}
