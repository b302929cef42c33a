// src/core/mod.rs

pub mod config_loader;
pub mod minmatch;
pub mod package;
pub mod par_list;
pub mod parameter;
pub mod paths;
pub mod qualified_name;
pub mod resolver;
pub mod session;
pub mod task;
pub mod tokenizer;
pub mod value;
