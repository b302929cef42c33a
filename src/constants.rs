// src/constants.rs

/// Extension used by parameter files, both the canonical ones and the uparm snapshots.
pub const PAR_EXTENSION: &str = "par";

/// Name of the synthetic argument-count parameter present in every list.
pub const NARGS_PARAM: &str = "$nargs";

/// Name of the parameter that carries a task's own mode.
pub const MODE_PARAM: &str = "mode";

/// Printed form of an undefined numeric value.
pub const INDEF: &str = "INDEF";

/// Environment variable naming the directory for saved (scrunched) parameter files.
pub const UPARM_VAR: &str = "uparm";

/// The name of the session configuration file (in ~/.config/clpar/).
pub const SESSION_CONFIG_FILENAME: &str = "clpar.toml";

/// The name of the configuration directory under the system config dir.
pub const CONFIG_DIR_NAME: &str = "clpar";

/// Maximum number of indirection hops followed while resolving one parameter.
pub const MAX_INDIRECTION_DEPTH: usize = 32;

/// Fields readable through `param.p_xxx`, in min-match order.
pub const GET_FIELDS: &[&str] = &[
    "p_name",
    "p_xtype",
    "p_mode",
    "p_prompt",
    "p_value",
    "p_filename",
    "p_maximum",
    "p_minimum",
];

/// Fields writable through `param.p_xxx`.
pub const SET_FIELDS: &[&str] = &["p_prompt", "p_value", "p_filename", "p_maximum", "p_minimum"];
