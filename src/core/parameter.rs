// src/core/parameter.rs

//! The parameter type system.
//!
//! A [`Parameter`] is built from the raw fields of one par-file record. The type
//! code selects a [`ParKind`], which decides how values are coerced, which
//! bounds are legal and how the parameter is written back out.

use crate::constants::{GET_FIELDS, INDEF, SET_FIELDS};
use crate::core::minmatch::{MinMatch, min_match};
use crate::core::value::{
    NativeValue, Scalar, Value, integral_to_i64, parse_int, parse_real, split_choice,
    strip_quote,
};
use crate::system::prompt::Prompter;
use thiserror::Error;

const STRING_TYPES: &[&str] = &[
    "s", "f", "struct", "pset", "*imcur", "*struct", "*s", "*i", "*ukey",
];

/// Errors raised while defining, reading or assigning a single parameter.
#[derive(Error, Debug)]
pub enum ParamError {
    /// Malformed parameter definition or access.
    #[error("{0}")]
    Syntax(String),
    /// A value that does not coerce, or violates the range or choice list.
    #[error("{0}")]
    Value(String),
    /// No `p_` field by that name.
    #[error("Unrecognized or unimplemented parameter field {field} for parameter {name}")]
    UnknownField { field: String, name: String },
    /// The field abbreviation matches several fields.
    #[error("Ambiguous parameter field {field} for parameter {name}\nCould be any of {candidates:?}")]
    AmbiguousField {
        field: String,
        name: String,
        candidates: Vec<String>,
    },
    /// The prompter failed.
    #[error("Failed to prompt for parameter {name}: {source}")]
    Prompt {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// The prompter ran out of input.
    #[error("End of input while prompting for parameter {name}")]
    PromptEof { name: String },
}

impl ParamError {
    /// True for coercion and range/choice failures, the only errors a prompt loop retries on.
    pub fn is_value_error(&self) -> bool {
        matches!(self, ParamError::Value(_))
    }
}

/// Base type of a parameter, derived from its type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParKind {
    /// String-like types, including `f`, `struct` and `pset`.
    Str,
    /// Graphics cursor: a string whose reads come from an interactive cursor.
    GCur,
    /// `b`
    Bool,
    /// `i`
    Int,
    /// `r` and `d`
    Real,
    /// `ai`
    IntArray,
    /// `ar`
    RealArray,
}

impl ParKind {
    /// Maps a type code such as `r`, `ai` or `*gcur` to its kind.
    pub fn from_type_code(code: &str) -> Result<Self, ParamError> {
        match code {
            c if STRING_TYPES.contains(&c) => Ok(ParKind::Str),
            "*gcur" => Ok(ParKind::GCur),
            "r" | "d" => Ok(ParKind::Real),
            "i" => Ok(ParKind::Int),
            "b" => Ok(ParKind::Bool),
            "ar" => Ok(ParKind::RealArray),
            "ai" => Ok(ParKind::IntArray),
            c if c.starts_with('a') => Err(ParamError::Syntax(format!(
                "Cannot handle arrays of type {}",
                c
            ))),
            c => Err(ParamError::Syntax(format!(
                "Cannot handle parameter type {}",
                c
            ))),
        }
    }

    /// True for `ai` and `ar`.
    pub fn is_array(self) -> bool {
        matches!(self, ParKind::IntArray | ParKind::RealArray)
    }

    /// The kind of a single element (arrays map to their scalar kind).
    pub fn element(self) -> ParKind {
        match self {
            ParKind::IntArray => ParKind::Int,
            ParKind::RealArray => ParKind::Real,
            other => other,
        }
    }

    /// True for integer and real kinds, arrays included.
    pub fn is_numeric(self) -> bool {
        matches!(self.element(), ParKind::Int | ParKind::Real)
    }

    /// True for string and cursor kinds.
    pub fn is_string(self) -> bool {
        matches!(self, ParKind::Str | ParKind::GCur)
    }
}

fn comma_hint(original_len: usize, needed: usize) -> &'static str {
    if original_len < needed {
        " (possibly missing comma)"
    } else {
        ""
    }
}

static UNDEFINED: Value = Value::Undefined;

/// Raw field `i` of a record; missing trailing fields read as blank.
fn field(fields: &[String], i: usize) -> &str {
    fields.get(i).map_or("", String::as_str)
}

/// Quotes a field for a par-file record; backslashes are escaped before quotes.
fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One typed parameter: its values, bounds, mode and prompt.
///
/// Built from a par-file record by [`Parameter::from_fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub(crate) name: String,
    pub(crate) type_code: String,
    pub(crate) kind: ParKind,
    pub(crate) mode: String,
    pub(crate) values: Vec<Value>,
    pub(crate) dim: usize,
    pub(crate) min: Value,
    pub(crate) max: Value,
    pub(crate) choice: Option<Vec<Scalar>>,
    pub(crate) prompt: String,
    pub(crate) changed: bool,
    pub(crate) cmdline: bool,
}

impl Parameter {
    /// Builds a parameter from the raw fields `[name, type, mode, ...]` of one record.
    pub fn from_fields(fields: &[String], strict: bool) -> Result<Self, ParamError> {
        if fields.len() < 3 {
            return Err(ParamError::Syntax(
                "Fewer than 3 fields in parameter line".to_string(),
            ));
        }
        let kind = ParKind::from_type_code(field(fields, 1))?;
        let original_len = fields.len();
        let mut fields = fields.to_vec();
        if fields.len() < 7 {
            fields.resize(7, String::new());
        }

        let mut par = Parameter {
            name: field(&fields, 0).to_string(),
            type_code: field(&fields, 1).to_string(),
            kind,
            mode: field(&fields, 2).to_string(),
            values: vec![Value::Undefined],
            dim: 1,
            min: Value::Undefined,
            max: Value::Undefined,
            choice: None,
            prompt: String::new(),
            changed: false,
            cmdline: false,
        };

        match kind {
            ParKind::Str | ParKind::GCur => par.init_string(&fields, original_len, strict)?,
            ParKind::Bool => par.init_bool(&fields, original_len, strict)?,
            ParKind::Int | ParKind::Real => par.init_number(&fields, original_len, strict)?,
            ParKind::IntArray | ParKind::RealArray => {
                par.init_array(&mut fields, original_len, strict)?
            }
        }

        if let (Some(min), Some(max)) = (par.min.as_scalar(), par.max.as_scalar())
            && max < min
        {
            return Err(ParamError::Syntax(format!(
                "Max {} is less than min {} for parameter {}",
                max, min, par.name
            )));
        }
        par.check_value(&par.values)?;
        Ok(par)
    }

    /// The `$nargs` parameter every list carries.
    pub fn nargs() -> Self {
        Parameter {
            name: crate::constants::NARGS_PARAM.to_string(),
            type_code: "i".to_string(),
            kind: ParKind::Int,
            mode: "h".to_string(),
            values: vec![Value::Literal(Scalar::Int(0))],
            dim: 1,
            min: Value::Undefined,
            max: Value::Undefined,
            choice: None,
            prompt: String::new(),
            changed: false,
            cmdline: false,
        }
    }

    fn init_string(
        &mut self,
        fields: &[String],
        original_len: usize,
        strict: bool,
    ) -> Result<(), ParamError> {
        self.values = vec![self.coerce_one(&NativeValue::Str(field(fields, 3).to_string()), strict)?];
        if self.type_code == "s" || (!strict && self.type_code == "f") {
            if !field(fields, 4).is_empty() {
                self.choice = Some(self.parse_choice(field(fields, 4).trim(), strict)?);
            }
            if !field(fields, 5).is_empty() {
                return Err(ParamError::Syntax(format!(
                    "Illegal max value for string type parameter {}{}",
                    self.name,
                    comma_hint(original_len, 7)
                )));
            }
        } else if !field(fields, 4).is_empty() || !field(fields, 5).is_empty() {
            return Err(self.illegal_bounds(original_len));
        }
        self.prompt = field(fields, 6).to_string();
        Ok(())
    }

    fn init_bool(
        &mut self,
        fields: &[String],
        original_len: usize,
        strict: bool,
    ) -> Result<(), ParamError> {
        self.values = vec![self.coerce_one(&NativeValue::Str(field(fields, 3).to_string()), strict)?];
        if !field(fields, 4).is_empty() || !field(fields, 5).is_empty() {
            return Err(self.illegal_bounds(original_len));
        }
        self.prompt = field(fields, 6).to_string();
        Ok(())
    }

    fn init_number(
        &mut self,
        fields: &[String],
        original_len: usize,
        strict: bool,
    ) -> Result<(), ParamError> {
        self.values = vec![self.coerce_one(&NativeValue::Str(field(fields, 3).to_string()), strict)?];
        self.init_bounds(field(fields, 4), field(fields, 5), original_len, 7, strict)?;
        self.prompt = field(fields, 6).to_string();
        Ok(())
    }

    /// Array layout: rank, length, start index, min-or-choice, max, prompt, values.
    fn init_array(
        &mut self,
        fields: &mut Vec<String>,
        original_len: usize,
        strict: bool,
    ) -> Result<(), ParamError> {
        let rank: i64 = field(fields, 3).trim().parse().map_err(|_| {
            ParamError::Syntax(format!(
                "Illegal array rank '{}' for parameter {}",
                field(fields, 3), self.name
            ))
        })?;
        if rank != 1 {
            return Err(ParamError::Syntax(format!(
                "Cannot handle multi-dimensional arrays for parameter {}",
                self.name
            )));
        }
        let dim: usize = match field(fields, 4).trim().parse() {
            Ok(dim) if dim > 0 => dim,
            _ => {
                return Err(ParamError::Syntax(format!(
                    "Illegal array length '{}' for parameter {}",
                    field(fields, 4), self.name
                )));
            }
        };
        if fields.len() > 9 + dim {
            return Err(ParamError::Syntax(format!(
                "Too many values for array for parameter {}",
                self.name
            )));
        }
        fields.resize(9 + dim, String::new());
        self.dim = dim;

        self.values = fields
            .iter()
            .skip(9)
            .map(|raw| self.coerce_one(&NativeValue::Str(raw.clone()), strict))
            .collect::<Result<_, _>>()?;
        self.init_bounds(field(fields, 6), field(fields, 7), original_len, 9, strict)?;
        self.prompt = field(fields, 8).to_string();
        Ok(())
    }

    fn init_bounds(
        &mut self,
        min_field: &str,
        max_field: &str,
        original_len: usize,
        needed: usize,
        strict: bool,
    ) -> Result<(), ParamError> {
        let min_text = min_field.trim();
        if min_text.contains('|') {
            if self.kind.element() == ParKind::Real {
                return Err(ParamError::Syntax(format!(
                    "Choice list not allowed for float values for parameter {}",
                    self.name
                )));
            }
            self.choice = Some(self.parse_choice(min_text, strict)?);
            if !max_field.is_empty() {
                return Err(ParamError::Syntax(format!(
                    "Max value illegal when choice list given for parameter {}{}",
                    self.name,
                    comma_hint(original_len, needed)
                )));
            }
        } else {
            self.min = self.coerce_one(&NativeValue::Str(min_field.to_string()), strict)?;
            self.max = self.coerce_one(&NativeValue::Str(max_field.to_string()), strict)?;
        }
        Ok(())
    }

    fn illegal_bounds(&self, original_len: usize) -> ParamError {
        ParamError::Syntax(format!(
            "Illegal min/max/choice values for type {} for parameter {}{}",
            self.type_code,
            self.name,
            comma_hint(original_len, 7)
        ))
    }

    fn parse_choice(&self, text: &str, strict: bool) -> Result<Vec<Scalar>, ParamError> {
        if strict && (!text.starts_with('|') || !text.ends_with('|')) {
            return Err(ParamError::Syntax(
                "Choice string does not start and end with '|'".to_string(),
            ));
        }
        split_choice(text)
            .into_iter()
            .map(|member| self.choice_member(member, strict))
            .collect()
    }

    fn choice_member(&self, text: &str, strict: bool) -> Result<Scalar, ParamError> {
        if self.kind.is_string() {
            return Ok(Scalar::Str(text.to_string()));
        }
        match self.coerce_one(&NativeValue::Str(text.to_string()), strict)? {
            Value::Literal(scalar) => Ok(scalar),
            _ => Err(ParamError::Syntax(format!(
                "Illegal choice value '{}' for parameter {}",
                text, self.name
            ))),
        }
    }

    // --- Accessors ---

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type code as written in the par file.
    pub fn type_code(&self) -> &str {
        &self.type_code
    }

    /// Base kind.
    pub fn kind(&self) -> ParKind {
        self.kind
    }

    /// Mode string (`a`, `h`, `l`, `q` or a combination).
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Number of elements; 1 for scalars.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Value slots, one per element.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Lower bound.
    pub fn min(&self) -> &Value {
        &self.min
    }

    /// Upper bound.
    pub fn max(&self) -> &Value {
        &self.max
    }

    /// Allowed values, when the parameter has a choice list.
    pub fn choice(&self) -> Option<&[Scalar]> {
        self.choice.as_deref()
    }

    /// Query mode: reads prompt for a value.
    pub fn is_query(&self) -> bool {
        self.mode.contains('q')
    }

    /// Learn mode.
    pub fn is_learn(&self) -> bool {
        self.mode.contains('l')
    }

    /// Hidden parameters take no positional arguments.
    pub fn is_hidden(&self) -> bool {
        self.mode.contains('h')
    }

    /// Automatic mode, resolved through the task and its packages.
    pub fn is_auto(&self) -> bool {
        self.mode.starts_with('a')
    }

    /// Set since the last flag reset.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Overrides the changed flag.
    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Assigned from the call site of the current run.
    pub fn is_cmdline(&self) -> bool {
        self.cmdline
    }

    /// Overrides the command-line flag.
    pub fn set_cmdline(&mut self, cmdline: bool) {
        self.cmdline = cmdline;
    }

    /// Replaces every `a` in the mode with the resolved mode string.
    pub fn resolve_auto_mode(&mut self, mode: &str) {
        self.mode = self.mode.replace('a', mode);
    }

    // --- Coercion and validation ---

    fn indef(&self, text: &str, strict: bool) -> bool {
        text.is_empty()
            || if strict {
                text == INDEF
            } else {
                text.eq_ignore_ascii_case(INDEF)
            }
    }

    fn illegal(&self, what: &str, value: &NativeValue) -> ParamError {
        ParamError::Value(format!(
            "Illegal {} value '{}' for parameter {}",
            what, value, self.name
        ))
    }

    /// Coerces one caller-supplied value to this parameter's element type.
    pub fn coerce_one(&self, value: &NativeValue, strict: bool) -> Result<Value, ParamError> {
        match self.kind.element() {
            ParKind::Str | ParKind::GCur => match value {
                NativeValue::Null => Ok(Value::Literal(Scalar::Str(String::new()))),
                NativeValue::Str(s) => {
                    let s = strip_quote(s);
                    match s.strip_prefix(')') {
                        Some(target) => Ok(Value::Indirect(target.trim().to_string())),
                        None => Ok(Value::Literal(Scalar::Str(s.to_string()))),
                    }
                }
                NativeValue::List(_) => Err(self.illegal("string", value)),
                other => Ok(Value::Literal(Scalar::Str(other.to_string()))),
            },
            ParKind::Bool => match value {
                NativeValue::Null => Ok(Value::Undefined),
                NativeValue::Bool(b) => Ok(Value::Literal(Scalar::Bool(*b))),
                NativeValue::Int(i @ (0 | 1)) => Ok(Value::Literal(Scalar::Bool(*i == 1))),
                NativeValue::Real(r) if *r == 0.0 || *r == 1.0 => {
                    Ok(Value::Literal(Scalar::Bool(*r == 1.0)))
                }
                NativeValue::Str(s) => {
                    let text = s.trim();
                    if text.is_empty() {
                        return Ok(Value::Undefined);
                    }
                    if let Some(target) = text.strip_prefix(')') {
                        return Ok(Value::Indirect(target.trim().to_string()));
                    }
                    match text.to_ascii_lowercase().as_str() {
                        "no" | "n" | "false" | "0" => Ok(Value::Literal(Scalar::Bool(false))),
                        "yes" | "y" | "true" | "1" => Ok(Value::Literal(Scalar::Bool(true))),
                        _ => Err(self.illegal("boolean", value)),
                    }
                }
                _ => Err(self.illegal("boolean", value)),
            },
            ParKind::Int | ParKind::IntArray => match value {
                NativeValue::Null => Ok(Value::Undefined),
                NativeValue::Int(i) => Ok(Value::Literal(Scalar::Int(*i))),
                NativeValue::Bool(b) => Ok(Value::Literal(Scalar::Int(i64::from(*b)))),
                NativeValue::Real(r) => integral_to_i64(*r)
                    .map(|i| Value::Literal(Scalar::Int(i)))
                    .ok_or_else(|| self.illegal("integer", value)),
                NativeValue::Str(s) => {
                    let text = s.trim();
                    if self.indef(text, strict) {
                        return Ok(Value::Undefined);
                    }
                    if let Some(target) = text.strip_prefix(')') {
                        return Ok(Value::Indirect(target.trim().to_string()));
                    }
                    parse_int(text)
                        .map(|i| Value::Literal(Scalar::Int(i)))
                        .ok_or_else(|| self.illegal("integer", value))
                }
                _ => Err(self.illegal("integer", value)),
            },
            ParKind::Real | ParKind::RealArray => match value {
                NativeValue::Null => Ok(Value::Undefined),
                NativeValue::Real(r) => Ok(Value::Literal(Scalar::Real(*r))),
                NativeValue::Int(i) => Ok(Value::Literal(Scalar::Real(*i as f64))),
                NativeValue::Str(s) => {
                    let text = s.trim();
                    if self.indef(text, strict) {
                        return Ok(Value::Undefined);
                    }
                    if let Some(target) = text.strip_prefix(')') {
                        return Ok(Value::Indirect(target.trim().to_string()));
                    }
                    parse_real(text)
                        .map(|r| Value::Literal(Scalar::Real(r)))
                        .ok_or_else(|| self.illegal("real", value))
                }
                _ => Err(self.illegal("real", value)),
            },
        }
    }

    /// Coerces a whole value: one element for scalars, `dim` elements for arrays.
    ///
    /// Arrays accept a list or a blank-separated string of exactly `dim` items.
    pub fn coerce(&self, value: &NativeValue, strict: bool) -> Result<Vec<Value>, ParamError> {
        if !self.kind.is_array() {
            return Ok(vec![self.coerce_one(value, strict)?]);
        }
        let items: Vec<NativeValue> = match value {
            NativeValue::List(items) => items.clone(),
            NativeValue::Str(s) => s.split_whitespace().map(NativeValue::from).collect(),
            _ => Vec::new(),
        };
        if items.len() != self.dim {
            let element = if self.kind == ParKind::IntArray { "integer" } else { "real" };
            return Err(ParamError::Value(format!(
                "Value must be a {}-element {} array for {}",
                self.dim, element, self.name
            )));
        }
        items
            .iter()
            .map(|item| self.coerce_one(item, strict))
            .collect()
    }

    /// Checks one coerced element against the choice list or the min/max range.
    pub fn check_one(&self, value: &Value) -> Result<(), ParamError> {
        if value.bypasses_checks() {
            return Ok(());
        }
        let Some(scalar) = value.as_scalar() else {
            return Ok(());
        };
        if let Some(choice) = &self.choice {
            if !choice.contains(scalar) {
                return Err(ParamError::Value(format!(
                    "Value '{}' is not in choice list for {}",
                    scalar, self.name
                )));
            }
            return Ok(());
        }
        let below = self.min.as_scalar().is_some_and(|min| scalar < min);
        let above = self.max.as_scalar().is_some_and(|max| scalar > max);
        if below || above {
            return Err(ParamError::Value(format!(
                "Value '{}' is out of min-max range for {}",
                scalar, self.name
            )));
        }
        Ok(())
    }

    /// Range and choice validation of candidate values.
    pub fn check_value(&self, values: &[Value]) -> Result<(), ParamError> {
        values.iter().try_for_each(|v| self.check_one(v))
    }

    // --- Get ---

    /// The printed form of one element.
    pub fn display_one(&self, value: &Value) -> String {
        match value {
            Value::Undefined if self.kind.is_numeric() => INDEF.to_string(),
            Value::Undefined => String::new(),
            Value::Literal(scalar) => scalar.to_string(),
            Value::Indirect(target) => format!("){}", target),
        }
    }

    fn check_index(&self, index: usize) -> Result<(), ParamError> {
        if self.dim < 2 {
            return Err(ParamError::Syntax(format!(
                "Parameter {} is not an array",
                self.name
            )));
        }
        if index >= self.dim {
            return Err(ParamError::Syntax(format!(
                "Illegal index [{}] for array parameter {}",
                index, self.name
            )));
        }
        Ok(())
    }

    /// One array element, after the index has been checked against `dim`.
    fn element(&self, index: usize) -> Result<&Value, ParamError> {
        self.check_index(index)?;
        self.values.get(index).ok_or_else(|| {
            ParamError::Syntax(format!(
                "Illegal index [{}] for array parameter {}",
                index, self.name
            ))
        })
    }

    /// The first (for scalars, the only) value slot.
    fn first_value(&self) -> &Value {
        self.values.first().unwrap_or(&UNDEFINED)
    }

    fn resolve_field<'f>(
        &self,
        field: &str,
        candidates: &'f [&'static str],
    ) -> Result<&'f str, ParamError> {
        match min_match(field, candidates.iter().copied()) {
            MinMatch::Unique(found) => Ok(found),
            MinMatch::NoMatch => Err(ParamError::UnknownField {
                field: field.to_string(),
                name: self.name.clone(),
            }),
            MinMatch::Ambiguous(hits) => Err(ParamError::AmbiguousField {
                field: field.to_string(),
                name: self.name.clone(),
                candidates: hits.into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Returns the value (or one element, or one field) as a string.
    pub fn get(&self, field: Option<&str>, index: Option<usize>) -> Result<String, ParamError> {
        if let Some(index) = index {
            return Ok(self.display_one(self.element(index)?));
        }
        if let Some(field) = field {
            return self.get_field(field);
        }
        Ok(self.value_string())
    }

    /// The whole value: one element, or a blank-separated run for arrays.
    pub fn value_string(&self) -> String {
        self.values
            .iter()
            .map(|v| self.display_one(v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Like [`Parameter::get`] but returns a typed value.
    pub fn get_native(
        &self,
        field: Option<&str>,
        index: Option<usize>,
    ) -> Result<NativeValue, ParamError> {
        if let Some(index) = index {
            return Ok(self.element(index)?.to_native());
        }
        if let Some(field) = field {
            if self.resolve_field(field, GET_FIELDS)? == "p_value" {
                return self.get_native(None, None);
            }
            return self.get_field(field).map(NativeValue::Str);
        }
        if self.kind.is_array() {
            Ok(NativeValue::List(
                self.values.iter().map(Value::to_native).collect(),
            ))
        } else {
            Ok(self.first_value().to_native())
        }
    }

    /// Reads one `p_` field (abbreviations allowed) as text.
    pub fn get_field(&self, field: &str) -> Result<String, ParamError> {
        let field = self.resolve_field(field, GET_FIELDS)?;
        let text = match field {
            "p_name" => self.name.clone(),
            "p_xtype" => self.type_code.clone(),
            "p_mode" => self.mode.clone(),
            "p_prompt" => self.prompt.clone(),
            "p_value" | "p_filename" => self.value_string(),
            "p_maximum" => self.display_one(&self.max),
            "p_minimum" => match &self.choice {
                Some(choice) => self.choice_string(choice),
                None => self.display_one(&self.min),
            },
            other => {
                return Err(ParamError::UnknownField {
                    field: other.to_string(),
                    name: self.name.clone(),
                });
            }
        };
        Ok(text)
    }

    fn choice_string(&self, choice: &[Scalar]) -> String {
        let members: Vec<String> = choice.iter().map(|c| c.to_string()).collect();
        format!("|{}|", members.join("|"))
    }

    /// The indirection target stored in the addressed slot, if that slot holds one.
    pub fn indirection(
        &self,
        field: Option<&str>,
        index: Option<usize>,
    ) -> Result<Option<&str>, ParamError> {
        if let Some(index) = index {
            return Ok(self.element(index)?.indirection());
        }
        let slot = match field {
            None => self.first_value(),
            Some(field) => match self.resolve_field(field, GET_FIELDS)? {
                "p_value" | "p_filename" => self.first_value(),
                "p_minimum" if self.choice.is_none() => &self.min,
                "p_maximum" => &self.max,
                _ => return Ok(None),
            },
        };
        if self.kind.is_array() && field.is_none() {
            return Ok(None);
        }
        Ok(slot.indirection())
    }

    // --- Set ---

    /// Sets the value, one array element (zero-based) or one field.
    ///
    /// With `check` off the value is only coerced, never range- or choice-checked.
    pub fn set(
        &mut self,
        value: &NativeValue,
        field: Option<&str>,
        index: Option<usize>,
        check: bool,
    ) -> Result<(), ParamError> {
        if let Some(index) = index {
            self.check_index(index)?;
            let element = self.coerce_one(value, false)?;
            if check {
                self.check_one(&element)?;
            }
            if let Some(slot) = self.values.get_mut(index)
                && *slot != element
            {
                *slot = element;
                self.changed = true;
            }
            return Ok(());
        }
        if let Some(field) = field {
            return self.set_field(value, field, check);
        }
        let values = self.coerce(value, false)?;
        if check {
            self.check_value(&values)?;
        }
        if self.values != values {
            self.values = values;
            self.changed = true;
        }
        Ok(())
    }

    /// Assigns one settable `p_` field.
    pub fn set_field(
        &mut self,
        value: &NativeValue,
        field: &str,
        check: bool,
    ) -> Result<(), ParamError> {
        let field = self.resolve_field(field, SET_FIELDS)?;
        match field {
            "p_prompt" => {
                let prompt = strip_quote(&value.to_string()).to_string();
                if self.prompt != prompt {
                    self.prompt = prompt;
                    self.changed = true;
                }
            }
            "p_value" => self.set(value, None, None, check)?,
            "p_filename" => self.set(value, None, None, false)?,
            "p_maximum" => {
                let max = self.coerce_one(value, false)?;
                if self.max != max {
                    self.max = max;
                    self.changed = true;
                }
            }
            "p_minimum" => match value.as_str() {
                Some(text) if text.contains('|') => {
                    let choice = self.parse_choice(strip_quote(text).trim(), false)?;
                    if self.choice.as_ref() != Some(&choice) {
                        self.choice = Some(choice);
                        self.changed = true;
                    }
                }
                _ => {
                    let min = self.coerce_one(value, false)?;
                    if self.min != min {
                        self.min = min;
                        self.changed = true;
                    }
                }
            },
            other => {
                return Err(ParamError::UnknownField {
                    field: other.to_string(),
                    name: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Copies the mutable fields of `other` (value, bounds, choice, prompt) into `self`.
    pub fn merge_from(&mut self, other: &Parameter) {
        self.values = other.values.clone();
        self.min = other.min.clone();
        self.max = other.max.clone();
        self.choice = other.choice.clone();
        self.prompt = other.prompt.clone();
        self.changed = true;
    }

    // --- Prompting ---

    /// The text shown when soliciting a value: first prompt line plus choices or range.
    pub fn prompt_text(&self) -> String {
        let mut text = self.prompt.split('\n').next().unwrap_or("").to_string();
        if let Some(choice) = &self.choice {
            let members: Vec<String> = choice.iter().map(|c| c.to_string()).collect();
            text.push_str(&format!(" ({})", members.join("|")));
        } else if !self.min.is_undefined() || !self.max.is_undefined() {
            let show = |v: &Value| {
                if v.is_undefined() {
                    String::new()
                } else {
                    self.display_one(v)
                }
            };
            text.push_str(&format!(" ({}:{})", show(&self.min), show(&self.max)));
        }
        text.push_str(": ");
        text
    }

    /// Asks for a value until an acceptable one is entered.
    pub fn prompt_for_value(&mut self, prompter: &mut dyn Prompter) -> Result<(), ParamError> {
        let text = self.prompt_text();
        let io_error = |name: &str, e: std::io::Error| ParamError::Prompt {
            name: name.to_string(),
            source: e,
        };
        loop {
            prompter
                .write_line(&text)
                .map_err(|e| io_error(&self.name, e))?;
            let line = prompter
                .read_line()
                .map_err(|e| io_error(&self.name, e))?
                .ok_or_else(|| ParamError::PromptEof {
                    name: self.name.clone(),
                })?;
            match self.set(&NativeValue::Str(line.trim().to_string()), None, None, true) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_value_error() => {
                    prompter
                        .write_line(&e.to_string())
                        .map_err(|e| io_error(&self.name, e))?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // --- Output ---

    fn record_slot(&self, value: &Value) -> String {
        match value {
            Value::Undefined => String::new(),
            Value::Literal(Scalar::Str(s)) => quote(s),
            Value::Indirect(target) if self.kind.is_string() => quote(&format!("){}", target)),
            other => self.display_one(other),
        }
    }

    fn record_bounds(&self) -> (String, String) {
        match &self.choice {
            Some(choice) => (quote(&self.choice_string(choice)), String::new()),
            None => (self.record_slot(&self.min), self.record_slot(&self.max)),
        }
    }

    /// Serializes the parameter as one par-file record (without trailing newline).
    pub fn to_record(&self) -> String {
        let (min, max) = self.record_bounds();
        if !self.kind.is_array() {
            let value = match self.first_value() {
                Value::Undefined if self.kind.is_numeric() => INDEF.to_string(),
                other => self.record_slot(other),
            };
            return format!(
                "{},{},{},{},{},{},{}",
                self.name,
                self.type_code,
                self.mode,
                value,
                min,
                max,
                quote(&self.prompt)
            );
        }

        let values: Vec<String> = self.values.iter().map(|v| self.display_one(v)).collect();
        let separator = if self.prompt.contains('\n') { "," } else { ",\\\n" };
        format!(
            "{},{},{},1,{},1,{},{},{}{}{}",
            self.name,
            self.type_code,
            self.mode,
            self.dim,
            min,
            max,
            quote(&self.prompt),
            separator,
            values.join(",")
        )
    }

    /// The right-hand side of a `task.param = value` dump line.
    pub fn dump_value(&self) -> String {
        if self.kind.is_string() {
            quote(&self.value_string())
        } else {
            self.value_string()
        }
    }

    /// One `lpar` line; verbose output adds the choice list or the range.
    pub fn pretty(&self, verbose: bool) -> String {
        let prompt = self
            .prompt
            .split('\n')
            .collect::<Vec<_>>()
            .join(format!("\n{}", " ".repeat(32)).as_str());
        let value = self.value_string();
        let mut line = if self.is_hidden() {
            format!(
                "{:>13} = {:<15} {}",
                format!("({}", self.name),
                format!("{})", value),
                prompt
            )
        } else {
            format!("{:>13} = {:<15} {}", self.name, value, prompt)
        };
        if !verbose {
            return line;
        }

        let indent = " ".repeat(32);
        if let Some(choice) = &self.choice {
            line.push_str(&format!("\n{}|", indent));
            let mut width = 33;
            for member in choice {
                let entry = format!("{}|", member);
                width += entry.len() + 1;
                line.push_str(&entry);
                if width > 80 {
                    line.push_str(&format!("\n{}|", indent));
                    width = 33;
                }
            }
        } else if !self.min.is_undefined() || !self.max.is_undefined() {
            line.push_str(&format!("\n{}", indent));
            if !self.min.is_undefined() {
                line.push_str(&format!("{} <= ", self.display_one(&self.min)));
            }
            line.push_str(&self.name);
            if !self.max.is_undefined() {
                line.push_str(&format!(" <= {}", self.display_one(&self.max)));
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokenizer::split_record;
    use crate::system::prompt::ScriptedPrompter;

    fn parse(line: &str) -> Result<Parameter, ParamError> {
        Parameter::from_fields(&split_record(line).unwrap(), false)
    }

    #[test]
    fn test_real_parameter_scenario() {
        // --- Setup ---
        let mut par = parse(r#"foo,r,h,1.0,0.0,10.0,"A real param""#).unwrap();
        assert_eq!(par.name(), "foo");
        assert_eq!(par.kind(), ParKind::Real);
        assert!(par.is_hidden());
        assert_eq!(par.values()[0], Value::Literal(Scalar::Real(1.0)));
        assert_eq!(par.min(), &Value::Literal(Scalar::Real(0.0)));
        assert_eq!(par.max(), &Value::Literal(Scalar::Real(10.0)));

        // --- Execute & Assert ---
        let err = par.set(&"15".into(), None, None, true).unwrap_err();
        assert!(err.is_value_error());
        assert!(err.to_string().contains("out of min-max range for foo"));
        assert!(!par.is_changed());

        par.set(&"5".into(), None, None, true).unwrap();
        assert!(par.is_changed());
        assert_eq!(par.get(None, None).unwrap(), "5.0");
    }

    #[test]
    fn test_coercion_table() {
        assert_eq!(parse("n,i,h,10x").unwrap().values()[0], Value::Literal(Scalar::Int(16)));
        assert_eq!(parse("t,r,h,1:30:00").unwrap().values()[0], Value::Literal(Scalar::Real(1.5)));
        assert_eq!(parse("e,r,h,1.5D2").unwrap().values()[0], Value::Literal(Scalar::Real(150.0)));

        let flag = parse("b1,b,h,Yes").unwrap();
        assert_eq!(flag.values()[0], Value::Literal(Scalar::Bool(true)));
        assert_eq!(flag.get(None, None).unwrap(), "yes");

        let blank = parse("n,i,h,").unwrap();
        assert!(blank.values()[0].is_undefined());
        assert_eq!(blank.get(None, None).unwrap(), "INDEF");
    }

    #[test]
    fn test_min_greater_than_max_is_syntax_error() {
        let err = parse("n,i,h,3,5,1").unwrap_err();
        assert!(matches!(err, ParamError::Syntax(_)));
        assert!(err.to_string().contains("Max 1 is less than min 5"));
    }

    #[test]
    fn test_string_with_max_field_fails() {
        let err = parse("s1,s,h,abc,,zzz,prompt").unwrap_err();
        assert!(err.to_string().contains("Illegal max value for string type parameter s1"));
        let err = parse("s1,s,h,abc,,zzz").unwrap_err();
        assert!(err.to_string().contains("possibly missing comma"));
    }

    #[test]
    fn test_factory_rejects_short_records_and_unknown_types() {
        assert!(parse("a,i").unwrap_err().to_string().contains("Fewer than 3 fields"));
        assert!(parse("a,az,h").unwrap_err().to_string().contains("Cannot handle arrays of type az"));
        assert!(parse("a,q,h").unwrap_err().to_string().contains("Cannot handle parameter type q"));
    }

    #[test]
    fn test_string_choice_list() {
        let mut par = parse(r#"color,s,a,"red","|red|green|blue|",,"Color""#).unwrap();
        assert_eq!(par.get_field("p_min").unwrap(), "|red|green|blue|");
        assert!(par.set(&"purple".into(), None, None, true).is_err());
        par.set(&"blue".into(), None, None, true).unwrap();
        assert_eq!(par.get(None, None).unwrap(), "blue");
    }

    #[test]
    fn test_real_choice_list_is_rejected() {
        let err = parse("r1,r,h,1.0,|1.0|2.0|,,").unwrap_err();
        assert!(err.to_string().contains("Choice list not allowed for float values"));
    }

    #[test]
    fn test_integer_choice_with_max_is_rejected() {
        let err = parse("i1,i,h,1,|1|2|,5,").unwrap_err();
        assert!(err.to_string().contains("Max value illegal when choice list given"));
    }

    #[test]
    fn test_boolean_rejects_bounds_and_garbage() {
        assert!(parse("b1,b,h,yes,no,,").is_err());
        let err = parse("b1,b,h,maybe").unwrap_err();
        assert!(err.is_value_error());
    }

    #[test]
    fn test_indirection_values_bypass_checks() {
        let par = parse("x,i,h,)other.y,1,5").unwrap();
        assert_eq!(par.values()[0], Value::Indirect("other.y".into()));
        assert_eq!(par.get(None, None).unwrap(), ")other.y");
        assert_eq!(par.indirection(None, None).unwrap(), Some("other.y"));
        assert_eq!(par.indirection(Some("p_prompt"), None).unwrap(), None);
    }

    #[test]
    fn test_integer_array_layout() {
        // --- Setup ---
        let fields = split_record("arr,ai,h,1,3,1,|1|2|3|,,\"Array\",1,2,3").unwrap();

        // --- Execute ---
        let mut par = Parameter::from_fields(&fields, false).unwrap();

        // --- Assert ---
        assert_eq!(par.kind(), ParKind::IntArray);
        assert_eq!(par.dim(), 3);
        assert_eq!(par.get(None, Some(1)).unwrap(), "2");
        assert_eq!(par.get(None, None).unwrap(), "1 2 3");
        assert!(par.set(&"4".into(), None, Some(0), true).is_err());
        par.set(&"3 3 1".into(), None, None, true).unwrap();
        assert_eq!(
            par.get_native(None, None).unwrap(),
            NativeValue::from(vec![3i64, 3, 1])
        );
        assert!(par.get(None, Some(3)).unwrap_err().to_string().contains("Illegal index [3]"));
    }

    #[test]
    fn test_real_array_layout_and_errors() {
        let par = Parameter::from_fields(
            &split_record("w,ar,h,1,2,1,0.0,10.0,\"Weights\",1.5,2").unwrap(),
            false,
        )
        .unwrap();
        assert_eq!(par.values()[1], Value::Literal(Scalar::Real(2.0)));

        let err = parse("w,ar,h,2,2,1,,,,1,2").unwrap_err();
        assert!(err.to_string().contains("multi-dimensional"));
        let err = parse("w,ar,h,1,2,1,,,,1,2,3").unwrap_err();
        assert!(err.to_string().contains("Too many values"));
        let err = parse("w,ar,h,1,2,1,|1|2|,,,1,2").unwrap_err();
        assert!(err.to_string().contains("Choice list not allowed"));
    }

    #[test]
    fn test_scalar_index_is_rejected() {
        let par = parse("n,i,h,1").unwrap();
        assert!(par.get(None, Some(0)).unwrap_err().to_string().contains("not an array"));
    }

    #[test]
    fn test_field_access_and_abbreviation() {
        let mut par = parse(r#"n,i,ql,4,1,9,"Count""#).unwrap();
        assert_eq!(par.get_field("p_val").unwrap(), "4");
        assert_eq!(par.get_field("p_xtype").unwrap(), "i");
        assert_eq!(par.get_field("p_mode").unwrap(), "ql");
        assert_eq!(par.get_field("p_maximum").unwrap(), "9");
        assert!(matches!(par.get_field("p_m"), Err(ParamError::AmbiguousField { .. })));
        assert!(matches!(par.get_field("p_zzz"), Err(ParamError::UnknownField { .. })));

        par.set(&"|1|2|4|".into(), Some("p_minimum"), None, true).unwrap();
        assert_eq!(par.choice().map(|c| c.len()), Some(3));
        par.set(&"\"New prompt\"".into(), Some("p_prompt"), None, true).unwrap();
        assert_eq!(par.prompt(), "New prompt");
        assert!(par.is_changed());
    }

    #[test]
    fn test_setting_same_value_does_not_mark_changed() {
        let mut par = parse("n,i,h,4").unwrap();
        par.set(&4i64.into(), None, None, true).unwrap();
        assert!(!par.is_changed());
    }

    #[test]
    fn test_records_round_trip() {
        let lines = [
            r#"foo,r,h,1.0,0.0,10.0,"A real param""#,
            r#"s1,s,a,"hello, world","|hello, world|bye|",,"Greeting""#,
            r#"b1,b,q,yes,,,"Flag""#,
            r#"n,i,h,INDEF,,,"Count""#,
            r#"ind,s,h,")other.par",,,"Indirect""#,
            "arr,ai,h,1,3,1,1,9,\"Array\",\\\n1,INDEF,3",
        ];
        for line in lines {
            let first = parse(line).unwrap().to_record();
            let second = parse(&first).unwrap().to_record();
            assert_eq!(first, second, "record did not round-trip: {}", line);
        }
    }

    #[test]
    fn test_backslashes_survive_a_record_round_trip() {
        // --- Setup ---
        let mut par = parse(r#"dir,s,h,"",,,"Windows \"style\" path""#).unwrap();
        par.set(&r"C:\tmp\".into(), None, None, true).unwrap();

        // --- Execute ---
        let record = par.to_record();
        let reread = parse(&record).unwrap();

        // --- Assert ---
        assert_eq!(reread.values()[0], Value::Literal(Scalar::Str(r"C:\tmp\".to_string())));
        assert_eq!(reread.prompt(), "Windows \"style\" path");
    }

    #[test]
    fn test_integral_real_outside_i64_range_is_value_error() {
        let mut par = parse("n,i,h,1").unwrap();
        let err = par.set(&NativeValue::Real(1e30), None, None, true).unwrap_err();
        assert!(err.is_value_error());
        assert_eq!(par.values()[0], Value::Literal(Scalar::Int(1)));

        par.set(&NativeValue::Real(-42.0), None, None, true).unwrap();
        assert_eq!(par.values()[0], Value::Literal(Scalar::Int(-42)));
    }

    #[test]
    fn test_multiline_prompt_keeps_array_on_one_record() {
        let par = parse("arr,ai,h,1,2,1,,,\"two\nlines\",1,2").unwrap();
        let record = par.to_record();
        assert!(!record.contains("\\\n"));
        assert_eq!(parse(&record).unwrap(), par);
    }

    #[test]
    fn test_pretty_listing() {
        let par = parse(r#"foo,r,h,1.0,0.0,10.0,"A real param""#).unwrap();
        assert_eq!(par.pretty(false), "         (foo = 1.0)            A real param");
        assert!(par.pretty(true).ends_with("0.0 <= foo <= 10.0"));
    }

    #[test]
    fn test_prompt_loop_retries_on_invalid_value() {
        // --- Setup ---
        let mut par = parse(r#"n,i,q,1,1,10,"How many""#).unwrap();
        let mut prompter = ScriptedPrompter::new(["42", "abc", "7"]);

        // --- Execute ---
        par.prompt_for_value(&mut prompter).unwrap();

        // --- Assert ---
        assert_eq!(par.get(None, None).unwrap(), "7");
        let transcript = prompter.transcript();
        assert_eq!(transcript[0], "How many (1:10): ");
        assert!(transcript[1].contains("out of min-max range"));
        assert!(transcript[3].contains("Illegal integer value"));
        assert_eq!(transcript.len(), 5);
    }

    #[test]
    fn test_prompt_fails_on_end_of_input() {
        let mut par = parse(r#"n,i,q,1,1,10,"How many""#).unwrap();
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        assert!(matches!(
            par.prompt_for_value(&mut prompter),
            Err(ParamError::PromptEof { .. })
        ));
    }
}
