use colored::Colorize;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Pretty,
    Raw,
    Json,
}

impl OutputMode {
    pub fn from_flags(raw: bool, json: bool) -> Self {
        if json {
            OutputMode::Json
        } else if raw {
            OutputMode::Raw
        } else {
            OutputMode::Pretty
        }
    }
}

/// Print a response body. `Raw` prints strings unquoted and everything else
/// as compact JSON.
pub fn print_value(value: &serde_json::Value, mode: OutputMode) {
    match mode {
        OutputMode::Raw => match value {
            serde_json::Value::String(s) => println!("{s}"),
            other => println!("{other}"),
        },
        OutputMode::Json | OutputMode::Pretty => {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
        }
    }
}

pub fn print_error(err: &AuthError, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&err.to_json()).unwrap_or_default());
    } else {
        eprintln!("{err}");
    }
}

/// `label: value`, with the label bold and the value green or red on a tty.
pub fn format_field(label: &str, value: &str, ok: bool, is_tty: bool) -> String {
    if !is_tty {
        return format!("{label}: {value}");
    }
    let value = if ok { value.green() } else { value.red() };
    format!("{}: {}", label.bold(), value)
}

pub fn format_dim(text: &str, is_tty: bool) -> String {
    if is_tty {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}
