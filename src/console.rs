use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use owo_colors::OwoColorize;

use crate::parameters::{is_valid_name, PlannedPut, SECURE_MARKER};

/// Whether mutating calls ask before acting. Threaded explicitly through
/// every mutation; there is no ambient prompt flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
    Prompt,
    AssumeYes,
}

impl ConfirmPolicy {
    pub fn from_yes_flag(yes: bool) -> Self {
        if yes {
            ConfirmPolicy::AssumeYes
        } else {
            ConfirmPolicy::Prompt
        }
    }

    /// Default-no confirmation: only an explicit `y` proceeds.
    pub fn confirm(self, message: &str) -> io::Result<bool> {
        match self {
            ConfirmPolicy::AssumeYes => Ok(true),
            ConfirmPolicy::Prompt => {
                print!("{} (y/N) ", message);
                io::stdout().flush()?;
                let mut input = String::new();
                io::stdin().read_line(&mut input)?;
                Ok(input.trim().eq_ignore_ascii_case("y"))
            }
        }
    }
}

/// Falls back to reading the whole of stdin when no value was given.
pub fn value_or_stdin(value: Option<String>) -> io::Result<String> {
    match value {
        Some(value) => Ok(value),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer.trim().to_string())
        }
    }
}

/// Valid parameter keys print blue, invalid ones red.
fn tint_key(key: &str) -> String {
    if is_valid_name(key) {
        key.blue().to_string()
    } else {
        key.red().to_string()
    }
}

pub fn display_value(secure: bool, value: &str) -> &str {
    if secure {
        "<redacted>"
    } else {
        value
    }
}

pub fn print_keys<'a>(keys: impl IntoIterator<Item = &'a str>) {
    for key in keys {
        println!("{}", tint_key(key));
    }
}

/// Local flat listing; `!`-marked values stay redacted.
pub fn print_flat_values(values: &BTreeMap<String, String>) {
    for (key, value) in values {
        let secure = key.ends_with(SECURE_MARKER);
        println!("{}: {}", tint_key(key), display_value(secure, value));
    }
}

pub fn print_planned_puts(puts: &[PlannedPut]) {
    for put in puts {
        let marker = if put.secure { "!" } else { "" };
        println!(
            "{}{}: {}",
            tint_key(&put.name),
            marker,
            display_value(put.secure, &put.value)
        );
    }
}
