use std::io::{self, Write};

use serde::Serialize;

use crate::cli::{Display, OutputFormat};
use crate::state::{Part, Round};

/// Writes command results in the selected format.
///
/// Text goes through [`Display`]; JSON is one document per call on stdout.
pub struct OutputWriter {
    format: OutputFormat,
    display: Display,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            display: Display::new(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn emit_rounds(&self, rounds: &[Round]) {
        match self.format {
            OutputFormat::Text => self.display.print_rounds_table(rounds),
            OutputFormat::Json => self.write_json(&rounds),
        }
    }

    pub fn emit_parts(&self, round: &Round, parts: &[Part]) {
        match self.format {
            OutputFormat::Text => self.display.print_parts_table(round, parts),
            OutputFormat::Json => self.write_json(&PartsOutput { round, parts }),
        }
    }

    /// Text mode prints the TOML document as-is.
    pub fn emit_config(&self, toml: &str, config: &impl Serialize) {
        match self.format {
            OutputFormat::Text => print!("{}", toml),
            OutputFormat::Json => self.write_json(config),
        }
    }

    pub fn emit_message(&self, message: &str) {
        match self.format {
            OutputFormat::Text => self.display.print_success(message),
            OutputFormat::Json => self.write_json(&MessageOutput { message }),
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
            let _ = stdout.flush();
        }
    }
}

#[derive(Serialize)]
struct PartsOutput<'a> {
    round: &'a Round,
    parts: &'a [Part],
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    message: &'a str,
}
