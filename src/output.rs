use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AcquireResult, ProgressEvent, ProgressSink};
use crate::domain::StageAction;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_acquire(result: &AcquireResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints one status line per stage on stderr.
pub struct StatusLines;

impl ProgressSink for StatusLines {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub fn print_acquire_summary(result: &AcquireResult) {
    println!("puzzle database in {}", result.working_dir);
    for item in &result.items {
        let detail = match (item.lines, item.size_bytes) {
            (Some(lines), _) => format!(", {lines} lines"),
            (None, Some(bytes)) => format!(", {bytes} bytes"),
            (None, None) => String::new(),
        };
        let marker = match item.action {
            StageAction::Present | StageAction::NotNeeded => "=",
            _ => "+",
        };
        println!("{marker} {} {} ({}{detail})", item.kind, item.path, item.action);
    }
}
