use std::io::{self, Write};

use serde::Serialize;

use crate::app::{IndexResult, ProgressEvent, ProgressSink, RunsResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_index(result: &IndexResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_runs(result: &RunsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
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

/// Forwards progress events to `tracing` at info level.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_index(result: &IndexResult) {
        println!(
            "{} catalog {} ({})",
            match result.action {
                crate::app::IndexAction::Built => "built",
                crate::app::IndexAction::Loaded => "loaded",
            },
            result.dataset,
            result.cache_path
        );
        println!(
            "  {} modalities, {} subjects, {} sessions, {} runs (indexed at {})",
            result.counts.modalities,
            result.counts.subjects,
            result.counts.sessions,
            result.counts.runs,
            result.indexed_at
        );
    }

    pub fn print_runs(result: &RunsResult) {
        for entry in &result.runs {
            println!(
                "{}/{}/{}/{}\techo_time={}\tparams={}",
                entry.modality,
                entry.subject,
                entry.session,
                entry.run,
                entry.echo_time,
                entry.parameters
            );
        }
    }
}
