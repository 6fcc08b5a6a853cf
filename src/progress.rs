use std::io::{self, Write};
use std::sync::Mutex;

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { label: String, total: Option<u64> },
    Advanced { bytes: u64 },
    Finished,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
pub struct LogProgress {
    state: Mutex<TransferState>,
}

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::Started { label, total } => {
                tracing::debug!(%label, total = total.unwrap_or(0), "transfer started");
                *state = TransferState::new(label, total);
            }
            ProgressEvent::Advanced { bytes } => state.done += bytes,
            ProgressEvent::Finished => {
                tracing::debug!(label = %state.label, bytes = state.done, "transfer finished");
            }
        }
    }
}

#[derive(Default)]
pub struct TerminalProgress {
    state: Mutex<TransferState>,
}

impl TerminalProgress {
    fn render(state: &TransferState) -> io::Result<()> {
        let mut stderr = io::stderr();
        let line = match state.total {
            Some(total) if total > 0 => {
                let pct = (state.done as f64 / total as f64 * 100.0).min(100.0);
                format!(
                    "{} {} / {} ({pct:.0}%)",
                    state.label,
                    human_bytes(state.done),
                    human_bytes(total)
                )
            }
            _ => format!("{} {}", state.label, human_bytes(state.done)),
        };
        stderr
            .queue(MoveToColumn(0))?
            .queue(Clear(ClearType::CurrentLine))?
            .queue(Print(line))?;
        stderr.flush()
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let result = match event {
            ProgressEvent::Started { label, total } => {
                *state = TransferState::new(label, total);
                Self::render(&state)
            }
            ProgressEvent::Advanced { bytes } => {
                state.done += bytes;
                Self::render(&state)
            }
            ProgressEvent::Finished => Self::render(&state).and_then(|_| {
                let mut stderr = io::stderr();
                stderr.write_all(b"\n")
            }),
        };
        // A broken stderr must not fail the transfer.
        let _ = result;
    }
}

#[derive(Debug, Default)]
struct TransferState {
    label: String,
    total: Option<u64>,
    done: u64,
}

impl TransferState {
    fn new(label: String, total: Option<u64>) -> Self {
        Self {
            label,
            total,
            done: 0,
        }
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
