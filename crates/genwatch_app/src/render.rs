use std::collections::HashMap;

use genwatch_core::{AbortReason, JobId, Phase, ProjectorState};

/// What has already been printed for one job.
#[derive(Debug, Default, Clone, PartialEq)]
struct Printed {
    attempt: u32,
    phase: Option<Phase>,
    logs: usize,
    items: usize,
    progress: u8,
    error: Option<String>,
}

/// Turns successive projector states into terminal lines, printing only what changed.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: HashMap<JobId, Printed>,
    form_error: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, state: &ProjectorState) -> Vec<String> {
        let view = state.view();
        let mut lines = Vec::new();

        if view.form_error != self.form_error {
            if let Some(error) = &view.form_error {
                lines.push(format!("error: {error}"));
            }
            self.form_error = view.form_error.clone();
        }

        for row in &view.jobs {
            let Some(handle) = state.handle(&row.job_id) else {
                continue;
            };
            let tag = format!("[{}]", row.job_id);
            let printed = self.printed.entry(row.job_id.clone()).or_default();

            if printed.attempt != row.attempt {
                let title = if row.title.is_empty() {
                    String::new()
                } else {
                    format!(" {:?}", row.title)
                };
                lines.push(format!(
                    "{tag} {}{title}, attempt {}",
                    row.kind.label(),
                    row.attempt
                ));
                *printed = Printed {
                    attempt: row.attempt,
                    ..Printed::default()
                };
            }

            // A reconnect replays the remote log from the start.
            if handle.logs().len() < printed.logs {
                printed.logs = 0;
            }
            for line in &handle.logs()[printed.logs..] {
                lines.push(format!("{tag} | {line}"));
            }
            printed.logs = handle.logs().len();

            if handle.items().len() < printed.items {
                printed.items = 0;
            }
            for (offset, item) in handle.items()[printed.items..].iter().enumerate() {
                let number = printed.items + offset + 1;
                lines.push(format!("{tag} #{number} {}", item_text(item)));
            }
            printed.items = handle.items().len();

            if row.progress != printed.progress {
                lines.push(format!("{tag} {}%", row.progress));
                printed.progress = row.progress;
            }

            if printed.phase != Some(row.phase) {
                lines.push(format!("{tag} {}", phase_text(row.phase)));
                printed.phase = Some(row.phase);
            }

            if row.error != printed.error {
                if let Some(error) = &row.error {
                    lines.push(format!("{tag} error: {error}"));
                }
                printed.error = row.error.clone();
            }
        }

        lines
    }
}

pub fn phase_text(phase: Phase) -> String {
    match phase {
        Phase::Ready { outcome } => {
            let label = outcome.label();
            if label.starts_with("ready") {
                label.to_string()
            } else {
                format!("ready ({label})")
            }
        }
        Phase::Aborted { reason } => {
            let reason = match reason {
                AbortReason::Failed => "failed",
                AbortReason::Cancelled => "cancelled",
                AbortReason::Abandoned => "stopped watching",
                AbortReason::Unreachable => "backend unreachable",
            };
            format!("aborted ({reason})")
        }
        other => other.label().to_string(),
    }
}

/// One-line summary of a streamed item: its prompt when it has one, else compact JSON.
fn item_text(item: &serde_json::Value) -> String {
    ["prompt", "question", "text"]
        .iter()
        .find_map(|key| item.get(key).and_then(|value| value.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| item.to_string())
}

/// Prefixes a line with the local wall-clock time.
pub fn stamped(line: &str) -> String {
    format!("{} {line}", chrono::Local::now().format("%H:%M:%S"))
}
