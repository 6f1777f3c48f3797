//! Terminal rendering of run events and records.

use colored::{ColoredString, Colorize};
use pl_protocol::ipc::Event;
use pl_protocol::run_models::{PipelineRun, RunStatus, RunStep, StepStatus};
use std::collections::HashMap;
use std::io::Write;

/// Prints live events, writing only the newly streamed part of each step.
#[derive(Default)]
pub struct EventPrinter {
    /// Bytes of each step's accumulated output already written to stdout.
    printed: HashMap<usize, usize>,
}

impl EventPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(&mut self, event: &Event) {
        match event {
            Event::RunStarted {
                pipeline_id,
                step_count,
                ..
            } => {
                println!(
                    "{} {} ({step_count} steps)",
                    "Running".bold(),
                    pipeline_id.cyan()
                );
            }
            Event::StepStarted {
                step_index, label, ..
            } => {
                println!();
                println!("{}", format!("── step {} · {label}", step_index + 1).bold().blue());
            }
            Event::StepOutput {
                step_index, text, ..
            } => self.print_tail(*step_index, text),
            // Live updates may have been dropped; the final text fills the gap.
            Event::StepCompleted {
                step_index, text, ..
            } => {
                self.print_tail(*step_index, text);
                println!();
            }
            Event::StepFailed {
                step_index, error, ..
            } => {
                println!();
                println!("{} step {} failed: {error}", "✗".red(), step_index + 1);
            }
            Event::RunCompleted { run_id } => {
                println!();
                println!("{} run {run_id} completed", "✓".green());
            }
            Event::RunFailed { run_id, error } => {
                println!();
                println!("{} run {run_id} failed: {error}", "✗".red());
            }
            Event::RunCancelled { run_id } => {
                println!();
                println!("{} run {run_id} cancelled", "■".yellow());
            }
            Event::RunStatusUpdate { .. } | Event::RunSnapshot { .. } => {}
        }
    }

    /// Write the part of `text` not yet printed for this step.
    fn print_tail(&mut self, step_index: usize, text: &str) {
        let done = self.printed.entry(step_index).or_insert(0);
        if let Some(fresh) = text.get(*done..) {
            print!("{fresh}");
            let _ = std::io::stdout().flush();
            *done = text.len();
        }
    }
}

pub fn run_status(status: RunStatus) -> ColoredString {
    let label = format!("{status:?}").to_uppercase();
    match status {
        RunStatus::Completed => label.green(),
        RunStatus::Failed => label.red(),
        RunStatus::Cancelled => label.yellow(),
        RunStatus::Pending | RunStatus::Running => label.normal(),
    }
}

pub fn step_status(status: StepStatus) -> ColoredString {
    let label = format!("{status:?}").to_uppercase();
    match status {
        StepStatus::Completed => label.green(),
        StepStatus::Failed => label.red(),
        StepStatus::Pending | StepStatus::Running => label.normal(),
    }
}

/// One-line summary of a run.
pub fn run_line(run: &PipelineRun) -> String {
    format!(
        "{}  {:<10}  {}  {}",
        run.id,
        run_status(run.status),
        run.created_at.format("%Y-%m-%d %H:%M:%S"),
        run.pipeline_id
    )
}

/// Full description of a run and its steps.
pub fn print_run(run: &PipelineRun, steps: &[RunStep]) {
    println!("{}", run_line(run));
    if let Some(finished) = run.finished_at {
        println!("finished {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }

    for step in steps {
        println!();
        println!(
            "{} {}",
            format!("── step {} · {} ({})", step.step_index + 1, step.label, step.framework_id).bold(),
            step_status(step.status)
        );
        if let Some(usage) = step.usage {
            println!(
                "{}",
                format!("tokens: {} in / {} out", usage.input_tokens, usage.output_tokens).dimmed()
            );
        }
        if let Some(error) = &step.error {
            println!("{} {error}", "error:".red());
        }
        if !step.output.is_empty() {
            println!("{}", step.output);
        }
    }
}
