//! Progress indicators and prompts for lsconverge.

use anyhow::Result;
use colored::Colorize;
use declarative::{ActionId, ApplyResult, ConfirmCallback, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn result_symbol(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => "○".dimmed().to_string(),
        ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => {
            "✓".green().to_string()
        }
        ApplyResult::Failed { .. } => "✗".red().to_string(),
        ApplyResult::Skipped { .. } => "⊘".yellow().to_string(),
    }
}

/// Spinner per wave; one line per finished action
pub struct SpinnerProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl SpinnerProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }
}

impl ProgressCallback for SpinnerProgress {
    fn on_wave_start(&mut self, index: usize, count: usize) {
        if self.quiet {
            return;
        }
        let noun = if count == 1 { "action" } else { "actions" };
        self.bar = Some(spinner(&format!(
            "Wave {}: {} {}",
            index + 1,
            count,
            noun
        )));
    }

    fn on_action_start(&mut self, id: &ActionId, description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} {}", id, description.dimmed()));
        }
    }

    fn on_action_complete(&mut self, id: &ActionId, result: &ApplyResult) {
        let detail = match result {
            ApplyResult::Failed { error } => format!(" {}", error.red()),
            ApplyResult::Skipped { reason } => format!(" ({})", reason).dimmed().to_string(),
            _ => String::new(),
        };
        self.println(format!("  {} {}{}", result_symbol(result), id, detail));
    }

    fn on_wave_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Asks on the terminal unless `--yes` was given
pub struct PromptConfirm {
    yes: bool,
}

impl PromptConfirm {
    pub fn new(yes: bool) -> Self {
        Self { yes }
    }
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_skips_prompt() {
        let mut confirm = PromptConfirm::new(true);
        assert!(confirm.confirm("Apply 3 actions?").unwrap());
    }

    #[test]
    fn test_quiet_progress_draws_nothing() {
        let mut progress = SpinnerProgress::new(true);
        progress.on_wave_start(0, 2);
        assert!(progress.bar.is_none());
        progress.on_action_complete(&ActionId::new("package:logstash"), &ApplyResult::Created);
        progress.on_wave_complete();
    }

    #[test]
    fn test_wave_spinner_lifecycle() {
        let mut progress = SpinnerProgress::new(false);
        progress.on_wave_start(0, 1);
        assert!(progress.bar.is_some());
        progress.on_action_start(&ActionId::new("package:logstash"), "install logstash");
        progress.on_wave_complete();
        assert!(progress.bar.is_none());
    }
}
