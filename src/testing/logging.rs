//! Console progress lines
//!
//! Every line reads `| time | test | step | SECTION | STATUS | detail`.

use chrono::Local;
use colored::{ColoredString, Colorize};
use std::fmt;

/// Outcome column of a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Run,
    Done,
    Ok,
    Error,
    Warn,
    Log,
}

impl Status {
    fn label(self) -> ColoredString {
        match self {
            Status::Run => "RUN".cyan(),
            Status::Done => "DONE".cyan(),
            Status::Ok => "OK".green(),
            Status::Error => "ERROR".red(),
            Status::Warn => "WARN".yellow(),
            Status::Log => "LOG".dimmed(),
        }
    }
}

/// Prints progress for one test, optionally scoped to a step
#[derive(Debug, Clone)]
pub struct Logger {
    test: String,
    step: Option<String>,
}

impl Logger {
    pub fn new(test: &str) -> Self {
        Self {
            test: test.to_string(),
            step: None,
        }
    }

    pub fn with_step(&self, step: &str) -> Self {
        Self {
            test: self.test.clone(),
            step: Some(step.to_string()),
        }
    }

    pub fn log(&self, section: &str, status: Status, detail: impl fmt::Display) {
        println!("{}", self.line(section, status, &detail.to_string()));
    }

    fn line(&self, section: &str, status: Status, detail: &str) -> String {
        let time = Local::now().format("%H:%M:%S");
        let step = self.step.as_deref().unwrap_or("@setup");
        let mut line = format!(
            "    | {} | {} | {} | {:<7} | {:<5} |",
            time,
            self.test.bold(),
            step,
            section.magenta(),
            status.label()
        );
        if !detail.is_empty() {
            line.push(' ');
            line.push_str(detail);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_layout() {
        colored::control::set_override(false);
        let logger = Logger::new("basic").with_step("step-1");
        let line = logger.line("APPLY", Status::Ok, "v1/ConfigMap/ns/cm");
        assert!(line.contains("| basic | step-1 | APPLY   | OK    | v1/ConfigMap/ns/cm"));
        let setup = Logger::new("basic").line("CLEANUP", Status::Run, "");
        assert!(setup.contains("| basic | @setup | CLEANUP | RUN   |"));
        assert!(setup.ends_with('|'));
    }
}
