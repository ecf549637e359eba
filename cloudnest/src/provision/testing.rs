//! Test doubles for the command runner and credential sink.

use crate::credentials::CredentialSink;
use crate::util::{CommandLine, CommandRunner, RunOptions, StepResult};
use async_trait::async_trait;
use cloudnest_shared::errors::ProvisionResult;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

struct Rule {
    pattern: String,
    responses: VecDeque<StepResult>,
}

/// Answers commands from a script keyed by substring of the rendered command
/// line. Rules added later take precedence, and the last response of a
/// sequence repeats. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, RunOptions)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, pattern: &str, response: StepResult) -> Self {
        self.respond_seq(pattern, vec![response])
    }

    pub fn respond_seq(self, pattern: &str, responses: Vec<StepResult>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// Time limit the first call matching `pattern` was run with.
    pub fn timeout_for(&self, pattern: &str) -> Option<Duration> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(call, _)| call.contains(pattern))
            .and_then(|(_, options)| options.timeout)
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| call.contains(pattern))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine, options: RunOptions) -> ProvisionResult<StepResult> {
        let rendered = command.to_string();
        self.calls.lock().unwrap().push((rendered.clone(), options));

        let mut rules = self.rules.lock().unwrap();
        let response = rules
            .iter_mut()
            .rev()
            .find(|rule| rendered.contains(&rule.pattern))
            .and_then(|rule| {
                if rule.responses.len() > 1 {
                    rule.responses.pop_front()
                } else {
                    rule.responses.front().cloned()
                }
            });

        Ok(response.unwrap_or_default())
    }
}

/// Records credential writes in memory.
#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingSink {
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.lock().unwrap().clone()
    }
}

impl CredentialSink for RecordingSink {
    fn write(&self, path: &Path, contents: &str) -> ProvisionResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), contents.to_string()));
        Ok(())
    }
}
