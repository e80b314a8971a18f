//! Scripted [`ClusterCli`] for multi-step tests
//!
//! Responses are keyed by argv prefix; the longest matching prefix wins. Each
//! rule hands out its queued responses in order and keeps repeating the last
//! one, so "Pending forever" is a single rule. Every call is recorded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::kubectl::{ClusterCli, CommandFailure, CommandResult};

struct Rule {
    prefix: Vec<String>,
    responses: VecDeque<CommandResult>,
}

/// Fake cluster CLI answering from scripted rules
#[derive(Default)]
pub struct ScriptedCli {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Vec<String>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedCli {
    /// Create a fake with no rules; unmatched calls fail
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for calls starting with `prefix`
    pub fn on(&self, prefix: &[&str], result: CommandResult) -> &Self {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        let mut rules = lock(&self.rules);
        match rules.iter_mut().find(|r| r.prefix == prefix) {
            Some(rule) => rule.responses.push_back(result),
            None => rules.push(Rule {
                prefix,
                responses: VecDeque::from([result]),
            }),
        }
        self
    }

    /// Queue a successful response
    pub fn ok(&self, prefix: &[&str], output: &str) -> &Self {
        self.on(prefix, CommandResult::ok(output))
    }

    /// Queue a failed response with exit status 1
    pub fn fail(&self, prefix: &[&str], output: &str) -> &Self {
        self.on(prefix, CommandResult::failed(output, CommandFailure::Exit(Some(1))))
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count(&self, prefix: &[&str]) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| starts_with(call, prefix))
            .count()
    }
}

fn starts_with<S: AsRef<str>>(call: &[String], prefix: &[S]) -> bool {
    call.len() >= prefix.len() && call.iter().zip(prefix).all(|(a, b)| a == b.as_ref())
}

#[async_trait]
impl ClusterCli for ScriptedCli {
    async fn run(&self, args: &[String]) -> CommandResult {
        lock(&self.calls).push(args.to_vec());

        let mut rules = lock(&self.rules);
        let rule = rules
            .iter_mut()
            .filter(|r| starts_with(args, &r.prefix))
            .max_by_key(|r| r.prefix.len());

        match rule {
            Some(rule) if rule.responses.len() > 1 => rule
                .responses
                .pop_front()
                .unwrap_or_else(|| CommandResult::ok("")),
            Some(rule) => rule
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| CommandResult::ok("")),
            None => CommandResult::failed(
                format!("no scripted response for: {}", args.join(" ")),
                CommandFailure::Exit(Some(127)),
            ),
        }
    }
}
