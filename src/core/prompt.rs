//! DF-005: Operator prompts used while compiling a recipe.
//!
//! The compiler only talks to the [`Prompter`] trait. The CLI supplies a
//! [`TerminalPrompter`]; `--no-prompt` runs use [`NoPrompter`], which turns
//! any question into a validation error naming the missing input.

use super::error::WrappedError;
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Stdin};
use tokio::sync::Mutex;

/// One selectable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub description: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// Interactive questions asked during compilation.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Pick exactly one entry; returns its index.
    async fn select(&self, message: &str, choices: &[Choice]) -> Result<usize, WrappedError>;

    /// Check or uncheck entries. `defaults` has one flag per choice.
    async fn multi_select(
        &self,
        message: &str,
        choices: &[Choice],
        defaults: &[bool],
    ) -> Result<Vec<bool>, WrappedError>;

    async fn confirm(&self, message: &str, default: bool) -> Result<bool, WrappedError>;
}

/// Rejects every prompt. Used for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompter;

impl NoPrompter {
    fn refuse(message: &str) -> WrappedError {
        WrappedError::validation(
            "InteractiveInputRequired",
            format!(
                "interactive input required but prompting is disabled: {}",
                message
            ),
        )
    }
}

#[async_trait]
impl Prompter for NoPrompter {
    async fn select(&self, message: &str, _choices: &[Choice]) -> Result<usize, WrappedError> {
        Err(Self::refuse(message))
    }

    async fn multi_select(
        &self,
        message: &str,
        _choices: &[Choice],
        _defaults: &[bool],
    ) -> Result<Vec<bool>, WrappedError> {
        Err(Self::refuse(message))
    }

    async fn confirm(&self, message: &str, _default: bool) -> Result<bool, WrappedError> {
        Err(Self::refuse(message))
    }
}

/// Line-based prompts on stderr/stdin. One buffered reader lives for the
/// whole session so answers piped in ahead of time are not lost between
/// questions.
pub struct TerminalPrompter<R = Stdin> {
    input: Mutex<BufReader<R>>,
}

impl TerminalPrompter<Stdin> {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }
}

impl Default for TerminalPrompter<Stdin> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for TerminalPrompter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPrompter").finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin + Send> TerminalPrompter<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            input: Mutex::new(BufReader::new(reader)),
        }
    }

    async fn read_line(&self) -> Result<String, WrappedError> {
        let mut line = String::new();
        let n = self.input.lock().await.read_line(&mut line).await?;
        if n == 0 {
            return Err(WrappedError::transport(
                "PromptClosed",
                "standard input closed while waiting for an answer",
            ));
        }
        Ok(line.trim().to_string())
    }

    fn show(&self, text: &str) -> Result<(), WrappedError> {
        let mut err = std::io::stderr().lock();
        err.write_all(text.as_bytes())?;
        err.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Prompter for TerminalPrompter<R> {
    async fn select(&self, message: &str, choices: &[Choice]) -> Result<usize, WrappedError> {
        let mut text = format!("{}\n", message);
        for (i, c) in choices.iter().enumerate() {
            text.push_str(&format!("  {}) {}", i + 1, c.label));
            if !c.description.is_empty() {
                text.push_str(&format!(" - {}", c.description));
            }
            text.push('\n');
        }
        loop {
            self.show(&format!("{}> ", text))?;
            match parse_selection(&self.read_line().await?, choices.len()) {
                Some(index) => return Ok(index),
                None => self.show("Please enter one of the listed numbers.\n")?,
            }
        }
    }

    async fn multi_select(
        &self,
        message: &str,
        choices: &[Choice],
        defaults: &[bool],
    ) -> Result<Vec<bool>, WrappedError> {
        let mut checked = defaults.to_vec();
        checked.resize(choices.len(), false);
        loop {
            let mut text = format!("{}\n", message);
            for (i, c) in choices.iter().enumerate() {
                let mark = if checked[i] { "x" } else { " " };
                text.push_str(&format!("  [{}] {}) {}\n", mark, i + 1, c.label));
            }
            text.push_str("Numbers to toggle (comma separated), or Enter to accept> ");
            self.show(&text)?;
            let line = self.read_line().await?;
            if line.is_empty() {
                return Ok(checked);
            }
            match parse_toggles(&line, choices.len()) {
                Some(toggles) => {
                    for i in toggles {
                        checked[i] = !checked[i];
                    }
                }
                None => self.show("Unrecognized entry; use numbers like 1,3.\n")?,
            }
        }
    }

    async fn confirm(&self, message: &str, default: bool) -> Result<bool, WrappedError> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            self.show(&format!("{} {} ", message, hint))?;
            match parse_yes_no(&self.read_line().await?, default) {
                Some(answer) => return Ok(answer),
                None => self.show("Please answer y or n.\n")?,
            }
        }
    }
}

/// 1-based number → 0-based index.
fn parse_selection(input: &str, count: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=count).contains(&n).then(|| n - 1)
}

/// "1, 3" → [0, 2]. Any invalid entry rejects the whole line.
fn parse_toggles(input: &str, count: usize) -> Option<Vec<usize>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_selection(s, count))
        .collect()
}

fn parse_yes_no(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
