//! Execution of parsed terminal commands.
//!
//! Kept separate from the line editor so commands can be driven with any
//! writer, including an in-memory buffer.

use super::command::{Command, USAGE};
use super::history::History;
use super::shell;
use crate::context::gather_filesystem_info;
use crate::dispatch::{Dispatcher, Outcome};
use crate::llm::Completer;
use crossterm::style::Stylize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const TERMINAL_SYSTEM_PROMPT: &str = "You are a terminal assistant that helps users navigate \
their filesystem and suggests commands. When suggesting commands, be specific and explain what \
each command does. Here is information about the current filesystem:\n\n";

/// Whether the REPL should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// State shared across commands of one terminal session.
pub struct Session {
    completer: Arc<dyn Completer>,
    dispatcher: Dispatcher,
    history: History,
    max_tokens: u32,
    cwd: PathBuf,
}

impl Session {
    pub fn new(
        completer: Arc<dyn Completer>,
        dispatcher: Dispatcher,
        history_len: usize,
        max_tokens: u32,
        cwd: PathBuf,
    ) -> Self {
        Self {
            completer,
            dispatcher,
            history: History::new(history_len),
            max_tokens,
            cwd,
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run one command, writing everything it displays to `out`.
    pub async fn execute<W: Write>(
        &mut self,
        command: Command,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> std::io::Result<Flow> {
        match command {
            Command::Exit => return Ok(Flow::Exit),
            Command::Empty => {}
            Command::Help => writeln!(out, "{}", USAGE)?,
            Command::MissingArgument(keyword) => {
                let what = if keyword == "run" { "a command" } else { "a question" };
                writeln!(
                    out,
                    "{}",
                    format!("Error: Please provide {} after '{}'", what, keyword).red()
                )?;
            }
            Command::Unknown(_) => writeln!(out, "Unknown command. {}", USAGE)?,
            Command::Chat(question) => self.chat(&question, out, cancel).await?,
            Command::Terminal(question) => self.terminal(&question, out, cancel).await?,
            Command::Run(command) => self.run(&command, out, cancel).await?,
            Command::Batch(questions) => self.batch(&questions, out, cancel).await?,
        }
        Ok(Flow::Continue)
    }

    async fn chat<W: Write>(
        &self,
        question: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> std::io::Result<()> {
        writeln!(out, "{}", "Processing your request...".dark_grey())?;
        out.flush()?;
        let result = self
            .completer
            .complete(cancel, Some(CHAT_SYSTEM_PROMPT), question, self.max_tokens)
            .await;
        print_answer(out, "AI Response:", result.into())
    }

    async fn terminal<W: Write>(
        &self,
        question: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> std::io::Result<()> {
        writeln!(
            out,
            "{}",
            "Analyzing filesystem and processing your request...".dark_grey()
        )?;
        out.flush()?;

        let fs_info = match gather_filesystem_info(&self.cwd) {
            Ok(info) => info,
            Err(e) => {
                writeln!(out, "{}", format!("Error getting filesystem info: {:#}", e).red())?;
                return Ok(());
            }
        };
        let system = terminal_system_prompt(&fs_info, &self.history);
        let result = self
            .completer
            .complete(cancel, Some(&system), question, self.max_tokens)
            .await;
        print_answer(out, "Terminal Assistant Response:", result.into())
    }

    async fn run<W: Write>(
        &mut self,
        command: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> std::io::Result<()> {
        writeln!(out, "{}", format!("Executing command: {}", command).dark_grey())?;
        out.flush()?;

        let output = match shell::run(command, cancel).await {
            Ok(result) => {
                if !result.status.success() {
                    writeln!(out, "{}", format!("Command error: {}", result.status).red())?;
                }
                result.output
            }
            Err(e) => {
                writeln!(out, "{}", format!("Command error: {}", e).red())?;
                String::new()
            }
        };

        self.history
            .push(format!("Command: {}\nOutput: {}", command, output));

        writeln!(out, "{}", "Command output:".cyan().bold())?;
        write!(out, "{}", output)?;
        if !output.is_empty() && !output.ends_with('\n') {
            writeln!(out)?;
        }
        Ok(())
    }

    async fn batch<W: Write>(
        &self,
        questions: &[String],
        out: &mut W,
        cancel: &CancellationToken,
    ) -> std::io::Result<()> {
        writeln!(
            out,
            "{}",
            format!("Processing {} questions concurrently...", questions.len()).dark_grey()
        )?;
        out.flush()?;

        let outcomes = self.dispatcher.dispatch(cancel, questions).await;
        for (index, (question, outcome)) in questions.iter().zip(outcomes).enumerate() {
            writeln!(out, "{}", format!("[{}] {}", index + 1, question).bold())?;
            match outcome {
                Outcome::Answer(answer) => writeln!(out, "{}", answer.trim_end())?,
                Outcome::Failure(e) => writeln!(out, "{}", format!("Error: {}", e).red())?,
            }
        }
        Ok(())
    }
}

fn print_answer<W: Write>(out: &mut W, header: &str, outcome: Outcome) -> std::io::Result<()> {
    match outcome {
        Outcome::Answer(answer) => {
            writeln!(out, "{}", header.cyan().bold())?;
            writeln!(out, "{}", answer.trim_end())
        }
        Outcome::Failure(e) => writeln!(out, "{}", format!("Error: {}", e).red()),
    }
}

/// System prompt for `terminal` questions.
pub fn terminal_system_prompt(fs_info: &str, history: &History) -> String {
    let mut prompt = format!("{}{}", TERMINAL_SYSTEM_PROMPT, fs_info);
    if !history.is_empty() {
        prompt.push_str("\n\nRecent command output history:\n");
        prompt.push_str(&history.join("\n---\n"));
    }
    prompt
}
