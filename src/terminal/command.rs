//! Parsing of terminal input lines.

/// A parsed terminal command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// General question for the assistant.
    Chat(String),
    /// Question answered with filesystem and recent command context.
    Terminal(String),
    /// Shell command to execute.
    Run(String),
    /// Several questions answered concurrently.
    Batch(Vec<String>),
    Help,
    Exit,
    /// Blank line.
    Empty,
    /// A known keyword with nothing after it.
    MissingArgument(&'static str),
    Unknown(String),
}

pub const USAGE: &str =
    "Commands: 'chat <question>', 'terminal <question>', 'run <command>', 'batch <q1> | <q2> | ...', 'help', 'exit'";

/// Parse one line of input.
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    match keyword {
        "exit" | "quit" if rest.is_empty() => Command::Exit,
        "help" if rest.is_empty() => Command::Help,
        "chat" => with_argument("chat", rest, |q| Command::Chat(q.to_string())),
        "terminal" => with_argument("terminal", rest, |q| Command::Terminal(q.to_string())),
        "run" => with_argument("run", rest, |c| Command::Run(c.to_string())),
        "batch" => {
            let questions: Vec<String> = rest
                .split('|')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect();
            if questions.is_empty() {
                Command::MissingArgument("batch")
            } else {
                Command::Batch(questions)
            }
        }
        _ => Command::Unknown(line.to_string()),
    }
}

fn with_argument(
    keyword: &'static str,
    rest: &str,
    build: impl FnOnce(&str) -> Command,
) -> Command {
    if rest.is_empty() {
        Command::MissingArgument(keyword)
    } else {
        build(rest)
    }
}
