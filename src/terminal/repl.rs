//! Interactive line editor around a [`Session`].

use super::command::{parse, USAGE};
use super::session::{Flow, Session};
use anyhow::Result;
use crossterm::style::Stylize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Repl {
    session: Session,
    editor: Editor<(), DefaultHistory>,
}

impl Repl {
    pub fn new(session: Session) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();
        let editor = Editor::with_config(config)?;

        Ok(Self { session, editor })
    }

    /// Read and execute commands until `exit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        println!("{}", "Terminal AI Assistant (Type 'exit' to quit)".bold());
        println!("{}", USAGE.dark_grey());

        let mut stdout = std::io::stdout();
        loop {
            let line = match self.editor.readline("> ") {
                Ok(line) => line,
                // Ctrl+C at the prompt only clears the line
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };

            let command = parse(&line);
            debug!(?command, "Executing terminal command");

            // Ctrl+C while a command runs cancels that command only.
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                }
            });

            let flow = self.session.execute(command, &mut stdout, &cancel).await;
            watcher.abort();

            match flow? {
                Flow::Continue => println!(),
                Flow::Exit => break,
            }
        }

        println!("Goodbye!");
        Ok(())
    }
}
