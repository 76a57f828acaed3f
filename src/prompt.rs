//! Line input for the terminal chat loop.

use std::future::Future;
use std::io;

use tokio::io::{AsyncBufRead, Lines};

pub const HELP: &str = "commands: /model <name>, /models, /reset, /quit";

/// What the user typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    Reset,
    Models,
    Model(&'a str),
    Help,
    Chat(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if !line.starts_with('/') {
            return Self::Chat(line);
        }

        let (cmd, arg) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(c, a)| (c, a.trim()));
        match (cmd, arg) {
            ("/quit", _) => Self::Quit,
            ("/reset", _) => Self::Reset,
            ("/models", _) => Self::Models,
            ("/model", name) if !name.is_empty() => Self::Model(name),
            _ => Self::Help,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Wait for the next line or for `interrupt`, whichever comes first.
///
/// Once a Ctrl-C handler is installed the default SIGINT exit is gone, so
/// the prompt has to listen for it too.
pub async fn read_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> io::Result<Input>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        biased;
        signal = interrupt => {
            signal?;
            Ok(Input::Interrupted)
        }
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
    }
}
