//! Console commands for the admin controls.

use std::str::FromStr;
use thiserror::Error;

/// A line typed on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the ball count on the server
    Balls(u64),
    
    /// Change the row width and rebuild the grid
    Row(usize),
    
    /// Reset the simulation
    Reset,
    
    Help,
    Quit,
}

impl Command {
    /// Whether the command changes server state.
    pub fn needs_admin(&self) -> bool {
        matches!(self, Command::Balls(_) | Command::Row(_) | Command::Reset)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    
    #[error("unknown command: {0}")]
    Unknown(String),
    
    #[error("{0} expects a single count argument")]
    BadArgument(&'static str),
}

fn single_arg<T: FromStr>(name: &'static str, arg: Option<&str>, rest: Option<&str>) -> Result<T, CommandError> {
    arg.filter(|_| rest.is_none())
        .and_then(|a| a.parse::<T>().ok())
        .ok_or(CommandError::BadArgument(name))
}

impl FromStr for Command {
    type Err = CommandError;
    
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Empty);
        };
        let arg = words.next();
        let rest = words.next();
        match head.to_lowercase().as_str() {
            "balls" | "num_balls" => single_arg("balls", arg, rest).map(Command::Balls),
            "row" | "chambers_per_row" => match single_arg("row", arg, rest)? {
                0 => Err(CommandError::BadArgument("row")),
                n => Ok(Command::Row(n)),
            },
            "reset" => Ok(Command::Reset),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "commands: balls <n> | row <n> | reset | help | quit";
