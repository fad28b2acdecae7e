//! Line-oriented command surface of an interactive replica.

use crate::error::Result;
use crate::replica::Replica;

pub const HELP: &str = "\
COMMANDS
  add <name> <parent>       Add node <name> as a child of <parent>
  rm <node>                 Remove <node>
  mv <node> <parent>        Move <node> under <parent>
  rename <node> <new-name>  Rename <node>
  print                     Show the tree
  connect                   Resume sending to other replicas
  disconnect                Stop sending to other replicas
  quit                      Flush pending operations and exit
  help                      Show this message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add { name: String, parent: String },
    Remove { node: String },
    Move { node: String, parent: String },
    Rename { node: String, new_name: String },
    Print,
    Connect,
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid command, usage: {0}")]
    Usage(&'static str),
    #[error("command not found: {0}")]
    Unknown(String),
}

/// What the caller should do after a command ran.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue(Option<String>),
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`; extra arguments are ignored.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Ok(None);
        };
        let arg = |i: usize, usage: &'static str| {
            args.get(i)
                .map(|s| s.to_string())
                .ok_or(ParseError::Usage(usage))
        };

        let command = match verb {
            "add" => Command::Add {
                name: arg(0, "add <name> <parent>")?,
                parent: arg(1, "add <name> <parent>")?,
            },
            "rm" => Command::Remove {
                node: arg(0, "rm <node>")?,
            },
            "mv" => Command::Move {
                node: arg(0, "mv <node> <parent>")?,
                parent: arg(1, "mv <node> <parent>")?,
            },
            "rename" => Command::Rename {
                node: arg(0, "rename <node> <new-name>")?,
                new_name: arg(1, "rename <node> <new-name>")?,
            },
            "print" => Command::Print,
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "help" => Command::Help,
            "quit" => Command::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }

    pub async fn execute(self, replica: &Replica) -> Result<Outcome> {
        match self {
            Command::Add { name, parent } => {
                replica.add(&name, &parent).await?;
            }
            Command::Remove { node } => {
                replica.remove(&node).await?;
            }
            Command::Move { node, parent } => {
                replica.move_node(&node, &parent).await?;
            }
            Command::Rename { node, new_name } => {
                replica.rename(&node, &new_name).await?;
            }
            Command::Print => return Ok(Outcome::Continue(Some(replica.render()))),
            Command::Connect => replica.connect(),
            Command::Disconnect => replica.disconnect(),
            Command::Help => return Ok(Outcome::Continue(Some(HELP.to_string()))),
            Command::Quit => {
                replica.close().await?;
                return Ok(Outcome::Quit);
            }
        }
        Ok(Outcome::Continue(None))
    }
}
