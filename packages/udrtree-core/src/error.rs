use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("name already exists: {0}")]
    NameExists(String),
    #[error("node does not exist: {0}")]
    UnknownNode(String),
    #[error("parent does not exist: {0}")]
    UnknownParent(String),
    #[error("reserved node cannot be changed: {0}")]
    ReservedNode(String),
    #[error("cannot move {0} into its own subtree")]
    WouldCycle(String),
    #[error("{node} is already a child of {parent}")]
    AlreadyChild { node: String, parent: String },
    #[error("node is already removed: {0}")]
    AlreadyRemoved(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

impl Error {
    /// Whether this error was raised by client-facing validation, before any operation existed.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Error::InconsistentState(_))
    }
}
