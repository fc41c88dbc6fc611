use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The key was not found where existence was required.
    InvalidId,
    /// The backend refused a write.
    FailedToSet,
    /// An entity was linked to itself.
    SelfBind,
    /// A before-trigger vetoed the operation.
    CancelledByTrigger,
    DuplicateTrigger,
    InexistentTrigger,
    Encode,
    Decode,
    Io,
    Corrupted,
}

#[derive(Debug, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn invalid_id(key: impl std::fmt::Display) -> Self {
        Error::new(ErrorKind::InvalidId, format!("no record stored under {}", key))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
