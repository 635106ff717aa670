//! Error kinds and the recoverable/fatal policy described in spec §7.
use thiserror::Error;

/// Every failure mode the core can produce.
///
/// Recoverable kinds (statement parse, key lookup) are meant to be printed
/// by the REPL collaborator and the loop continued. Fatal kinds indicate a
/// broken on-disk invariant or failing I/O and should abort the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error: {0}")]
    PrepareSyntaxError(String),

    #[error("ID must be positive")]
    NegativeId,

    #[error("String is too long")]
    StringTooLong,

    #[error("Unrecognized statement: {0}")]
    UnrecognizedStatement(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(u32),

    #[error("Key not found: {0}")]
    KeyNotFound(u32),

    #[error("Table full")]
    TableFull,

    #[error("Database file is corrupt: {0}")]
    CorruptFile(String),

    #[error("Short write to page {0}")]
    ShortWrite(u32),

    #[error("Page {0} is out of bounds")]
    PageOutOfBounds(u32),

    #[error("Invalid page access: {0}")]
    InvalidPageAccess(String),

    #[error("Failed to allocate a new page")]
    AllocFail,

    #[error("A transaction is already active")]
    TransactionAlreadyActive,

    #[error("No active transaction")]
    NoActiveTransaction,
}

impl Error {
    /// True when this error indicates a broken on-disk invariant or I/O
    /// failure that the process cannot recover from (spec §7).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::CorruptFile(_)
                | Error::ShortWrite(_)
                | Error::PageOutOfBounds(_)
                | Error::InvalidPageAccess(_)
                | Error::AllocFail
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
