//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Statement error: {message}")]
    Statement { message: String, sql: String },

    #[error("No open connection")]
    NotConnected,
}

impl DbError {
    /// The SQL text that failed, when the error came from a statement.
    pub fn sql(&self) -> Option<&str> {
        match self {
            DbError::Statement { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Terminate the process on a database error.
///
/// The failure has already been recorded by the accessor; this prints the
/// notice to stderr and exits with status 1.
pub trait OrExit<T> {
    fn or_exit(self) -> T;
}

impl<T> OrExit<T> for DbResult<T> {
    fn or_exit(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                eprintln!("{}", exit_notice(&e));
                std::process::exit(1);
            }
        }
    }
}

fn exit_notice(err: &DbError) -> String {
    format!(
        "Unhandled Exception. {} You can find the error back in the log.",
        err
    )
}
