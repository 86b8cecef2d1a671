//! SQLite access helpers with typed result shapes and exception logs.
//!
//! # Intention
//!
//! - Open one connection from a small settings source and run parameterized SQL.
//! - Shape results as rows, a single column, a single value or an affected count.
//! - Record every database failure, with the raw SQL, to an error sink.
//!
//! # Architectural Boundaries
//!
//! - Only database access and failure logging belong here.
//! - No pooling, no query building, no schema management.

pub mod error;
pub mod log;
pub mod params;
pub mod settings;
pub mod sqlite;
pub mod value;

pub use error::{DbError, DbResult, OrExit};
pub use log::{DailyFileLog, ErrorSink, LogError, TracingSink};
pub use params::Params;
pub use settings::Settings;
pub use sqlite::{statement_kind, Database, FetchMode, QueryResult, Row, StatementKind};
pub use value::{ParamType, Value};
