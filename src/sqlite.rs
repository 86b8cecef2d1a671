use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::{Connection, Statement};
use tracing::Level;

use crate::error::{DbError, DbResult};
use crate::log::ErrorSink;
use crate::params::Params;
use crate::settings::Settings;
use crate::value::Value;

/// Shape of a fetched row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Column name to value
    #[default]
    Assoc,
    /// Values in column order
    Num,
    /// Both of the above
    Both,
}

/// One fetched row
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Assoc(HashMap<String, Value>),
    Num(Vec<Value>),
    Both {
        named: HashMap<String, Value>,
        positional: Vec<Value>,
    },
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            Row::Assoc(named) | Row::Both { named, .. } => named.get(column),
            Row::Num(_) => None,
        }
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Row::Num(positional) | Row::Both { positional, .. } => positional.get(index),
            Row::Assoc(_) => None,
        }
    }
}

/// Result of [`Database::query`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// `SELECT` and `SHOW`
    Rows(Vec<Row>),
    /// `INSERT`, `UPDATE` and `DELETE`
    Affected(usize),
    /// Any other statement
    Nothing,
}

impl QueryResult {
    pub fn rows(self) -> Option<Vec<Row>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<usize> {
        match self {
            QueryResult::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

/// Kind of SQL statement, taken from its first keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Show,
    Insert,
    Update,
    Delete,
    Other,
}

/// Classify `sql` by its first keyword, ignoring case and surrounding whitespace.
pub fn statement_kind(sql: &str) -> StatementKind {
    let first = normalize(sql)
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match first.as_str() {
        "select" => StatementKind::Select,
        "show" => StatementKind::Show,
        "insert" => StatementKind::Insert,
        "update" => StatementKind::Update,
        "delete" => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

fn normalize(sql: &str) -> String {
    sql.replace('\r', " ").trim().to_string()
}

/// Single-connection SQLite accessor.
///
/// Parameters can be staged with [`Database::bind`] or passed per call as
/// [`Params`]. Staged parameters win: per-call parameters are merged only when
/// nothing is staged. The staged list is empty after every statement, whether
/// it succeeded or not.
///
/// Every connection or statement failure is recorded to the configured
/// [`ErrorSink`]s, then returned as a [`DbError`]. Unless one of the sinks
/// already forwards to `tracing`, the failure is also emitted as an error event.
pub struct Database {
    settings: Settings,
    settings_path: Option<PathBuf>,
    connection: Option<Connection>,
    connected: bool,
    pending: Params,
    sinks: Vec<Box<dyn ErrorSink>>,
}

impl Database {
    /// Create an accessor; the connection opens on first use.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            settings_path: None,
            connection: None,
            connected: false,
            pending: Params::new(),
            sinks: Vec::new(),
        }
    }

    /// Create an accessor whose settings are re-read from `path` on each connect.
    pub fn from_settings_file(path: impl Into<PathBuf>) -> DbResult<Self> {
        let path = path.into();
        let settings = Settings::from_file(&path)?;
        let mut db = Self::new(settings);
        db.settings_path = Some(path);
        Ok(db)
    }

    /// Create an accessor and connect right away.
    pub fn open(settings: Settings) -> DbResult<Self> {
        let mut db = Self::new(settings);
        db.connect()?;
        Ok(db)
    }

    /// Also record failures to `sink`.
    pub fn with_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Open the connection, replacing any open one.
    pub fn connect(&mut self) -> DbResult<()> {
        if let Some(path) = &self.settings_path {
            self.settings = Settings::from_file(path).inspect_err(|e| {
                tracing::error!(path = %path.display(), "{}", e);
            })?;
        }
        if let Err(e) = self.settings.validate() {
            self.connection = None;
            self.connected = false;
            self.record_failure(&e.to_string(), None);
            return Err(e);
        }
        if !self.settings.host.is_empty() || !self.settings.user.is_empty() {
            tracing::debug!(
                host = %self.settings.host,
                user = %self.settings.user,
                "sqlite ignores host and user settings"
            );
        }
        tracing::debug!(dbname = %self.settings.dbname, "opening sqlite connection");

        let opened = Connection::open(&self.settings.dbname)
            .and_then(|conn| conn.execute_batch("PRAGMA encoding = 'UTF-8'").map(|_| conn));
        match opened {
            Ok(conn) => {
                self.connection = Some(conn);
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                self.connection = None;
                self.connected = false;
                let message = e.to_string();
                self.record_failure(&message, None);
                Err(DbError::Connection { message })
            }
        }
    }

    /// Drop the connection; the next statement reconnects.
    pub fn close_connection(&mut self) {
        if self.connection.take().is_some() {
            tracing::debug!(dbname = %self.settings.dbname, "closed sqlite connection");
        }
        self.connected = false;
    }

    /// Stage a parameter for the next statement.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) {
        self.pending.bind(name, value);
    }

    /// Stage several parameters, unless some are already staged.
    pub fn bind_more<K, V, I>(&mut self, values: I)
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.pending.bind_more(values);
    }

    /// Parameters staged for the next statement.
    pub fn pending(&self) -> &Params {
        &self.pending
    }

    /// Run `sql` and shape the result by its first keyword.
    pub fn query(&mut self, sql: &str, params: Params, mode: FetchMode) -> DbResult<QueryResult> {
        let sql = normalize(sql);
        let kind = statement_kind(&sql);
        self.init(&sql, params, |stmt| match kind {
            StatementKind::Select | StatementKind::Show => fetch_all(stmt, mode).map(QueryResult::Rows),
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                execute(stmt).map(QueryResult::Affected)
            }
            StatementKind::Other => execute(stmt).map(|_| QueryResult::Nothing),
        })
    }

    /// First row of the result, if any.
    pub fn row(&mut self, sql: &str, params: Params, mode: FetchMode) -> DbResult<Option<Row>> {
        self.init(sql, params, |stmt| {
            let columns = column_names(stmt);
            let mut rows = stmt.raw_query();
            let row = match rows.next()? {
                Some(row) => Some(read_row(row, &columns, mode)?),
                None => None,
            };
            Ok(row)
        })
    }

    /// First field of every row.
    pub fn column(&mut self, sql: &str, params: Params) -> DbResult<Vec<Value>> {
        self.init(sql, params, |stmt| {
            let mut values = Vec::new();
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next()? {
                values.push(Value::from(row.get_ref(0)?));
            }
            Ok(values)
        })
    }

    /// First field of the first row, if any.
    pub fn single(&mut self, sql: &str, params: Params) -> DbResult<Option<Value>> {
        self.init(sql, params, |stmt| {
            let mut rows = stmt.raw_query();
            let value = match rows.next()? {
                Some(row) => Some(Value::from(row.get_ref(0)?)),
                None => None,
            };
            Ok(value)
        })
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_id(&self) -> DbResult<i64> {
        self.handle().map(Connection::last_insert_rowid)
    }

    pub fn begin_transaction(&mut self) -> DbResult<()> {
        self.ensure_connected()?;
        self.control("BEGIN")
    }

    pub fn commit_transaction(&mut self) -> DbResult<()> {
        self.control("COMMIT")
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        self.control("ROLLBACK")
    }

    fn control(&self, sql: &str) -> DbResult<()> {
        let result = self.handle()?.execute_batch(sql);
        result.map_err(|e| self.fail(e.to_string(), sql))
    }

    fn handle(&self) -> DbResult<&Connection> {
        self.connection.as_ref().ok_or(DbError::NotConnected)
    }

    fn ensure_connected(&mut self) -> DbResult<()> {
        if !self.connected || self.connection.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    /// Prepare `sql`, bind the staged parameters and hand the statement to `shape`.
    fn init<T, F>(&mut self, sql: &str, params: Params, shape: F) -> DbResult<T>
    where
        F: FnOnce(&mut Statement<'_>) -> rusqlite::Result<T>,
    {
        let mut bound = std::mem::take(&mut self.pending);
        bound.bind_more(params);

        self.ensure_connected()?;
        tracing::debug!(sql = %sql, params = bound.len(), "executing statement");

        let result = run(self.handle()?, sql, &bound, shape);
        result.map_err(|e| self.fail(e.to_string(), sql))
    }

    fn fail(&self, message: String, sql: &str) -> DbError {
        self.record_failure(&message, Some(sql));
        DbError::Statement {
            message,
            sql: sql.to_string(),
        }
    }

    fn sinks_emit_tracing(&self) -> bool {
        self.sinks.iter().any(|sink| sink.emits_tracing())
    }

    fn record_failure(&self, message: &str, sql: Option<&str>) {
        let context: Vec<(&str, &str)> = sql.map(|sql| ("Raw SQL", sql)).into_iter().collect();
        if !self.sinks_emit_tracing() {
            match sql {
                Some(sql) => tracing::error!(sql = %sql, "{}", message),
                None => tracing::error!(dbname = %self.settings.dbname, "{}", message),
            }
        }
        for sink in &self.sinks {
            if let Err(e) = sink.record(Level::ERROR, message, &context) {
                tracing::warn!("failed to record database error: {:#}", e);
            }
        }
    }
}

fn run<T, F>(conn: &Connection, sql: &str, params: &Params, shape: F) -> rusqlite::Result<T>
where
    F: FnOnce(&mut Statement<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    for (name, value) in params.iter() {
        let index = stmt
            .parameter_index(name)?
            .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.to_string()))?;
        stmt.raw_bind_parameter(index, value)?;
    }
    shape(&mut stmt)
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

fn fetch_all(stmt: &mut Statement<'_>, mode: FetchMode) -> rusqlite::Result<Vec<Row>> {
    let columns = column_names(stmt);
    let mut rows = stmt.raw_query();
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(read_row(row, &columns, mode)?);
    }
    Ok(result)
}

// Statements that return rows (RETURNING, some PRAGMAs) are drained and counted.
fn execute(stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
    if stmt.column_count() == 0 {
        return stmt.raw_execute();
    }
    let mut rows = stmt.raw_query();
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

fn read_row(row: &rusqlite::Row<'_>, columns: &[String], mode: FetchMode) -> rusqlite::Result<Row> {
    let positional = (0..columns.len())
        .map(|i| row.get_ref(i).map(Value::from))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let named = || {
        columns
            .iter()
            .cloned()
            .zip(positional.iter().cloned())
            .collect::<HashMap<_, _>>()
    };
    Ok(match mode {
        FetchMode::Assoc => Row::Assoc(named()),
        FetchMode::Num => Row::Num(positional),
        FetchMode::Both => Row::Both {
            named: named(),
            positional,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::log::{DailyFileLog, TracingSink};

    #[test]
    fn tracing_sink_replaces_the_builtin_error_event() {
        let db = Database::new(Settings::in_memory());
        assert!(!db.sinks_emit_tracing());

        let db = db.with_sink(DailyFileLog::new("/tmp"));
        assert!(!db.sinks_emit_tracing());

        let db = db.with_sink(Arc::new(TracingSink));
        assert!(db.sinks_emit_tracing());
    }

    #[test]
    fn statement_kind_reads_first_keyword() {
        assert_eq!(statement_kind("SELECT * FROM t"), StatementKind::Select);
        assert_eq!(statement_kind("  \r\n\tselect 1"), StatementKind::Select);
        assert_eq!(statement_kind("Show tables"), StatementKind::Show);
        assert_eq!(statement_kind("INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(statement_kind("update t set a = 1"), StatementKind::Update);
        assert_eq!(statement_kind("DELETE FROM t WHERE id=1"), StatementKind::Delete);
        assert_eq!(statement_kind("SET x=1"), StatementKind::Other);
        assert_eq!(statement_kind(""), StatementKind::Other);
    }

    #[test]
    fn keyword_must_stand_alone() {
        assert_eq!(statement_kind("selector"), StatementKind::Other);
        assert_eq!(statement_kind("SELECT\r*\rFROM t"), StatementKind::Select);
    }

    #[test]
    fn row_accessors_match_shape() {
        let row = Row::Both {
            named: HashMap::from([("id".to_string(), Value::Integer(1))]),
            positional: vec![Value::Integer(1)],
        };
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get_index(0), Some(&Value::Integer(1)));
        assert_eq!(Row::Num(vec![Value::Null]).get("id"), None);
        assert_eq!(Row::Assoc(HashMap::new()).get_index(0), None);
    }
}
