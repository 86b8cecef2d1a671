use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use sql_accessor::{DailyFileLog, Database, DbError, FetchMode, LogError, Params, Settings, Value};
use tempfile::TempDir;

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

#[test]
fn first_write_creates_directory_and_file() {
    let root = TempDir::new().unwrap();
    let log = DailyFileLog::new(root.path());
    assert!(!log.dir().exists());

    log.write_at("first failure", at(9, 5, 7)).unwrap();

    assert!(log.dir().is_dir());
    let path = root.path().join("logs").join("2024-05-17.txt");
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "Time : 09:05:07\r\nfirst failure\r\n"
    );
}

#[test]
fn later_writes_are_prepended() {
    let root = TempDir::new().unwrap();
    let log = DailyFileLog::new(root.path());

    log.write_at("first", at(9, 0, 0)).unwrap();
    log.write_at("second", at(10, 30, 0)).unwrap();

    let content = fs::read_to_string(log.file_for(at(0, 0, 0).date())).unwrap();
    assert_eq!(
        content,
        "Time : 10:30:00\r\nsecond\r\n\r\nTime : 09:00:00\r\nfirst\r\n"
    );
}

#[test]
fn each_day_gets_its_own_file() {
    let root = TempDir::new().unwrap();
    let log = DailyFileLog::with_dir(root.path());
    let next_day = NaiveDate::from_ymd_opt(2024, 5, 18)
        .unwrap()
        .and_hms_opt(0, 0, 1)
        .unwrap();

    log.write_at("a", at(23, 59, 59)).unwrap();
    log.write_at("b", next_day).unwrap();

    assert!(root.path().join("2024-05-17.txt").exists());
    assert_eq!(
        fs::read_to_string(root.path().join("2024-05-18.txt")).unwrap(),
        "Time : 00:00:01\r\nb\r\n"
    );
}

#[test]
fn failed_statement_lands_in_the_day_file() {
    let root = TempDir::new().unwrap();
    let log = DailyFileLog::new(root.path());
    let mut db = Database::open(Settings::in_memory())
        .unwrap()
        .with_sink(log.clone());

    db.query("SELECT * FROM missing", Params::new(), FetchMode::Assoc)
        .unwrap_err();

    let files: Vec<_> = fs::read_dir(log.dir()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let content = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    assert!(content.starts_with("Time : "));
    assert!(content.contains("no such table: missing\r\nRaw SQL : SELECT * FROM missing\r\n"));
}

#[test]
fn unwritable_log_does_not_hide_the_database_error() {
    let root = TempDir::new().unwrap();
    let blocker = root.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let log = DailyFileLog::with_dir(blocker.join("logs"));

    assert!(matches!(
        log.write_at("lost", at(8, 0, 0)),
        Err(LogError::CreateDir { .. })
    ));

    let mut db = Database::open(Settings::in_memory())
        .unwrap()
        .with_sink(log);
    let err = db
        .query("SELECT * FROM missing", Params::new(), FetchMode::Assoc)
        .unwrap_err();
    match err {
        DbError::Statement { message, sql } => {
            assert!(message.contains("no such table: missing"));
            assert_eq!(sql, "SELECT * FROM missing");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(
        db.single("SELECT 1", Params::new()).unwrap(),
        Some(Value::Integer(1))
    );
}
