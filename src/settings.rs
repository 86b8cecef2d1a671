//! Connection settings.
//!
//! Settings come from a TOML file or from any string-keyed map. The keys are
//! `host`, `dbname`, `user` and `password`; SQLite only uses `dbname`, which is
//! the database path (`:memory:` for an in-memory database).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DbError, DbResult};

/// Database connection settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub host: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Keys with no dedicated field
    pub extra: HashMap<String, String>,
}

/// A plain TOML value, read back as text like an ini entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl From<RawValue> for String {
    fn from(value: RawValue) -> Self {
        match value {
            RawValue::Text(s) => s,
            RawValue::Integer(i) => i.to_string(),
            RawValue::Float(f) => f.to_string(),
            RawValue::Boolean(b) => b.to_string(),
        }
    }
}

impl Settings {
    /// Settings for the database at `dbname`
    pub fn new(dbname: impl Into<String>) -> Self {
        Self {
            dbname: dbname.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DbError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> DbResult<Self> {
        let values: HashMap<String, RawValue> =
            toml::from_str(content).map_err(|e| DbError::Config {
                message: e.to_string(),
            })?;
        Self::from_map(values)
    }

    pub fn from_map<K, V, I>(values: I) -> DbResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut settings = Settings::default();
        for (key, value) in values {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                "host" => settings.host = value,
                "dbname" => settings.dbname = value,
                "user" => settings.user = value,
                "password" => settings.password = value,
                _ => {
                    settings.extra.insert(key, value);
                }
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "host" => Some(self.host.as_str()),
            "dbname" => Some(self.dbname.as_str()),
            "user" => Some(self.user.as_str()),
            "password" => Some(self.password.as_str()),
            _ => self.extra.get(key).map(String::as_str),
        }
    }

    /// Fails when `dbname` is empty.
    pub fn validate(&self) -> DbResult<()> {
        if self.dbname.trim().is_empty() {
            return Err(DbError::Config {
                message: "missing `dbname` setting".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_with_extra_keys() {
        let settings = Settings::from_toml_str(
            r#"
            host = "localhost"
            dbname = "app.db"
            user = "app"
            password = "secret"
            charset = "utf8"
            "#,
        )
        .unwrap();
        assert_eq!(settings.dbname, "app.db");
        assert_eq!(settings.get("user"), Some("app"));
        assert_eq!(settings.get("charset"), Some("utf8"));
        assert_eq!(settings.get("port"), None);
    }

    #[test]
    fn plain_values_are_read_as_text() {
        let settings = Settings::from_toml_str(
            "dbname = \"a.db\"\nport = 3306\ntimeout = 2.5\npersistent = true\n",
        )
        .unwrap();
        assert_eq!(settings.get("port"), Some("3306"));
        assert_eq!(settings.get("timeout"), Some("2.5"));
        assert_eq!(settings.get("persistent"), Some("true"));
    }

    #[test]
    fn nested_tables_are_rejected() {
        let err = Settings::from_toml_str("dbname = \"a.db\"\n[pool]\nsize = 4\n").unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }

    #[test]
    fn missing_dbname_is_a_config_error() {
        assert!(matches!(Settings::default().validate(), Err(DbError::Config { .. })));
        assert!(matches!(Settings::new("  ").validate(), Err(DbError::Config { .. })));
        let err = Settings::from_map([("host", "localhost")]).unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }

    #[test]
    fn from_map_fills_known_fields() {
        let settings = Settings::from_map([("dbname", ":memory:"), ("password", "pw")]).unwrap();
        assert_eq!(settings, Settings {
            password: "pw".to_string(),
            ..Settings::in_memory()
        });
    }
}
