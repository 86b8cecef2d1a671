use crate::value::Value;

/// Parameter bindings for SQL queries.
///
/// Keeps insertion order and holds at most one entry per placeholder name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    /// Add a named value, replacing an earlier value bound to the same name.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) {
        let name = placeholder(name);
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Bind every pair from `values`, but only when nothing is bound yet.
    pub fn bind_more<K, V, I>(&mut self, values: I)
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        if !self.values.is_empty() {
            return;
        }
        for (name, value) in values {
            self.bind(name.as_ref(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = placeholder(name);
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl IntoIterator for Params {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

// SQLite accepts `:name`, `@name` and `$name`; bare names get the colon form.
fn placeholder(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{}", name)
    }
}
