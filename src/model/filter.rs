use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison applied by a filter key. Parsed from the `__op` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "ne" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterKey {
    pub field: String,
    pub op: FilterOp,
}

impl FilterKey {
    /// `id__gt` → (`id`, Gt). Keys without a known suffix are exact matches.
    pub fn parse(key: &str) -> Self {
        if let Some((field, suffix)) = key.rsplit_once("__") {
            if let Some(op) = FilterOp::from_suffix(suffix) {
                return Self {
                    field: field.to_string(),
                    op,
                };
            }
        }
        Self {
            field: key.to_string(),
            op: FilterOp::Eq,
        }
    }
}

/// Ordered filter mapping: key (field name, optionally `__op` suffixed) → value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(Vec<(String, Value)>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value for `key`, keeping the first position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn parsed(&self) -> impl Iterator<Item = (FilterKey, &Value)> {
        self.0.iter().map(|(k, v)| (FilterKey::parse(k), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = Filters::new();
        for (key, value) in iter {
            filters.insert(key, value);
        }
        filters
    }
}

impl From<Map<String, Value>> for Filters {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}
