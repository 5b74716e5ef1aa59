use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// One shaped output record (flat, nested or validated)
pub type Record = Map<String, Value>;

/// One raw result row: projected label → decoded value
pub type Row = Map<String, Value>;

/// Result envelope of multi-row reads
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub data: Vec<Record>,
    pub total_count: u64,
}

impl Page {
    /// Deserializes every record into `T`
    pub fn into_models<T: DeserializeOwned>(self) -> serde_json::Result<Vec<T>> {
        self.data
            .into_iter()
            .map(|record| serde_json::from_value(Value::Object(record)))
            .collect()
    }
}

/// Keyset page. `next_cursor` is the sort value of the last record when the
/// page was full.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CursorPage {
    pub data: Vec<Record>,
    pub next_cursor: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tier {
        id: i64,
        name: String,
    }

    #[test]
    fn test_page_into_models() {
        let page = Page {
            data: vec![json!({"id": 1, "name": "Premium"}).as_object().cloned().unwrap()],
            total_count: 1,
        };
        let tiers: Vec<Tier> = page.into_models().unwrap();
        assert_eq!(
            tiers,
            vec![Tier {
                id: 1,
                name: "Premium".to_string()
            }]
        );
    }

    #[test]
    fn test_page_serializes_envelope() {
        let page = Page::default();
        assert_eq!(
            serde_json::to_value(page).unwrap(),
            json!({"data": [], "total_count": 0})
        );
    }
}
