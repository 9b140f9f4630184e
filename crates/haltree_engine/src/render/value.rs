use serde_json::{Map, Value};

/// The intermediate value model shared by the field filter and the HAL renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedValue {
    Absent,
    Scalar(Value),
    Sequence(Vec<RenderedValue>),
    Record(Record),
}

/// A field-keyed record that keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, RenderedValue)>);

impl Record {
    pub fn new() -> Self {
        Self(vec![])
    }

    /// Insert a field, replacing any existing field of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: RenderedValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RenderedValue> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RenderedValue> {
        self.0
            .iter_mut()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Drop every field whose name equals `name`, ignoring case.
    pub fn remove_ignore_case(&mut self, name: &str) {
        self.0
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (String, RenderedValue);
    type IntoIter = std::vec::IntoIter<(String, RenderedValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, RenderedValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, RenderedValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl From<Value> for RenderedValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RenderedValue::Absent,
            Value::Array(items) => {
                RenderedValue::Sequence(items.into_iter().map(RenderedValue::from).collect())
            }
            Value::Object(fields) => RenderedValue::Record(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, RenderedValue::from(value)))
                    .collect(),
            ),
            scalar => RenderedValue::Scalar(scalar),
        }
    }
}

impl From<RenderedValue> for Value {
    fn from(value: RenderedValue) -> Self {
        match value {
            RenderedValue::Absent => Value::Null,
            RenderedValue::Scalar(scalar) => scalar,
            RenderedValue::Sequence(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            RenderedValue::Record(record) => Value::Object(
                record
                    .into_iter()
                    .map(|(name, value)| (name, Value::from(value)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_field_order() {
        let json = json!({"zeta": 1, "alpha": [true, null], "mid": {"b": "x", "a": "y"}});
        let rendered = RenderedValue::from(json.clone());
        let RenderedValue::Record(record) = &rendered else {
            panic!("expected a record");
        };
        assert_eq!(record.keys().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
        assert_eq!(
            record.get("alpha"),
            Some(&RenderedValue::Sequence(vec![
                RenderedValue::Scalar(json!(true)),
                RenderedValue::Absent
            ]))
        );
        assert_eq!(Value::from(rendered).to_string(), json.to_string());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = Record::new();
        record.insert("a", RenderedValue::Scalar(json!(1)));
        record.insert("b", RenderedValue::Scalar(json!(2)));
        record.insert("a", RenderedValue::Scalar(json!(3)));
        assert_eq!(Value::from(RenderedValue::Record(record)), json!({"a": 3, "b": 2}));
    }

    #[test]
    fn test_remove_ignore_case() {
        let mut record = Record::new();
        record.insert("Pools", RenderedValue::Absent);
        record.insert("hello", RenderedValue::Scalar(json!("world")));
        record.remove_ignore_case("pools");
        assert_eq!(record.keys().collect::<Vec<_>>(), ["hello"]);
        assert_eq!(record.len(), 1);
    }
}
