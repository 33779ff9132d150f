//! Action arguments: the untyped `arguments` object of a task envelope with
//! typed accessors that fail as hard errors.

use super::errors::{ActionError, ActionResult};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Every `required` key present and nothing outside `required` and `optional`
    pub fn check(&self, required: &[&str], optional: &[&str], task: &str) -> ActionResult<()> {
        if let Some(missing) = required.iter().find(|key| !self.contains(key)) {
            return Err(ActionError::hard(format!("{missing} required for {task}.")));
        }
        if let Some(illegal) = self
            .keys()
            .find(|key| !required.contains(key) && !optional.contains(key))
        {
            return Err(ActionError::hard(format!("Illegal argument ({illegal}) for {task}")));
        }
        Ok(())
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str, task: &str) -> ActionResult<&str> {
        self.str(key)
            .ok_or_else(|| ActionError::hard(format!("{key} required for {task}.")))
    }

    /// Integer argument; numeric strings are accepted
    pub fn i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn require_i64(&self, key: &str, task: &str) -> ActionResult<i64> {
        match self.get(key) {
            None => Err(ActionError::hard(format!("{key} required for {task}."))),
            Some(value) => self.i64(key).ok_or_else(|| {
                ActionError::hard(format!("{key} must be an integer for {task}, got {value}"))
            }),
        }
    }

    pub fn require_i64_list(&self, key: &str, task: &str) -> ActionResult<Vec<i64>> {
        let invalid = || ActionError::hard(format!("{key} must be a list of integers for {task}"));
        let items = self
            .get(key)
            .ok_or_else(|| ActionError::hard(format!("{key} required for {task}.")))?
            .as_array()
            .ok_or_else(invalid)?;
        items
            .iter()
            .map(|item| item.as_i64().ok_or_else(invalid))
            .collect()
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Arguments> for Map<String, Value> {
    fn from(arguments: Arguments) -> Self {
        arguments.0
    }
}

impl TryFrom<Value> for Arguments {
    type Error = ActionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(ActionError::hard(format!("Arguments must be an object, got {other}"))),
        }
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_required_and_illegal() {
        let args = Arguments::new().with("bucket", "b").with("key", "k.bin");
        assert!(args.check(&["bucket", "key"], &["version"], "ProcessReportV1Action").is_ok());

        let err = args.check(&["bucket", "key", "uuid"], &[], "Test").unwrap_err();
        assert_eq!(err, ActionError::hard("uuid required for Test."));

        let err = args.with("extra", 1).check(&["bucket", "key"], &[], "Test").unwrap_err();
        assert_eq!(err, ActionError::hard("Illegal argument (extra) for Test"));
    }

    #[test]
    fn test_typed_accessors() {
        let args = Arguments::try_from(json!({
            "start": 10,
            "end": "20",
            "ids": [1, 2, 3],
            "bad": [1, "x"]
        }))
        .unwrap();

        assert_eq!(args.require_i64("start", "T").unwrap(), 10);
        assert_eq!(args.require_i64("end", "T").unwrap(), 20);
        assert_eq!(args.require_i64_list("ids", "T").unwrap(), vec![1, 2, 3]);
        assert!(args.require_i64_list("bad", "T").is_err());
        assert!(args.require_str("start", "T").is_err());
        assert!(Arguments::try_from(json!([1])).is_err());
    }
}
