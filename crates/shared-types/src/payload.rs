//! Field access over a raw webhook object, reporting failures as
//! [`PayloadError`] against the topic being parsed.

use serde_json::{Map, Value};

use crate::errors::PayloadError;
use crate::topics::Topic;

pub(crate) struct Fields<'a> {
    topic: Topic,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(topic: Topic, payload: &'a Value) -> Result<Self, PayloadError> {
        let map = payload.as_object().ok_or_else(|| PayloadError::NotAnObject {
            topic: topic.to_string(),
        })?;
        Ok(Self { topic, map })
    }

    /// First present, non-null value among `names`.
    pub(crate) fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|name| self.map.get(*name))
            .find(|v| !v.is_null())
    }

    pub(crate) fn opt_str(&self, names: &[&str]) -> Result<Option<String>, PayloadError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(names[0], "expected a string")),
        }
    }

    pub(crate) fn required_str(&self, names: &[&str]) -> Result<String, PayloadError> {
        self.opt_str(names)?.ok_or_else(|| self.missing(names[0]))
    }

    /// Boolean that may also arrive as `"true"` / `"false"`.
    pub(crate) fn opt_bool(&self, names: &[&str]) -> Result<Option<bool>, PayloadError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(_) => Err(self.invalid(names[0], "expected a boolean")),
        }
    }

    pub(crate) fn missing(&self, field: &str) -> PayloadError {
        PayloadError::MissingField {
            topic: self.topic.to_string(),
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(&self, field: &str, reason: impl Into<String>) -> PayloadError {
        PayloadError::InvalidField {
            topic: self.topic.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
