//! Notification channel messages.
//!
//! Messages use the swss wire form: a JSON array of strings
//! `[op, data, field1, value1, ...]`.

use serde_json::Value;
use thiserror::Error;

use crate::FieldValue;

/// Errors decoding a notification message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Notification is not valid JSON: {0}")]
    Json(String),

    #[error("Malformed notification: {0}")]
    Malformed(String),
}

/// A message received on a notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub op: String,
    pub data: String,
    pub values: Vec<FieldValue>,
}

impl Notification {
    pub fn new(op: impl Into<String>, data: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Self {
            op: op.into(),
            data: data.into(),
            values,
        }
    }

    /// Decodes the swss JSON array form.
    pub fn from_json(payload: &str) -> Result<Self, NotificationError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| NotificationError::Json(e.to_string()))?;

        let items = value
            .as_array()
            .ok_or_else(|| NotificationError::Malformed("expected a JSON array".to_string()))?;

        let strings = items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    NotificationError::Malformed(format!("non-string element {}", item))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if strings.len() < 2 {
            return Err(NotificationError::Malformed(
                "expected at least op and data".to_string(),
            ));
        }
        if strings.len() % 2 != 0 {
            return Err(NotificationError::Malformed(
                "dangling field without value".to_string(),
            ));
        }

        let mut iter = strings.into_iter();
        let op = iter.next().unwrap_or_default();
        let data = iter.next().unwrap_or_default();
        let mut values = Vec::new();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            values.push((field, value));
        }

        Ok(Self { op, data, values })
    }

    /// Encodes to the swss JSON array form.
    pub fn to_json(&self) -> String {
        let mut items = vec![Value::from(self.op.as_str()), Value::from(self.data.as_str())];
        for (field, value) in &self.values {
            items.push(Value::from(field.as_str()));
            items.push(Value::from(value.as_str()));
        }
        Value::Array(items).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_storm_notification() {
        let n = Notification::from_json(r#"["oid:0x15000000000a1","storm"]"#).unwrap();
        assert_eq!(n.op, "oid:0x15000000000a1");
        assert_eq!(n.data, "storm");
        assert!(n.values.is_empty());
    }

    #[test]
    fn test_decode_with_values() {
        let n = Notification::from_json(r#"["oid:0x1","restore","reason","timer"]"#).unwrap();
        assert_eq!(n.values, vec![("reason".to_string(), "timer".to_string())]);
        assert_eq!(Notification::from_json(&n.to_json()).unwrap(), n);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            Notification::from_json("not json"),
            Err(NotificationError::Json(_))
        ));
        assert!(matches!(
            Notification::from_json(r#"{"op":"x"}"#),
            Err(NotificationError::Malformed(_))
        ));
        assert!(matches!(
            Notification::from_json(r#"["only-op"]"#),
            Err(NotificationError::Malformed(_))
        ));
        assert!(matches!(
            Notification::from_json(r#"["a","b","dangling"]"#),
            Err(NotificationError::Malformed(_))
        ));
        assert!(matches!(
            Notification::from_json(r#"["a",1]"#),
            Err(NotificationError::Malformed(_))
        ));
    }
}
