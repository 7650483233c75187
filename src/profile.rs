//! Defines user records as read from storage, and the decision of
//! whether a record qualifies as a provider profile.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

/// The role value that qualifies a user as a provider.
pub const PROVIDER_ROLE: &str = "tailor";

/// The fields a provider record must carry, in the order they're
/// reported when missing.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "location",
    "services",
    "experience",
    "rating",
    "status",
    "name",
    "email",
];

/// The role tag of a user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Tailor,
    Other(String),
    /// Either absent or not a string.
    Missing,
}

impl Role {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(role)) if role == PROVIDER_ROLE => Role::Tailor,
            Some(Value::String(role)) => Role::Other(role.clone()),
            _ => Role::Missing,
        }
    }
}

/// A user record: the full set of fields stored for a user. Fields
/// other than the role are opaque, and are copied verbatim into the
/// provider profile.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord(Map<String, Value>);

impl UserRecord {
    /// Parse a user record from a JSON document. The document must be
    /// an object.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Self::try_from(serde_json::from_slice::<Value>(body)?)
    }

    pub fn role(&self) -> Role {
        Role::from_value(self.0.get("role"))
    }

    /// Whether the given field is present. A field is present when
    /// its value is truthy: `null`, `false`, `0` and the empty
    /// string count as missing, while arrays and objects are present
    /// even when empty.
    pub fn has(&self, field: &str) -> bool {
        self.0.get(field).map(is_truthy).unwrap_or(false)
    }

    /// The required fields that are missing from this record.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !self.has(field))
            .collect()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(UserRecord(fields)),
            other => Err(anyhow!(
                "expected a JSON object as user record, got {}",
                kind(&other)
            )),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// What has to happen to the provider profile of a user after a
/// write to their record.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Create or replace the profile with the record.
    Upsert(UserRecord),
    /// Remove the profile, if any.
    Remove,
    /// Leave the profile as it is.
    Skip { missing: Vec<&'static str> },
}

/// Decide the fate of a provider profile given the post-write state
/// of the user record, or `None` if the record was deleted.
pub fn decide(record: Option<UserRecord>) -> Decision {
    let record = match record {
        Some(record) if record.role() == Role::Tailor => record,
        _ => return Decision::Remove,
    };
    let missing = record.missing_fields();
    if missing.is_empty() {
        Decision::Upsert(record)
    } else {
        Decision::Skip { missing }
    }
}
