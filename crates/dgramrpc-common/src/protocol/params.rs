//! Typed access to RPC parameters
//!
//! Parameters travel as a JSON object mapping names to dynamically-typed
//! values. On the Rust side they are held as [`Params`], a map of tagged
//! [`Value`]s, and every handler pulls out what it needs through the
//! type-checked accessors below instead of casting.
//!
//! # Type Mapping
//!
//! | JSON Type | Accessor |
//! |-----------|----------|
//! | number | [`Params::number`] |
//! | string | [`Params::string`] |
//! | boolean | [`Params::boolean`] |
//! | object | [`Params::object`] |
//! | anything | [`Params::get`] |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Map;

use super::error::{ParamError, RpcError};

/// Tagged parameter value (number, string, boolean, nested mapping, array or null).
pub type Value = serde_json::Value;

/// Name → value mapping carried in a request's `params` field.
///
/// An absent or `null` params field decodes as the empty mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Adds a parameter, builder style.
    ///
    /// # Example
    ///
    /// ```
    /// use dgramrpc_common::Params;
    ///
    /// let params = Params::new().with("a", 5).with("b", 7);
    /// assert_eq!(params.number("a").unwrap(), 5.0);
    /// ```
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Inserts a parameter, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Raw access to a parameter; `None` when absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Extracts a numeric parameter.
    ///
    /// # Errors
    ///
    /// [`ParamError::Missing`] if absent, [`ParamError::WrongType`] if present
    /// but not a JSON number.
    pub fn number(&self, name: &str) -> Result<f64, ParamError> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| wrong_type(name, "a number"))
    }

    /// Extracts a string parameter.
    pub fn string(&self, name: &str) -> Result<&str, ParamError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| wrong_type(name, "a string"))
    }

    /// Extracts a boolean parameter.
    pub fn boolean(&self, name: &str) -> Result<bool, ParamError> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| wrong_type(name, "a boolean"))
    }

    /// Extracts a nested mapping parameter.
    pub fn object(&self, name: &str) -> Result<&Map<String, Value>, ParamError> {
        self.require(name)?
            .as_object()
            .ok_or_else(|| wrong_type(name, "an object"))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Converts the map back into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn require(&self, name: &str) -> Result<&Value, ParamError> {
        match self.0.get(name) {
            Some(Value::Null) | None => Err(ParamError::Missing(name.to_string())),
            Some(value) => Ok(value),
        }
    }

    /// Deserializes a params field, mapping `null` to the empty map.
    pub(crate) fn deserialize_nullable<'de, D>(deserializer: D) -> Result<Params, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Params>::deserialize(deserializer)?.unwrap_or_default())
    }
}

fn wrong_type(name: &str, expected: &'static str) -> ParamError {
    ParamError::WrongType {
        name: name.to_string(),
        expected,
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Params {
    type Error = RpcError;

    /// Accepts a JSON object or `null`; anything else is a validation error.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(RpcError::Validation(format!(
                "params must be a JSON object, got {}",
                other
            ))),
        }
    }
}
