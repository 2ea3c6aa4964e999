//! Shared contract types used by both registries and the bridge.
//!
//! - [`InvocationResult`] is the `{ success, data | error }` envelope that
//!   every action, query and controller command resolves to.
//! - [`FlagPath`] names a boolean inside a module's state slice and is how
//!   features declare their modal and loading flags.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::GuideError;

// ---------------------------------------------------------------------------
// InvocationResult
// ---------------------------------------------------------------------------

/// Outcome of invoking an action, query or controller command.
///
/// Serializes as `{ "success": true, "data": ... }` or
/// `{ "success": false, "error": "..." }`.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult<T = Value> {
    /// The call completed and produced `data`.
    Success(T),
    /// The call failed; the string is reported to the controller verbatim.
    Failure(String),
}

/// Result of [`CapabilityRegistry::execute_action`](crate::capabilities::CapabilityRegistry::execute_action).
pub type ActionResult = InvocationResult<Value>;

/// Result of [`CapabilityRegistry::execute_query`](crate::capabilities::CapabilityRegistry::execute_query).
pub type QueryResult<T = Value> = InvocationResult<T>;

impl<T> InvocationResult<T> {
    /// Build a failure result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(error.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success payload, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }
}

impl<T: Serialize> InvocationResult<T> {
    /// Encode as a JSON value. Payloads that cannot be encoded become a
    /// failure envelope.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({ "success": false, "error": err.to_string() })
        })
    }
}

impl<T: Serialize> Serialize for InvocationResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InvocationResult", 2)?;
        match self {
            Self::Success(data) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
            }
            Self::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RawInvocationResult<T> {
    success: bool,
    #[serde(default, deserialize_with = "present")]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// `Some` whenever the field is present, even when it holds `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for InvocationResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawInvocationResult::<T>::deserialize(deserializer)?;
        match (raw.success, raw.data) {
            (true, Some(data)) => Ok(Self::Success(data)),
            (true, None) => Err(serde::de::Error::missing_field("data")),
            (false, _) => Ok(Self::Failure(
                raw.error.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FlagPath
// ---------------------------------------------------------------------------

/// Dotted path to a boolean inside a module state slice.
///
/// `studio.tarot.isCreateModalOpen` reads key `tarot` of module `studio`,
/// then key `isCreateModalOpen` of that object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlagPath {
    module: String,
    keys: Vec<String>,
}

impl FlagPath {
    /// Build a path from a module key and the keys to walk inside its slice.
    pub fn new<I, S>(module: impl Into<String>, keys: I) -> Result<Self, GuideError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = module.into();
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if module.is_empty() || keys.is_empty() || keys.iter().any(String::is_empty) {
            let rendered = std::iter::once(module.as_str())
                .chain(keys.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(".");
            return Err(GuideError::InvalidFlagPath(rendered));
        }
        Ok(Self { module, keys })
    }

    /// Module key the path starts from.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Keys walked inside the module slice.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Read the flag from a module slice. Missing keys and non-boolean
    /// values read as `false`.
    pub fn read(&self, slice: &Map<String, Value>) -> bool {
        let (first, rest) = match self.keys.split_first() {
            Some(split) => split,
            None => return false,
        };
        let mut current = match slice.get(first) {
            Some(value) => value,
            None => return false,
        };
        for key in rest {
            current = match current.get(key) {
                Some(value) => value,
                None => return false,
            };
        }
        current.as_bool().unwrap_or(false)
    }
}

impl FromStr for FlagPath {
    type Err = GuideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let module = parts.next().unwrap_or_default();
        let keys: Vec<&str> = parts.collect();
        if keys.is_empty() {
            return Err(GuideError::InvalidFlagPath(s.to_string()));
        }
        Self::new(module, keys).map_err(|_| GuideError::InvalidFlagPath(s.to_string()))
    }
}

impl fmt::Display for FlagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module)?;
        for key in &self.keys {
            write!(f, ".{}", key)?;
        }
        Ok(())
    }
}

impl Serialize for FlagPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FlagPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_serializes_success_shape() {
        let result: ActionResult = InvocationResult::Success(json!({"saved": true}));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "data": {"saved": true}})
        );
    }

    #[test]
    fn test_result_serializes_failure_shape() {
        let result: ActionResult = InvocationResult::failure("boom");
        assert_eq!(result.to_json(), json!({"success": false, "error": "boom"}));
        assert_eq!(result.error(), Some("boom"));
        assert!(result.data().is_none());
    }

    #[test]
    fn test_result_deserializes_from_envelope() {
        let ok: QueryResult<u32> = serde_json::from_value(json!({"success": true, "data": 3})).unwrap();
        assert_eq!(ok, InvocationResult::Success(3));

        let err: QueryResult<u32> =
            serde_json::from_value(json!({"success": false, "error": "nope"})).unwrap();
        assert_eq!(err.error(), Some("nope"));
    }

    #[test]
    fn test_null_payload_survives_json() {
        let result: ActionResult = InvocationResult::Success(Value::Null);
        let encoded = result.to_json();
        assert_eq!(encoded, json!({"success": true, "data": null}));

        let decoded: ActionResult = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, InvocationResult::Success(Value::Null));

        let absent: Result<ActionResult, _> = serde_json::from_value(json!({"success": true}));
        assert!(absent.is_err());
    }

    #[test]
    fn test_flag_path_parse_and_display() {
        let path: FlagPath = "studio.tarot.isCreateModalOpen".parse().unwrap();
        assert_eq!(path.module(), "studio");
        assert_eq!(path.keys(), &["tarot".to_string(), "isCreateModalOpen".to_string()]);
        assert_eq!(path.to_string(), "studio.tarot.isCreateModalOpen");
    }

    #[test]
    fn test_flag_path_rejects_bare_module() {
        assert!("birthChart".parse::<FlagPath>().is_err());
        assert!("birthChart..isOpen".parse::<FlagPath>().is_err());
        assert!("".parse::<FlagPath>().is_err());
    }

    #[test]
    fn test_flag_path_reads_nested_booleans() {
        let path: FlagPath = "studio.tarot.isCreateModalOpen".parse().unwrap();
        let slice = json!({"tarot": {"isCreateModalOpen": true}});
        assert!(path.read(slice.as_object().unwrap()));

        let missing = json!({"tarot": {}});
        assert!(!path.read(missing.as_object().unwrap()));

        let not_bool = json!({"tarot": {"isCreateModalOpen": "yes"}});
        assert!(!path.read(not_bool.as_object().unwrap()));
    }
}
