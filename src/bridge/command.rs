//! Controller command protocol.
//!
//! An external controller talks to the guide with JSON objects tagged by
//! `"command"`:
//!
//! ```json
//! { "command": "executeAction", "moduleId": "studio", "actionId": "createDeck", "input": { "name": "Thoth" } }
//! { "command": "isModalOpen", "modalName": "any" }
//! ```
//!
//! Every command resolves to the same `{ success, data | error }` envelope,
//! so the controller can branch on `success` without special cases.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::GuideBridge;
use crate::error::GuideError;
use crate::types::InvocationResult;

/// A request from the external controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GuideCommand {
    DiscoverCapabilities,
    ExecuteAction {
        module_id: String,
        action_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    ExecuteQuery {
        module_id: String,
        query_id: String,
    },
    DiscoverElements {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module_id: Option<String>,
    },
    GetState,
    GetModuleState {
        module_key: String,
    },
    IsModalOpen {
        modal_name: String,
    },
    IsLoading,
    GetCurrentPage,
}

impl GuideCommand {
    /// Decode a command from its JSON form.
    pub fn from_json(value: Value) -> Result<Self, GuideError> {
        serde_json::from_value(value).map_err(|e| GuideError::InvalidCommand(e.to_string()))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DiscoverCapabilities => "discoverCapabilities",
            Self::ExecuteAction { .. } => "executeAction",
            Self::ExecuteQuery { .. } => "executeQuery",
            Self::DiscoverElements { .. } => "discoverElements",
            Self::GetState => "getState",
            Self::GetModuleState { .. } => "getModuleState",
            Self::IsModalOpen { .. } => "isModalOpen",
            Self::IsLoading => "isLoading",
            Self::GetCurrentPage => "getCurrentPage",
        }
    }

    pub(crate) async fn run(self, bridge: &GuideBridge) -> InvocationResult<Value> {
        let caps = bridge.capabilities();
        let state = bridge.state();
        match self {
            Self::DiscoverCapabilities => encode(&caps.discover_capabilities()),
            Self::ExecuteAction {
                module_id,
                action_id,
                input,
            } => caps.execute_action(&module_id, &action_id, input).await,
            Self::ExecuteQuery {
                module_id,
                query_id,
            } => caps.execute_query(&module_id, &query_id),
            Self::DiscoverElements { module_id } => {
                match caps.discover_elements(module_id.as_deref()) {
                    Ok(elements) => encode(&elements),
                    Err(err) => InvocationResult::Failure(err.to_string()),
                }
            }
            Self::GetState => InvocationResult::Success(state.get_state().to_json()),
            Self::GetModuleState { module_key } => InvocationResult::Success(
                state
                    .get_module_state(&module_key)
                    .map(|slice| Value::Object(slice.as_ref().clone()))
                    .unwrap_or(Value::Null),
            ),
            Self::IsModalOpen { modal_name } => {
                InvocationResult::Success(Value::Bool(state.is_modal_open(&modal_name)))
            }
            Self::IsLoading => InvocationResult::Success(Value::Bool(state.is_loading())),
            Self::GetCurrentPage => InvocationResult::Success(Value::String(state.get_current_page())),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> InvocationResult<Value> {
    match serde_json::to_value(value) {
        Ok(value) => InvocationResult::Success(value),
        Err(err) => InvocationResult::Failure(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_commands() {
        let cmd = GuideCommand::from_json(json!({
            "command": "executeAction",
            "moduleId": "studio",
            "actionId": "createDeck"
        }))
        .unwrap();
        assert_eq!(
            cmd,
            GuideCommand::ExecuteAction {
                module_id: "studio".into(),
                action_id: "createDeck".into(),
                input: None,
            }
        );

        let cmd = GuideCommand::from_json(json!({"command": "discoverElements"})).unwrap();
        assert_eq!(cmd, GuideCommand::DiscoverElements { module_id: None });
        assert_eq!(cmd.name(), "discoverElements");

        let cmd = GuideCommand::from_json(json!({"command": "isModalOpen", "modalName": "any"})).unwrap();
        assert_eq!(cmd, GuideCommand::IsModalOpen { modal_name: "any".into() });
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let err = GuideCommand::from_json(json!({"command": "rebootEverything"})).unwrap_err();
        assert!(matches!(err, GuideError::InvalidCommand(_)));

        let err = GuideCommand::from_json(json!({"command": "executeQuery", "moduleId": "x"})).unwrap_err();
        assert!(err.to_string().contains("queryId"));
    }

    #[test]
    fn test_encode_shape() {
        let cmd = GuideCommand::GetModuleState {
            module_key: "journal".into(),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"command": "getModuleState", "moduleKey": "journal"})
        );
    }
}
