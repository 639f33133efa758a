use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Discriminator shared by configured actions and their wire messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    SendEmail,
    AllowFormAccess,
    Webhook,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [
        ActionType::SendEmail,
        ActionType::AllowFormAccess,
        ActionType::Webhook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::SendEmail => "SendEmail",
            ActionType::AllowFormAccess => "AllowFormAccess",
            ActionType::Webhook => "Webhook",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported action type: {0}")]
pub struct UnsupportedActionType(pub String);

impl FromStr for ActionType {
    type Err = UnsupportedActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action_type| action_type.as_str() == s)
            .ok_or_else(|| UnsupportedActionType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    SendEmail {
        #[serde(rename = "emailTemplateID")]
        email_template_id: Uuid,
        #[serde(rename = "emailFieldID")]
        email_field_id: String,
    },
    AllowFormAccess {
        #[serde(rename = "toFormID")]
        to_form_id: Uuid,
        #[serde(rename = "emailFieldID")]
        email_field_id: String,
        #[serde(
            rename = "expiresInHours",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        expires_in_hours: Option<u32>,
    },
    Webhook {
        url: String,
        method: HttpMethod,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::SendEmail { .. } => ActionType::SendEmail,
            ActionKind::AllowFormAccess { .. } => ActionType::AllowFormAccess,
            ActionKind::Webhook { .. } => ActionType::Webhook,
        }
    }
}

/// One step of a pipeline. The `id` is assigned once and run tracking
/// correlates on it, never on the action's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineAction {
    #[serde(default)]
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl PipelineAction {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }
}

#[derive(Debug, Error)]
pub enum ActionDecodeError {
    #[error("actions must be a list")]
    NotAList,
    #[error("action {0} does not declare a type")]
    MissingType(usize),
    #[error(transparent)]
    UnsupportedActionType(#[from] UnsupportedActionType),
    #[error("malformed action: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes a stored action list, checking each declared `type` before the
/// payload so an unknown kind is reported as such rather than as bad JSON.
pub fn decode_actions(value: Value) -> Result<Vec<PipelineAction>, ActionDecodeError> {
    let Value::Array(items) = value else {
        return Err(ActionDecodeError::NotAList);
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let declared = item
                .get("type")
                .and_then(Value::as_str)
                .ok_or(ActionDecodeError::MissingType(index))?;
            declared.parse::<ActionType>()?;

            Ok(serde_json::from_value(item)?)
        })
        .collect()
}
