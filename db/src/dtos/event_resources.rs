use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSecret {
    pub smtp_server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSecrets {
    #[serde(rename = "eventID")]
    pub event_id: Uuid,
    #[serde(default)]
    pub email: Option<EmailSecret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub id: Uuid,
    #[serde(rename = "eventID")]
    pub event_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub from: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default, rename = "isHTML")]
    pub is_html: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormAllowedSubmitter {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl FormAllowedSubmitter {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_submitter_expiry() {
        let now = Utc::now();
        let forever = FormAllowedSubmitter {
            email: "ada@example.com".to_string(),
            expires_at: None,
        };
        let expired = FormAllowedSubmitter {
            expires_at: Some(now - TimeDelta::hours(1)),
            ..forever.clone()
        };
        let pending = FormAllowedSubmitter {
            expires_at: Some(now + TimeDelta::hours(1)),
            ..forever.clone()
        };

        assert!(forever.is_active(now));
        assert!(!expired.is_active(now));
        assert!(pending.is_active(now));
    }
}
