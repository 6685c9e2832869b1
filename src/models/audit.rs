use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Modify,
    Confirm,
    Cancel,
    Payment,
    View,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Modify => "MODIFY",
            AuditAction::Confirm => "CONFIRM",
            AuditAction::Cancel => "CANCEL",
            AuditAction::Payment => "PAYMENT",
            AuditAction::View => "VIEW",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "MODIFY" => Ok(AuditAction::Modify),
            "CONFIRM" => Ok(AuditAction::Confirm),
            "CANCEL" => Ok(AuditAction::Cancel),
            "PAYMENT" => Ok(AuditAction::Payment),
            "VIEW" => Ok(AuditAction::View),
            other => Err(format!("unknown audit action '{}'", other)),
        }
    }
}

/// Who made the call and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), ..Default::default() }
    }

    pub fn system(component: &str) -> Self {
        Self::user(format!("system:{}", component))
    }
}

/// Append-only audit row. `hash` chains to the previous row of the same booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Option<String>,
    pub action: AuditAction,
    pub previous_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub changes: serde_json::Value,
    pub notes: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}
