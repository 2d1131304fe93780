use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    RuleType {
        Education => "education",
        Experience => "experience",
        Age => "age",
        Skill => "skill",
        Location => "location",
        Custom => "custom",
    }
}

text_enum! {
    LogicOperator {
        And => "AND",
        Or => "OR",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FilterRuleRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub rule_config: Value,
    pub logic_operator: String,
    pub priority: i32,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
