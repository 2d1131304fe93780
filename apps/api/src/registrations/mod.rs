// Self-service registration: anyone may apply, a platform admin approves the
// request into a tenant or rejects it.

pub mod handlers;

use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::registration::{RegistrationRow, RegistrationStatus};
use crate::models::user::Role;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: RegistrationStatus,
    pub tenant_id: Option<Uuid>,
    pub role: Option<Role>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve { tenant_id: Uuid, role: Role },
    Reject,
}

impl ReviewRequest {
    /// Approval needs a target tenant; the new account defaults to `hr_user`.
    pub fn decision(&self) -> Result<Decision, AppError> {
        match self.status {
            RegistrationStatus::Approved => {
                let tenant_id = self.tenant_id.ok_or_else(|| {
                    AppError::Validation("tenant_id is required to approve a registration".to_string())
                })?;
                let role = match self.role.unwrap_or(Role::HrUser) {
                    Role::PlatformAdmin => {
                        return Err(AppError::Validation(
                            "Registrations can only become tenant_admin or hr_user".to_string(),
                        ))
                    }
                    role => role,
                };
                Ok(Decision::Approve { tenant_id, role })
            }
            RegistrationStatus::Rejected => Ok(Decision::Reject),
            RegistrationStatus::Pending => Err(AppError::Validation(
                "Review status must be approved or rejected".to_string(),
            )),
        }
    }

    pub fn notes(&self) -> Option<String> {
        self.review_notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

pub fn ensure_pending(request: &RegistrationRow) -> Result<(), AppError> {
    match request.status() {
        Some(RegistrationStatus::Pending) => Ok(()),
        _ => Err(AppError::Validation(format!(
            "Registration {} has already been reviewed ({})",
            request.id, request.status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn review(value: serde_json::Value) -> ReviewRequest {
        serde_json::from_value(value).unwrap()
    }

    fn request(status: RegistrationStatus) -> RegistrationRow {
        RegistrationRow {
            id: Uuid::new_v4(),
            email: "new@acme.test".into(),
            full_name: "New Hire".into(),
            password_hash: Some("$argon2id$...".into()),
            company: None,
            phone: None,
            application_reason: None,
            status: status.as_str().into(),
            tenant_id: None,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn approval_requires_a_tenant() {
        let err = review(json!({"status": "approved"})).decision().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let tenant_id = Uuid::new_v4();
        assert_eq!(
            review(json!({"status": "approved", "tenant_id": tenant_id})).decision().unwrap(),
            Decision::Approve {
                tenant_id,
                role: Role::HrUser
            }
        );
        assert_eq!(
            review(json!({"status": "approved", "tenant_id": tenant_id, "role": "tenant_admin"}))
                .decision()
                .unwrap(),
            Decision::Approve {
                tenant_id,
                role: Role::TenantAdmin
            }
        );
    }

    #[test]
    fn approval_cannot_grant_platform_admin() {
        let err = review(json!({
            "status": "approved", "tenant_id": Uuid::new_v4(), "role": "platform_admin"
        }))
        .decision()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn pending_is_not_a_review_outcome() {
        assert!(review(json!({"status": "pending"})).decision().is_err());
        assert_eq!(review(json!({"status": "rejected"})).decision().unwrap(), Decision::Reject);
    }

    #[test]
    fn blank_notes_are_dropped() {
        assert_eq!(review(json!({"status": "rejected", "review_notes": "  "})).notes(), None);
        assert_eq!(
            review(json!({"status": "rejected", "review_notes": " duplicate "})).notes().as_deref(),
            Some("duplicate")
        );
    }

    #[test]
    fn only_pending_requests_can_be_reviewed() {
        assert!(ensure_pending(&request(RegistrationStatus::Pending)).is_ok());
        assert!(ensure_pending(&request(RegistrationStatus::Approved)).is_err());
        assert!(ensure_pending(&request(RegistrationStatus::Rejected)).is_err());
    }
}
