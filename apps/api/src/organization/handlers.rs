use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use uuid::Uuid;

use super::tree::{build_tree, recompute_paths, would_create_cycle, DepartmentNode};
use crate::auth::{AuthUser, TenantAdmin};
use crate::errors::AppError;
use crate::extractors::{Json, Path};
use crate::models::company::CompanyInfoRow;
use crate::models::department::DepartmentRow;
use crate::state::AppState;

/// Distinguishes an absent field from an explicit `null`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDepartmentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `null` moves the department to the root.
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub manager_id: Option<Option<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct DepartmentDetail {
    #[serde(flatten)]
    pub department: DepartmentRow,
    pub children_count: i64,
    pub jobs_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CompanyInfoRequest {
    pub name: String,
    pub industry: Option<String>,
    pub products: Option<String>,
    pub application_scenarios: Option<String>,
    pub company_culture: Option<String>,
    pub preferences: Option<String>,
    pub company_size: Option<String>,
    pub development_stage: Option<String>,
    pub business_model: Option<String>,
    pub core_values: Option<String>,
    pub recruitment_philosophy: Option<String>,
}

fn department_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::Validation(
            "Department name must be 1-100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

async fn fetch_department(
    state: &AppState,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<DepartmentRow, AppError> {
    sqlx::query_as::<_, DepartmentRow>("SELECT * FROM departments WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Department {id} not found")))
}

async fn ensure_manager_in_tenant(
    state: &AppState,
    tenant_id: Uuid,
    manager_id: Uuid,
) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND tenant_id = $2)",
    )
    .bind(manager_id)
    .bind(tenant_id)
    .fetch_one(&state.db)
    .await?;
    if !exists {
        return Err(AppError::Validation(format!(
            "Manager {manager_id} is not a member of this tenant"
        )));
    }
    Ok(())
}

async fn department_counts(
    state: &AppState,
    id: Uuid,
) -> Result<(i64, i64), AppError> {
    Ok(sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM departments WHERE parent_id = $1),
            (SELECT COUNT(*) FROM job_positions WHERE department_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?)
}

// ────────────────────────────────────────────────────────────────────────────
// Departments
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/organization/departments
pub async fn handle_department_tree(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DepartmentNode>>, AppError> {
    let tenant_id = user.tenant_id()?;

    let rows = sqlx::query_as::<_, DepartmentRow>("SELECT * FROM departments WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_all(&state.db)
        .await?;

    let job_counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT department_id, COUNT(*) FROM job_positions
        WHERE tenant_id = $1 AND department_id IS NOT NULL
        GROUP BY department_id
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .collect();

    Ok(Json(build_tree(rows, &job_counts)))
}

/// POST /api/v1/organization/departments
pub async fn handle_create_department(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Json(req): Json<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<DepartmentRow>), AppError> {
    let tenant_id = admin.tenant_id()?;
    let name = department_name(&req.name)?;

    let (level, path) = match req.parent_id {
        Some(parent_id) => {
            let parent = fetch_department(&state, tenant_id, parent_id)
                .await
                .map_err(|_| AppError::Validation(format!("Parent department {parent_id} not found")))?;
            (parent.level + 1, format!("{}{}{name}", parent.path, super::tree::PATH_SEPARATOR))
        }
        None => (1, name.clone()),
    };
    if let Some(manager_id) = req.manager_id {
        ensure_manager_in_tenant(&state, tenant_id, manager_id).await?;
    }

    let row = sqlx::query_as::<_, DepartmentRow>(
        r#"
        INSERT INTO departments (id, tenant_id, name, description, parent_id, manager_id, level, path)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(&name)
    .bind(req.description)
    .bind(req.parent_id)
    .bind(req.manager_id)
    .bind(level)
    .bind(&path)
    .fetch_one(&state.db)
    .await?;

    info!("Created department '{path}' in tenant {tenant_id}");
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/organization/departments/:id
pub async fn handle_get_department(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DepartmentDetail>, AppError> {
    let tenant_id = user.tenant_id()?;
    let department = fetch_department(&state, tenant_id, id).await?;
    let (children_count, jobs_count) = department_counts(&state, id).await?;
    Ok(Json(DepartmentDetail {
        department,
        children_count,
        jobs_count,
    }))
}

/// PUT /api/v1/organization/departments/:id
///
/// Name or parent changes rewrite `level` and `path` for the whole subtree
/// in the same transaction as the update itself.
pub async fn handle_update_department(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDepartmentRequest>,
) -> Result<Json<DepartmentRow>, AppError> {
    let tenant_id = admin.tenant_id()?;
    let name = req.name.as_deref().map(department_name).transpose()?;

    if let Some(Some(manager_id)) = req.manager_id {
        ensure_manager_in_tenant(&state, tenant_id, manager_id).await?;
    }

    let mut tx = state.db.begin().await?;
    let mut rows = sqlx::query_as::<_, DepartmentRow>(
        "SELECT * FROM departments WHERE tenant_id = $1 FOR UPDATE",
    )
    .bind(tenant_id)
    .fetch_all(&mut *tx)
    .await?;

    let current = rows
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Department {id} not found")))?;

    let structural = name.is_some() || req.parent_id.is_some();
    if let Some(name) = name {
        current.name = name;
    }
    if let Some(description) = req.description {
        current.description = Some(description);
    }
    if let Some(manager_id) = req.manager_id {
        current.manager_id = manager_id;
    }
    if let Some(parent_id) = req.parent_id {
        current.parent_id = parent_id;
    }
    let updated = current.clone();

    if let Some(parent_id) = updated.parent_id {
        if parent_id == id {
            return Err(AppError::Validation(
                "A department cannot be its own parent".to_string(),
            ));
        }
        if !rows.iter().any(|r| r.id == parent_id) {
            return Err(AppError::Validation(format!(
                "Parent department {parent_id} not found"
            )));
        }
        if would_create_cycle(&rows, id, Some(parent_id)) {
            return Err(AppError::Validation(
                "A department cannot be moved under its own descendant".to_string(),
            ));
        }
    }

    sqlx::query(
        r#"
        UPDATE departments
        SET name = $2, description = $3, parent_id = $4, manager_id = $5, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&updated.name)
    .bind(&updated.description)
    .bind(updated.parent_id)
    .bind(updated.manager_id)
    .execute(&mut *tx)
    .await?;

    if structural {
        let changes = recompute_paths(&rows, id);
        for (dept_id, level, path) in &changes {
            sqlx::query("UPDATE departments SET level = $2, path = $3, updated_at = NOW() WHERE id = $1")
                .bind(dept_id)
                .bind(level)
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        info!("Recomputed {} department paths under {id}", changes.len());
    }

    let row = sqlx::query_as::<_, DepartmentRow>("SELECT * FROM departments WHERE id = $1")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(row))
}

/// DELETE /api/v1/organization/departments/:id
pub async fn handle_delete_department(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = admin.tenant_id()?;
    fetch_department(&state, tenant_id, id).await?;

    let (children, jobs) = department_counts(&state, id).await?;
    if children > 0 {
        return Err(AppError::Validation(format!(
            "Department has {children} sub-departments; move or delete them first"
        )));
    }
    if jobs > 0 {
        return Err(AppError::Validation(format!(
            "Department has {jobs} job positions; reassign them first"
        )));
    }

    sqlx::query("DELETE FROM departments WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .execute(&state.db)
        .await?;

    info!("Deleted department {id} from tenant {tenant_id}");
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Company info
// ────────────────────────────────────────────────────────────────────────────

pub async fn fetch_company_info(
    db: &sqlx::PgPool,
    tenant_id: Uuid,
) -> Result<Option<CompanyInfoRow>, AppError> {
    Ok(
        sqlx::query_as::<_, CompanyInfoRow>("SELECT * FROM company_info WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(db)
            .await?,
    )
}

/// GET /api/v1/organization/company-info
pub async fn handle_get_company_info(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CompanyInfoRow>, AppError> {
    let tenant_id = user.tenant_id()?;
    fetch_company_info(&state.db, tenant_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Company info has not been set up".to_string()))
}

/// PUT /api/v1/organization/company-info
pub async fn handle_put_company_info(
    State(state): State<AppState>,
    TenantAdmin(admin): TenantAdmin,
    Json(req): Json<CompanyInfoRequest>,
) -> Result<Json<CompanyInfoRow>, AppError> {
    let tenant_id = admin.tenant_id()?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Company name is required".to_string()));
    }

    let row = sqlx::query_as::<_, CompanyInfoRow>(
        r#"
        INSERT INTO company_info (
            tenant_id, name, industry, products, application_scenarios, company_culture,
            preferences, company_size, development_stage, business_model, core_values,
            recruitment_philosophy
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (tenant_id) DO UPDATE SET
            name = EXCLUDED.name,
            industry = EXCLUDED.industry,
            products = EXCLUDED.products,
            application_scenarios = EXCLUDED.application_scenarios,
            company_culture = EXCLUDED.company_culture,
            preferences = EXCLUDED.preferences,
            company_size = EXCLUDED.company_size,
            development_stage = EXCLUDED.development_stage,
            business_model = EXCLUDED.business_model,
            core_values = EXCLUDED.core_values,
            recruitment_philosophy = EXCLUDED.recruitment_philosophy,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(name)
    .bind(req.industry)
    .bind(req.products)
    .bind(req.application_scenarios)
    .bind(req.company_culture)
    .bind(req.preferences)
    .bind(req.company_size)
    .bind(req.development_stage)
    .bind(req.business_model)
    .bind(req.core_values)
    .bind(req.recruitment_philosophy)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_null_parent_are_distinct() {
        let absent: UpdateDepartmentRequest = serde_json::from_str(r#"{"name": "Ops"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let null: UpdateDepartmentRequest = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(null.parent_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateDepartmentRequest =
            serde_json::from_str(&format!(r#"{{"parent_id": "{id}"}}"#)).unwrap();
        assert_eq!(set.parent_id, Some(Some(id)));
    }

    #[test]
    fn department_names_are_trimmed_and_bounded() {
        assert_eq!(department_name("  R&D ").unwrap(), "R&D");
        assert!(department_name("   ").is_err());
        assert!(department_name(&"x".repeat(101)).is_err());
    }
}
