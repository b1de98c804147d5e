use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::form::{DashboardSummary, FormCategory, FormHierarchy},
    models::session::UserContext,
    state::AppState,
};

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub removed: u64,
}

/// Lists the caller's tenant categories.
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Vec<FormCategory>>> {
    let forms = state.forms.clone();
    let tenant_id = user.tenant_id;
    let categories = state
        .domain_cache
        .form_categories(tenant_id, || async move { forms.list_categories(tenant_id).await })
        .await?;
    Ok(Json(categories))
}

/// One category with its forms.
pub async fn category_hierarchy(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(category_id): Path<Uuid>,
) -> Result<Json<FormHierarchy>> {
    let forms = state.forms.clone();
    let tenant_id = user.tenant_id;
    let hierarchy = state
        .domain_cache
        .form_hierarchy(tenant_id, category_id, || async move {
            forms
                .find_hierarchy(tenant_id, category_id)
                .await?
                .ok_or(AppError::NotFound)
        })
        .await?;
    Ok(Json(hierarchy))
}

/// The caller's dashboard figures.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<DashboardSummary>> {
    let forms = state.forms.clone();
    let sessions = state.sessions.clone();
    let UserContext { tenant_id, user_id, .. } = user;
    let summary = state
        .domain_cache
        .dashboard(tenant_id, user_id, || async move {
            let categories = forms.list_categories(tenant_id).await?;
            let published_forms = forms.count_published_forms(tenant_id).await?;
            let active_sessions = sessions.get_user_sessions(user_id).await?;
            Ok::<_, AppError>(DashboardSummary {
                form_categories: categories.len() as u64,
                published_forms,
                active_sessions: active_sessions.len() as u64,
            })
        })
        .await?;
    Ok(Json(summary))
}

/// Drops the cached forms and dashboards of the caller's tenant.
pub async fn invalidate_form_cache(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> Json<InvalidateResponse> {
    let removed = state.domain_cache.invalidate_forms(user.tenant_id).await
        + state.domain_cache.invalidate_dashboards(user.tenant_id).await;
    Json(InvalidateResponse { removed })
}
