//! Administration endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::SweepReport, AppState};

use super::AuthenticatedUser;

/// Lending statistics
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    /// Loans not yet returned
    pub active_loans: i64,
    /// Active loans past their due day
    pub overdue_loans: i64,
}

/// Lending statistics
#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loan counts", body = StatsResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<StatsResponse>> {
    claims.require_admin()?;

    Ok(Json(StatsResponse {
        active_loans: state.services.loans.count_active().await?,
        overdue_loans: state.services.loans.count_overdue().await?,
    }))
}

/// Run a reminder sweep now
#[utoipa::path(
    post,
    path = "/admin/reminders/run",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn run_reminders(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    claims.require_admin()?;

    tracing::info!(requested_by = claims.user_id, "Manual reminder sweep requested");
    let report = state.services.reminders.run_sweep().await;
    Ok(Json(report))
}
