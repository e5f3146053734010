//! Budget handlers

use crate::dto::{ApiResponse, BudgetResponse, SetLimitsRequest};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use dialer_core::AppError;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Current ledger with remaining amounts
///
/// GET /api/v1/budget
#[instrument(skip(state))]
pub async fn get_budget(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let ledger = state.budget.snapshot().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(BudgetResponse::from(ledger))))
}

/// Replace the daily and monthly limits
///
/// PUT /api/v1/budget/limits
#[instrument(skip(state))]
pub async fn set_limits(
    state: web::Data<AppState>,
    req: web::Json<SetLimitsRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Budget limits validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let ledger = state
        .budget
        .set_limits(req.daily_limit, req.monthly_limit)
        .await?;
    info!(daily = %req.daily_limit, monthly = %req.monthly_limit, "Budget limits updated");

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        BudgetResponse::from(ledger),
        "Limits updated",
    )))
}

/// Configure budget routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/budget")
            .route("", web::get().to(get_budget))
            .route("/limits", web::put().to(set_limits)),
    );
}
