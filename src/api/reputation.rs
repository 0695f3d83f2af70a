/// Reputation standing endpoint
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::{CoreError, CoreResult},
    reputation::{PeriodFilter, Standing},
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

/// Build reputation routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/reputation/:profile_id", get(standing))
}

#[derive(Debug, Deserialize)]
struct StandingQuery {
    period: Option<String>,
    page: Option<i64>,
}

/// Reputation standing for a profile: owner-only
async fn standing(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(profile_id): Path<i64>,
    Query(query): Query<StandingQuery>,
) -> CoreResult<Json<Standing>> {
    if auth.identity_id != profile_id {
        return Err(CoreError::Forbidden(
            "You are not authorized to view this reputation page".to_string(),
        ));
    }

    let period = PeriodFilter::parse(query.period.as_deref());
    let page = query.page.unwrap_or(1);

    let standing = ctx.reputation.compute_standing(profile_id, period, page).await?;

    Ok(Json(standing))
}
