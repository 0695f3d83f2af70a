/// API routes and handlers
pub mod account;
pub mod auth;
pub mod middleware;
pub mod password;
pub mod reputation;
pub mod verify;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(account::routes())
        .merge(password::routes())
        .merge(verify::routes())
        .merge(reputation::routes())
}
