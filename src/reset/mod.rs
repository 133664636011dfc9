use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod ledger;
pub mod repo;

pub use ledger::{spawn_sweeper, ResetLedger};

pub fn router() -> Router<AppState> {
    handlers::reset_routes()
}
