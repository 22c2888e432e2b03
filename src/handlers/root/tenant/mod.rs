// handlers/root/tenant/mod.rs - Tenant administration (/api/root/tenant)

pub mod create;
pub mod list;
pub mod show;
pub mod status;
pub mod update;
pub mod usage;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantPath {
    slug: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list::list).post(create::create))
        .route(
            "/:slug",
            get(show::show)
                .patch(update::update)
                .put(status::restore)
                .delete(status::delete),
        )
        .route("/:slug/suspend", post(status::suspend))
        .route("/:slug/usage", get(usage::usage))
        .route("/:slug/recount", post(usage::recount))
}
