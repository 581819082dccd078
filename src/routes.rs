use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Data namespace routes
pub fn data_routes() -> Router<AppState> {
    let data = || {
        get(handlers::get_data)
            .post(handlers::post_data)
            .delete(handlers::delete_data)
    };

    Router::new()
        // Root collection
        .route("/data/", data())
        // Everything below it
        .route("/data/{*path}", data())
}

/// Service routes
pub fn service_routes() -> Router<AppState> {
    Router::new()
        .route("/service/apps", get(handlers::get_apps))
        .route("/service/shutdown", post(handlers::shutdown))
}

/// Build the complete router for one server instance
pub fn app_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.app_dir);

    let mut router = Router::new()
        .merge(data_routes())
        .merge(service_routes())
        .nest_service("/app", static_files)
        .fallback(handlers::redirect_to_app)
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(TraceLayer::new_for_http());

    if state.config.cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router.with_state(state)
}
