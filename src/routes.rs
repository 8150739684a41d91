use crate::admin_handlers;
use crate::handlers::{self, AppState};
use crate::openapi::ApiDoc;
use crate::session;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type StateRouter = Router<Arc<AppState>>;

/// Full application router without rate limiting.
pub fn router(state: Arc<AppState>) -> Router {
    router_with(state, |routes| routes)
}

/// Full application router. `limit_writes` wraps the public write and chat
/// routes plus login, which is where `main` installs the rate limiter.
pub fn router_with<F>(state: Arc<AppState>, limit_writes: F) -> Router
where
    F: FnOnce(StateRouter) -> StateRouter,
{
    let max_upload = state.config.max_upload_bytes;
    let static_dir = state.config.static_dir.clone();

    let writes = Router::new()
        .route("/lead", post(handlers::create_lead))
        .route("/contact", post(handlers::create_contact))
        .route("/services", post(handlers::create_service_request))
        .route("/api/assistant", post(handlers::assistant))
        .route("/admin/login", post(session::login));

    let admin = Router::new()
        .route(
            "/listings",
            get(admin_handlers::list_listings).post(admin_handlers::save_listing),
        )
        .route(
            "/listings/:id",
            get(admin_handlers::get_listing).delete(admin_handlers::delete_listing),
        )
        .route("/photos/:id", delete(admin_handlers::delete_photo))
        .route("/photos/:id/cover", post(admin_handlers::set_cover))
        .route("/export", get(admin_handlers::export_listings))
        .route("/import", post(admin_handlers::import_listings))
        .route("/leads", get(admin_handlers::list_leads))
        .route("/services", get(admin_handlers::list_tickets))
        .route("/services/:id", post(admin_handlers::update_ticket))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_admin,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/listings", get(handlers::list_listings))
        .route("/listings/:id", get(handlers::get_listing))
        .route("/photos/:id", get(handlers::serve_photo))
        .route("/admin/logout", post(session::logout))
        .merge(limit_writes(writes))
        .nest("/admin", admin)
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(RequestBodyLimitLayer::new(max_upload))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
