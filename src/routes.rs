// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{admin, analytics, auth, enrollment, interaction, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Nests the per-audience routers (auth, courses, interactions, analytics, admin).
/// * Serves uploaded media from the static directory under `/static`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let course_routes = Router::new()
        .route("/{course_id}/join", post(enrollment::join_course))
        .route("/{course_id}/submissions", post(quiz::submit_quiz))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let interaction_routes = Router::new()
        .route("/", post(interaction::record_interaction))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let analytics_routes = Router::new()
        .route("/{course_id}/stats", get(analytics::learner_stats))
        .route("/{course_id}/time_series", get(analytics::learner_time_series))
        .route("/{course_id}/efficiency_plot", get(analytics::learner_efficiency_plot))
        .route("/{course_id}/nasa_radar", get(analytics::nasa_radar))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/stats", get(admin::stats))
        .route("/courses/{course_id}/attempts", get(admin::list_attempts))
        .route("/efficiency_analysis", get(admin::efficiency_analysis))
        .route("/efficiency_plot", get(admin::efficiency_plot))
        .route("/user_efficiency_plot", get(admin::user_efficiency_plot))
        .route("/engagement_analysis", get(admin::engagement_analysis))
        .route("/engagement_plot", get(admin::engagement_plot))
        .route("/image_analytics", get(admin::image_analytics))
        .route("/time_series", get(admin::admin_time_series))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/interactions", interaction_routes)
        .nest("/api/analytics", analytics_routes)
        .nest("/api/admin", admin_routes)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
