use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Auth endpoints (mixed: some public, some protected)
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        // Quiz works anonymously; the points commit alone requires identity
        .nest("/api/v1/quiz", quiz_routes(app_state.clone()))
        // Rewards, activity and pickups require JWT
        .nest(
            "/api/v1/rewards",
            rewards_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/activity",
            activity_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/v1/pickups",
            pickups_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        // Assistant chat is public; sessions are anonymous server-minted ids
        .nest(
            "/api/v1/chat",
            chat_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::rate_limit::rate_limit_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // The commit endpoint needs a verified identity; everything else accepts
    // an optional token so anonymous players can take the quiz.
    let commit_route = Router::new()
        .route("/{id}/points", post(handlers::quiz::commit_points))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    Router::new()
        .route("/", post(handlers::quiz::start_quiz))
        .route("/{id}", get(handlers::quiz::get_quiz))
        .route("/{id}/answers", post(handlers::quiz::submit_answer))
        .route("/{id}/advance", post(handlers::quiz::advance))
        .route("/{id}/retreat", post(handlers::quiz::retreat))
        .route("/{id}/restart", post(handlers::quiz::restart))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::optional_auth_middleware,
        ))
        .merge(commit_route)
        .layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::rate_limit_middleware,
        ))
}

fn rewards_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/points", get(handlers::rewards::get_points))
        .route("/stream", get(handlers::rewards::points_stream))
}

fn activity_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new().route("/", get(handlers::rewards::list_activities))
}

fn pickups_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::pickups::list_pickups).post(handlers::pickups::schedule_pickup),
        )
        .route("/options", get(handlers::pickups::pickup_options))
        .route("/{id}/cancel", post(handlers::pickups::cancel_pickup))
}

fn chat_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", post(handlers::chat::send_message))
        .route(
            "/{session_id}",
            get(handlers::chat::history).delete(handlers::chat::reset),
        )
}

fn auth_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // Public routes with rate limiting
    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let public_routes = register_route.merge(login_route);

    // Protected routes (require JWT auth)
    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}
