//! Reference implementation of the remote storage service.

mod handlers;
pub mod middleware;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::store::SqliteStore;
pub use middleware::SecurityConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub security: SecurityConfig,
}

impl FromRef<AppState> for SqliteStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for SecurityConfig {
    fn from_ref(state: &AppState) -> Self {
        state.security.clone()
    }
}

pub fn create_router(store: SqliteStore, security: SecurityConfig) -> Router {
    let models = Router::new()
        .route("/models", get(handlers::list_documents))
        .route("/models/{purpose}", get(handlers::list_model_documents))
        .route(
            "/models/{purpose}/{kind}",
            get(handlers::get_payload)
                .put(handlers::put_payload)
                .delete(handlers::delete_payload),
        )
        .route_layer(from_fn_with_state(
            security.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::login))
        .merge(models);

    let cors = cors_layer(&security);
    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { store, security })
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) => CorsLayer::new()
            .allow_origin(
                origins
                    .iter()
                    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}
