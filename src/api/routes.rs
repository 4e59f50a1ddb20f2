use crate::api::handlers::{chat, health, memory};
use crate::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// OpenAPI description of the HTTP API.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::root,
        health::health,
        chat::chat,
        memory::add_memory,
        memory::search_memory,
        memory::delete_memory,
    ),
    components(schemas(
        crate::types::ChatRequest,
        crate::types::ChatResponse,
        crate::types::MemoryAddRequest,
        crate::types::MemoryAddResponse,
        crate::types::MemorySearchRequest,
        crate::types::MessageResponse,
        crate::memory::DecisionResponse,
        crate::memory::MemoryItem,
        crate::memory::RetrievalHit,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "chat", description = "Memory-grounded chat"),
        (name = "memory", description = "Per-user memory")
    )
)]
pub struct ApiDoc;

/// Application routes without middleware.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/chat", post(chat::chat))
        .route("/memory/add", post(memory::add_memory))
        .route("/memory/search", post(memory::search_memory))
        .route("/memory/{user_id}", delete(memory::delete_memory))
}

/// Full application: routes, state, tracing, CORS and body limit.
pub fn build_app(state: AppState) -> Router {
    let router = create_router();

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the application until ctrl-c.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
            }
        })
        .await
}
