mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::list_collections_handler,
        api::create_collection_handler,
        api::add_documents_handler,
        api::search_handler,
        api::ask_handler,
        api::metrics_handler,
    ),
    components(schemas(types::AddDocumentsForm, types::QueryRequest))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/collections",
            get(api::list_collections_handler).post(api::create_collection_handler),
        )
        .route("/collections/{name}/documents", post(api::add_documents_handler))
        .route("/collections/{name}/search", post(api::search_handler))
        .route("/collections/{name}/ask", post(api::ask_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：50M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 50))
        .with_state(state)
}
