use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use axum::Json;
use axum::extract::{Path, State};
use axum_auth::AuthBearer;
use axum_typed_multipart::TypedMultipart;
use indicatif::ProgressBar;
use log::info;
use tempfile::NamedTempFile;
use tokio::task::block_in_place;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::pipeline::{AbortFlag, BatchReport, PdfFile, QueryOutcome};
use crate::store::CollectionInfo;

/// 列出所有集合
#[utoipa::path(
    get,
    path = "/collections",
    responses(
        (status = 200, body = Vec<CollectionInfo>),
    )
)]
pub async fn list_collections_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CollectionInfo>>> {
    let store = state.pipeline.store();
    let mut collections = vec![];
    for name in store.list_collections().await? {
        collections.push(store.collection_info(&name).await?);
    }
    Ok(Json(collections))
}

/// 创建集合，已存在时什么也不做
#[utoipa::path(
    post,
    path = "/collections",
    request_body = CreateCollectionRequest,
    responses(
        (status = 200, body = CreateCollectionResponse),
    )
)]
pub async fn create_collection_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<CreateCollectionRequest>,
) -> Result<Json<CreateCollectionResponse>> {
    state.check_token(&token)?;
    let created = state.pipeline.store().create_collection(&data.name).await?;
    Ok(Json(CreateCollectionResponse { name: data.name, created }))
}

/// 上传 PDF 并逐页添加到集合
#[utoipa::path(
    post,
    path = "/collections/{name}/documents",
    params(("name" = String, Path, description = "集合名称")),
    request_body(content = AddDocumentsForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = BatchReport),
    )
)]
pub async fn add_documents_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Path(name): Path<String>,
    data: TypedMultipart<AddDocumentsRequest>,
) -> Result<Json<BatchReport>> {
    state.check_token(&token)?;

    // NOTE: 临时文件需要在入库完成前一直保留
    let mut temp_files = vec![];
    let mut files = vec![];
    for file in &data.file {
        let filename = match &file.metadata.file_name {
            Some(filename) => filename.clone(),
            None => {
                return Err(anyhow!("文件名不能为空").into());
            }
        };
        let temp = block_in_place(|| -> std::io::Result<NamedTempFile> {
            let mut temp = tempfile::Builder::new().suffix(".pdf").tempfile()?;
            temp.write_all(&file.contents)?;
            temp.flush()?;
            Ok(temp)
        })?;
        files.push(PdfFile::new(temp.path(), filename));
        temp_files.push(temp);
    }

    info!("上传了 {} 个文件到集合 {}", files.len(), name);

    let report = state
        .pipeline
        .ingest_batch(&name, &files, &AbortFlag::new(), &ProgressBar::hidden())
        .await?;

    Ok(Json(report))
}

/// 搜索与问题最相关的页面
#[utoipa::path(
    post,
    path = "/collections/{name}/search",
    params(("name" = String, Path, description = "集合名称")),
    request_body = QueryRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Path(name): Path<String>,
    Json(data): Json<QueryRequest>,
) -> Result<Json<SearchResponse>> {
    state.check_token(&token)?;
    let start = Instant::now();
    let k = data.k.unwrap_or(state.default_k);
    let results = state.pipeline.search(&name, &data.question, k).await?;
    Ok(Json(SearchResponse { time: start.elapsed().as_millis() as u64, results }))
}

/// 检索相关页面并生成回答
#[utoipa::path(
    post,
    path = "/collections/{name}/ask",
    params(("name" = String, Path, description = "集合名称")),
    request_body = QueryRequest,
    responses(
        (status = 200, body = AskResponse),
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Path(name): Path<String>,
    Json(data): Json<QueryRequest>,
) -> Result<Json<AskResponse>> {
    state.check_token(&token)?;
    let start = Instant::now();
    let k = data.k.unwrap_or(state.default_k);
    let response = match state.pipeline.query(&name, &data.question, k).await? {
        QueryOutcome::NoRelevantDocuments => AskResponse {
            time: start.elapsed().as_millis() as u64,
            results: vec![],
            answer: None,
            message: Some("没有找到相关文档".to_string()),
        },
        QueryOutcome::Answered { results, answer } => {
            let (answer, message) = match answer {
                Ok(answer) => (Some(answer), None),
                Err(err) => (None, Some(err.to_string())),
            };
            AskResponse { time: start.elapsed().as_millis() as u64, results, answer, message }
        }
    };
    Ok(Json(response))
}

/// 导出 prometheus 指标
#[utoipa::path(get, path = "/metrics")]
pub async fn metrics_handler() -> String {
    metrics::gather_text()
}
