use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::QueryResult;

/// 上传文档的请求参数
#[derive(TryFromMultipart)]
pub struct AddDocumentsRequest {
    pub file: Vec<FieldData<Bytes>>,
}

/// 上传文档表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AddDocumentsForm {
    /// 上传的 PDF 文件，可以是多个文件
    #[schema(format = Binary, content_media_type = "application/pdf")]
    pub file: String,
}

/// 创建集合的参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCollectionRequest {
    /// 集合名称
    pub name: String,
}

/// 创建集合的结果
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateCollectionResponse {
    pub name: String,
    /// 是否新建了集合，集合已存在时为 false
    pub created: bool,
}

/// 搜索和问答的参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// 问题
    pub question: String,
    /// 检索的页面数量，范围为 1 到 5
    pub k: Option<usize>,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u64,
    /// 按相关度从高到低排列的页面
    pub results: Vec<QueryResult>,
}

/// 问答响应
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    /// 耗时，单位为毫秒
    pub time: u64,
    /// 检索到的页面，集合为空时为空列表
    pub results: Vec<QueryResult>,
    /// 生成的回答
    pub answer: Option<String>,
    /// 没有相关文档或回答生成失败时的说明
    pub message: Option<String>,
}
