use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// 嵌入向量格式错误，属于集成问题，不应重试
    #[error("无效的多向量嵌入: {0}")]
    InvalidEmbedding(String),
    #[error("集合不存在: {0}")]
    CollectionNotFound(String),
    #[error("无效的集合名称: {0:?}")]
    InvalidCollectionName(String),
    /// 同一个集合内的向量维度必须一致，维度不一致说明嵌入模型配置错误
    #[error("集合 {collection} 的向量维度为 {expected}，但输入维度为 {actual}")]
    DimensionMismatch { collection: String, expected: usize, actual: usize },
    #[error("集合 {collection} 使用 {expected} 池化，但输入向量使用 {actual} 池化")]
    PoolingMismatch { collection: String, expected: String, actual: String },
    #[error("返回结果数量必须在 1 到 {max} 之间，实际为 {actual}")]
    InvalidTopK { max: usize, actual: usize },
    #[error("PDF 光栅化失败: {0}")]
    Raster(String),
    /// 嵌入服务或回答服务不可用
    #[error("检索服务失败: {0}")]
    RetrievalService(String),
    #[error("配置错误: {0}")]
    Config(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::RetrievalService(err.to_string())
    }
}
