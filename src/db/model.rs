use sqlx::FromRow;

/// 集合记录
#[derive(Debug, Clone, FromRow)]
pub struct CollectionRecord {
    /// 集合 ID
    pub id: i64,
    /// 集合名称，全局唯一
    pub name: String,
    /// 池化方式
    pub pooling: String,
    /// 向量维度，集合为空时为 NULL
    pub dimension: Option<i64>,
    /// 创建时间，UNIX 时间戳
    pub created_at: i64,
}

/// 文档向量记录，搜索时只读取这一部分
#[derive(Debug, FromRow)]
pub struct VectorRecord {
    /// 文档 ID
    pub id: String,
    /// 池化后的向量
    pub vector: Vec<u8>,
}

/// 文档元数据记录
#[derive(Debug, FromRow)]
pub struct DocumentRecord {
    /// 文档 ID
    pub id: String,
    /// 来源文件名
    pub filename: String,
    /// 页码，从 1 开始
    pub page: i64,
    /// JPEG 编码的页面图片
    pub image: Vec<u8>,
}
