use std::fmt;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tokio::task::spawn_blocking;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ConfDir;
use crate::db::{self, Database, crud};
use crate::error::{Error, Result};
use crate::pooling::{Pooling, PooledVector};

/// 编码后的页面图片，目前总是 JPEG
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage(pub Vec<u8>);

impl EncodedImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedImage({} bytes)", self.0.len())
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

/// 每一页附带的元数据
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PageMetadata {
    /// 来源文件名
    pub filename: String,
    /// 页码，从 1 开始
    pub page: u32,
    /// base64 编码的 JPEG 页面图片
    #[schema(value_type = String, format = Byte)]
    pub image: EncodedImage,
}

/// 一次搜索的结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryResult {
    /// 文档 ID
    pub id: String,
    /// 平方欧氏距离，越小越相似
    pub score: f32,
    pub metadata: PageMetadata,
}

/// 集合信息
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CollectionInfo {
    pub name: String,
    pub pooling: String,
    /// 向量维度，空集合为 null
    pub dimension: Option<usize>,
    /// 文档数量
    pub documents: u64,
}

pub struct DocumentStoreBuilder {
    conf_dir: ConfDir,
}

impl DocumentStoreBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir }
    }

    pub async fn open(self) -> Result<DocumentStore> {
        std::fs::create_dir_all(self.conf_dir.path())?;
        let db = db::init_db(self.conf_dir.database()).await?;
        Ok(DocumentStore { db })
    }
}

/// 按集合保存页面向量和元数据，并提供最近邻搜索
///
/// 数据保存在 SQLite 中，可以被多个进程同时写入
#[derive(Clone)]
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    /// 创建集合，已存在时不做任何修改
    ///
    /// 返回是否新建了集合
    pub async fn create_collection(&self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        let created = crud::create_collection(&self.db, name, Pooling::default().as_str()).await?;
        if created {
            info!("创建集合: {}", name);
        } else {
            debug!("集合已存在: {}", name);
        }
        Ok(created)
    }

    /// 列出所有集合，包括之前进程创建的
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(crud::list_collections(&self.db).await?)
    }

    /// 检查集合是否存在
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(crud::get_collection(&self.db, name).await?.is_some())
    }

    /// 获取集合信息
    pub async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let record = crud::get_collection(&self.db, name)
            .await?
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        let documents = crud::count_documents(&self.db, record.id).await?;
        Ok(CollectionInfo {
            name: record.name,
            pooling: record.pooling,
            dimension: record.dimension.map(|d| d as usize),
            documents: documents as u64,
        })
    }

    /// 添加一页文档，返回生成的文档 ID
    ///
    /// 集合中的第一篇文档决定集合的向量维度
    pub async fn add_document(
        &self,
        collection: &str,
        vector: &PooledVector,
        metadata: &PageMetadata,
    ) -> Result<String> {
        let mut tx = self.db.begin().await?;

        crud::init_dimension(&mut *tx, collection, vector.dim() as i64).await?;
        let record = crud::get_collection(&mut *tx, collection)
            .await?
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        check_pooling(&record.name, &record.pooling, vector.pooling())?;
        check_dimension(&record.name, record.dimension, vector.dim())?;

        let id = document_id(&metadata.filename, metadata.page);
        let bytes: &[u8] = bytemuck::cast_slice(vector.as_slice());
        crud::add_document(
            &mut *tx,
            &id,
            record.id,
            bytes,
            &metadata.filename,
            metadata.page as i64,
            metadata.image.as_bytes(),
        )
        .await?;

        tx.commit().await?;

        debug!("添加文档: {}", id);
        Ok(id)
    }

    /// 搜索与查询向量最接近的 k 篇文档，最接近的排在最前
    ///
    /// 集合中文档少于 k 时返回全部文档；集合为空时返回空列表；
    /// 集合不存在时返回 [`Error::CollectionNotFound`]
    pub async fn search(
        &self,
        collection: &str,
        query: &PooledVector,
        k: usize,
    ) -> Result<Vec<QueryResult>> {
        let record = crud::get_collection(&self.db, collection)
            .await?
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        check_pooling(&record.name, &record.pooling, query.pooling())?;
        if record.dimension.is_none() || k == 0 {
            return Ok(vec![]);
        }
        check_dimension(&record.name, record.dimension, query.dim())?;

        let start = Instant::now();
        let vectors = crud::get_vectors(&self.db, record.id).await?;
        let total = vectors.len();
        let query = query.clone();

        let neighbors = spawn_blocking(move || -> Result<Vec<(String, f32)>> {
            let mut neighbors = vectors
                .into_par_iter()
                .map(|row| {
                    let vector = decode_vector(&row.id, &row.vector, query.dim())?;
                    Ok((row.id, query.l2_squared(&vector)))
                })
                .collect::<Result<Vec<_>>>()?;
            neighbors.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            neighbors.truncate(k);
            Ok(neighbors)
        })
        .await
        .map_err(std::io::Error::other)??;

        let mut results = Vec::with_capacity(neighbors.len());
        for (id, score) in neighbors {
            let doc = crud::get_document(&self.db, &id).await?;
            results.push(QueryResult {
                id: doc.id,
                score,
                metadata: PageMetadata {
                    filename: doc.filename,
                    page: doc.page as u32,
                    image: EncodedImage(doc.image),
                },
            });
        }

        debug!(
            "在集合 {} 的 {} 篇文档中搜索，耗时 {:.2}ms",
            collection,
            total,
            start.elapsed().as_secs_f32() * 1000.
        );

        Ok(results)
    }
}

/// 生成文档 ID，格式为 `{文件名}_{页码}_{uuid}`
fn document_id(filename: &str, page: u32) -> String {
    format!("{}_{}_{}", filename, page, Uuid::new_v4().simple())
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed != name {
        return Err(Error::InvalidCollectionName(name.to_string()));
    }
    Ok(name)
}

fn check_pooling(collection: &str, expected: &str, actual: Pooling) -> Result<()> {
    let expected: Pooling = expected.parse()?;
    if expected != actual {
        return Err(Error::PoolingMismatch {
            collection: collection.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn check_dimension(collection: &str, expected: Option<i64>, actual: usize) -> Result<()> {
    match expected {
        Some(expected) if expected as usize != actual => Err(Error::DimensionMismatch {
            collection: collection.to_string(),
            expected: expected as usize,
            actual,
        }),
        _ => Ok(()),
    }
}

fn decode_vector(id: &str, bytes: &[u8], dim: usize) -> Result<Vec<f32>> {
    if bytes.len() != dim * size_of::<f32>() {
        return Err(Error::InvalidEmbedding(format!(
            "文档 {} 的向量长度为 {} 字节，应为 {} 字节",
            id,
            bytes.len(),
            dim * size_of::<f32>()
        )));
    }
    // NOTE: sqlite 返回的数据不保证对齐，不能直接 cast
    Ok(bytes.chunks_exact(4).map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_unique() {
        let a = document_id("a.pdf", 1);
        let b = document_id("a.pdf", 1);
        assert_ne!(a, b);
        assert!(a.starts_with("a.pdf_1_"));
    }

    #[test]
    fn collection_name_validation() {
        assert!(validate_name("papers").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(" papers").is_err());
    }

    #[test]
    fn pooling_is_checked_by_name() {
        assert!(check_pooling("papers", "max", Pooling::Max).is_ok());
        assert!(matches!(check_pooling("papers", "mean", Pooling::Max), Err(Error::Config(_))));
    }

    #[test]
    fn decode_unaligned_vector() {
        let v = [1.5f32, -2.0, 3.25];
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(bytemuck::cast_slice(&v));
        assert_eq!(decode_vector("x", &bytes[1..], 3).unwrap(), v);
        assert!(decode_vector("x", &bytes[1..], 4).is_err());
    }

    #[test]
    fn encoded_image_serializes_as_base64() {
        let image = EncodedImage(vec![0xff, 0xd8, 0xff]);
        assert_eq!(serde_json::to_string(&image).unwrap(), "\"/9j/\"");
    }
}
