use sqlx::{Executor, Result, Sqlite};

use super::{CollectionRecord, DocumentRecord, VectorRecord};

/// 创建集合，已存在时不做任何修改
///
/// 返回是否新建了集合
pub async fn create_collection<'c, E>(executor: E, name: &str, pooling: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO collection (name, pooling)
        VALUES (?, ?)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(pooling)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// 按创建顺序列出所有集合名称
pub async fn list_collections<'c, E>(executor: E) -> Result<Vec<String>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(r#"SELECT name FROM collection ORDER BY id ASC"#).fetch_all(executor).await
}

/// 根据名称查找集合
pub async fn get_collection<'c, E>(executor: E, name: &str) -> Result<Option<CollectionRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CollectionRecord>(
        r#"
        SELECT id, name, pooling, dimension, created_at FROM collection WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await
}

/// 为空集合设置向量维度，已设置过的集合不受影响
///
/// NOTE: 在事务中应当先执行这个写操作再读取集合，这样事务一开始就持有写锁，
/// 避免 WAL 模式下读后写遇到 SQLITE_BUSY_SNAPSHOT
pub async fn init_dimension<'c, E>(executor: E, name: &str, dimension: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE collection SET dimension = ? WHERE name = ? AND dimension IS NULL
        "#,
    )
    .bind(dimension)
    .bind(name)
    .execute(executor)
    .await?;

    Ok(())
}

/// 添加文档
#[allow(clippy::too_many_arguments)]
pub async fn add_document<'c, E>(
    executor: E,
    id: &str,
    collection_id: i64,
    vector: &[u8],
    filename: &str,
    page: i64,
    image: &[u8],
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO document (id, collection_id, vector, filename, page, image)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(collection_id)
    .bind(vector)
    .bind(filename)
    .bind(page)
    .bind(image)
    .execute(executor)
    .await?;

    Ok(())
}

/// 获取集合中所有文档的向量
pub async fn get_vectors<'c, E>(executor: E, collection_id: i64) -> Result<Vec<VectorRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, VectorRecord>(
        r#"
        SELECT id, vector FROM document WHERE collection_id = ?
        "#,
    )
    .bind(collection_id)
    .fetch_all(executor)
    .await
}

/// 根据 ID 获取文档元数据
pub async fn get_document<'c, E>(executor: E, id: &str) -> Result<DocumentRecord>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, DocumentRecord>(
        r#"
        SELECT id, filename, page, image FROM document WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_one(executor)
    .await
}

/// 统计集合中的文档数量
pub async fn count_documents<'c, E>(executor: E, collection_id: i64) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM document WHERE collection_id = ?"#)
        .bind(collection_id)
        .fetch_one(executor)
        .await
}
