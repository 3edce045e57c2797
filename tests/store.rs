use anyhow::Result;
use assert_fs::TempDir;
use pagesearch::config::ConfDir;
use pagesearch::{
    DocumentStore, DocumentStoreBuilder, EncodedImage, Error, MultiVectorEmbedding, PageMetadata,
    PooledVector, Pooling,
};

fn vector(v: &[f32]) -> PooledVector {
    Pooling::Max.reduce(&MultiVectorEmbedding::new(vec![v.to_vec()])).unwrap()
}

fn metadata(filename: &str, page: u32) -> PageMetadata {
    PageMetadata { filename: filename.to_string(), page, image: EncodedImage(vec![0xff, 0xd8, page as u8]) }
}

async fn open(dir: &TempDir) -> Result<DocumentStore> {
    Ok(DocumentStoreBuilder::new(ConfDir::from(dir.path())).open().await?)
}

#[tokio::test]
async fn create_collection_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;

    assert!(store.create_collection("papers").await?);
    assert!(!store.create_collection("papers").await?);
    assert!(store.create_collection("slides").await?);

    assert_eq!(store.list_collections().await?, ["papers", "slides"]);
    Ok(())
}

#[tokio::test]
async fn invalid_collection_name() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;

    assert!(matches!(store.create_collection("").await, Err(Error::InvalidCollectionName(_))));
    assert!(matches!(store.create_collection(" a ").await, Err(Error::InvalidCollectionName(_))));
    assert!(store.list_collections().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn collections_survive_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let store = open(&dir).await?;
        store.create_collection("papers").await?;
        store.add_document("papers", &vector(&[1.0, 2.0]), &metadata("a.pdf", 1)).await?;
    }

    let store = open(&dir).await?;
    assert_eq!(store.list_collections().await?, ["papers"]);
    let results = store.search("papers", &vector(&[1.0, 2.0]), 3).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata, metadata("a.pdf", 1));
    assert_eq!(results[0].score, 0.0);
    Ok(())
}

#[tokio::test]
async fn search_returns_nearest_first() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;
    store.create_collection("papers").await?;

    for i in 0..4 {
        store.add_document("papers", &vector(&[i as f32, 0.0]), &metadata("a.pdf", i + 1)).await?;
    }

    let results = store.search("papers", &vector(&[0.9, 0.0]), 2).await?;
    let pages = results.iter().map(|r| r.metadata.page).collect::<Vec<_>>();
    assert_eq!(pages, [2, 1]);
    assert!(results[0].score < results[1].score);
    assert!(results[0].id.starts_with("a.pdf_2_"));

    // k 大于文档数量时返回全部文档
    let results = store.search("papers", &vector(&[0.9, 0.0]), 5).await?;
    assert_eq!(results.len(), 4);
    assert_eq!(results.last().map(|r| r.metadata.page), Some(4));
    Ok(())
}

#[tokio::test]
async fn empty_and_missing_collections_differ() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;
    store.create_collection("empty").await?;

    assert!(store.search("empty", &vector(&[1.0]), 3).await?.is_empty());
    assert!(matches!(
        store.search("missing", &vector(&[1.0]), 3).await,
        Err(Error::CollectionNotFound(name)) if name == "missing"
    ));
    assert!(matches!(
        store.add_document("missing", &vector(&[1.0]), &metadata("a.pdf", 1)).await,
        Err(Error::CollectionNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn first_document_fixes_dimension() -> Result<()> {
    let dir = TempDir::new()?;
    let store = open(&dir).await?;
    store.create_collection("papers").await?;

    assert_eq!(store.collection_info("papers").await?.dimension, None);
    store.add_document("papers", &vector(&[1.0, 2.0, 3.0]), &metadata("a.pdf", 1)).await?;

    let err = store.add_document("papers", &vector(&[1.0, 2.0]), &metadata("a.pdf", 2)).await;
    assert!(matches!(err, Err(Error::DimensionMismatch { expected: 3, actual: 2, .. })));
    let err = store.search("papers", &vector(&[1.0]), 1).await;
    assert!(matches!(err, Err(Error::DimensionMismatch { expected: 3, actual: 1, .. })));

    let info = store.collection_info("papers").await?;
    assert_eq!(info.dimension, Some(3));
    assert_eq!(info.documents, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_lose_documents() -> Result<()> {
    let dir = TempDir::new()?;
    let a = open(&dir).await?;
    let b = open(&dir).await?;
    a.create_collection("papers").await?;

    let write = |store: DocumentStore, name: &'static str| async move {
        for page in 1..=10 {
            store.add_document("papers", &vector(&[page as f32, 1.0]), &metadata(name, page)).await?;
        }
        Ok::<_, Error>(())
    };
    let (ra, rb) = tokio::join!(write(a.clone(), "a.pdf"), write(b.clone(), "b.pdf"));
    ra?;
    rb?;

    assert_eq!(a.collection_info("papers").await?.documents, 20);
    assert_eq!(b.search("papers", &vector(&[0.0, 0.0]), 5).await?.len(), 5);
    Ok(())
}
