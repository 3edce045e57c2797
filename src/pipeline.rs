use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::RgbImage;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::block_in_place;
use utoipa::ToSchema;

use crate::MAX_TOP_K;
use crate::answer::Answerer;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::metrics;
use crate::pooling::{MultiVectorEmbedding, Pooling, PooledVector};
use crate::raster::{Rasterizer, encode_jpeg};
use crate::store::{DocumentStore, EncodedImage, PageMetadata, QueryResult};

/// 因中止而未处理的页面的失败原因
pub const ABORTED: &str = "任务已中止，未处理";

/// 单个文件的入库状态
///
/// `Pending → Rasterizing → Embedding → Reducing → Stored`，任何非终止状态都可以进入 `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Rasterizing,
    Embedding,
    Reducing,
    Stored,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stored | Self::Failed)
    }

    /// 检查状态转移是否合法
    ///
    /// 一个文件的多页依次处理，所以 `Reducing` 和失败后的 `Embedding` 都可以回到 `Embedding`
    pub fn can_transition(&self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Pending, Rasterizing) => true,
            (Rasterizing, Embedding | Stored) => true,
            (Embedding, Embedding | Reducing | Stored) => true,
            (Reducing, Embedding | Stored) => true,
            _ => false,
        }
    }
}

/// 一个处理单元（文件或页面）的失败记录
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestionFailure {
    pub filename: String,
    /// 页码，整个文件失败时为空
    pub page: Option<u32>,
    /// 失败时所处的状态
    pub stage: JobState,
    pub reason: String,
}

impl fmt::Display for IngestionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{} 第 {} 页: {}", self.filename, page, self.reason),
            None => write!(f, "{}: {}", self.filename, self.reason),
        }
    }
}

/// 成功入库的页面
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StoredPage {
    pub page: u32,
    pub id: String,
}

/// 单个文件的处理结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileReport {
    pub filename: String,
    pub state: JobState,
    /// 光栅化得到的页数
    pub pages: u32,
    pub stored: Vec<StoredPage>,
    pub failures: Vec<IngestionFailure>,
    /// 是否因为中止而没有处理完所有页面
    pub aborted: bool,
}

impl FileReport {
    fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            state: JobState::Pending,
            pages: 0,
            stored: vec![],
            failures: vec![],
            aborted: false,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(self.state.can_transition(next), "{:?} -> {:?}", self.state, next);
        debug!("{}: {:?} -> {:?}", self.filename, self.state, next);
        self.state = next;
    }

    fn fail_page(&mut self, page: u32, err: &Error) {
        warn!("{} 第 {} 页处理失败: {}", self.filename, page, err);
        metrics::inc_page(false);
        self.failures.push(IngestionFailure {
            filename: self.filename.clone(),
            page: Some(page),
            stage: self.state,
            reason: err.to_string(),
        });
    }

    /// 中止时记录剩余未处理的页面
    fn abort_pages(&mut self, from: u32) {
        info!("{} 已中止，第 {} 到 {} 页未处理", self.filename, from, self.pages);
        self.aborted = true;
        for page in from..=self.pages {
            self.failures.push(IngestionFailure {
                filename: self.filename.clone(),
                page: Some(page),
                stage: self.state,
                reason: ABORTED.to_string(),
            });
        }
    }

    fn fail_file(mut self, err: &Error) -> Self {
        warn!("{} 处理失败: {}", self.filename, err);
        metrics::inc_failed_file();
        self.failures.push(IngestionFailure {
            filename: self.filename.clone(),
            page: None,
            stage: self.state,
            reason: err.to_string(),
        });
        self.advance(JobState::Failed);
        self
    }

    fn finish(mut self) -> Self {
        // 有页面入库，或者文档本身没有页面，都算作成功
        if !self.stored.is_empty() || (self.pages == 0 && !self.aborted) {
            self.advance(JobState::Stored);
        } else {
            self.advance(JobState::Failed);
        }
        self
    }
}

/// 一批文件的处理结果，部分成功是正常情况
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchReport {
    pub collection: String,
    pub files: Vec<FileReport>,
    /// 因为中止而没有开始处理的文件
    pub skipped: Vec<String>,
    pub aborted: bool,
}

impl BatchReport {
    pub fn stored_pages(&self) -> usize {
        self.files.iter().map(|f| f.stored.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &IngestionFailure> {
        self.files.iter().flat_map(|f| f.failures.iter())
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failures().next().is_none()
    }
}

/// 等待入库的 PDF 文件
#[derive(Debug, Clone)]
pub struct PdfFile {
    pub path: PathBuf,
    /// 记录在元数据中的文件名
    pub filename: String,
}

impl PdfFile {
    pub fn new(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self { path: path.into(), filename: filename.into() }
    }

    /// 使用路径中的文件名
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self::new(path, filename)
    }
}

/// 批量任务的中止标记，中止后不会再开始处理新的文件或页面
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 查询结果
#[derive(Debug)]
pub enum QueryOutcome {
    /// 集合中没有任何文档，没有调用回答服务
    NoRelevantDocuments,
    /// 检索到了页面；回答生成失败时检索结果仍然有效
    Answered { results: Vec<QueryResult>, answer: Result<String> },
}

/// 串联光栅化、嵌入、池化、存储和回答生成
///
/// 入库和查询都通过同一个 [`Pooling`] 折叠嵌入
pub struct Pipeline<R, E, A> {
    store: DocumentStore,
    rasterizer: R,
    embedder: E,
    answerer: A,
    pooling: Pooling,
}

impl<R, E, A> Pipeline<R, E, A> {
    /// 不需要的组件可以传入 `()`，例如只入库时不需要回答服务
    pub fn new(store: DocumentStore, rasterizer: R, embedder: E, answerer: A) -> Self {
        Self { store, rasterizer, embedder, answerer, pooling: Pooling::default() }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// 入库和查询共用的池化入口
    fn pool(&self, embedding: &MultiVectorEmbedding) -> Result<PooledVector> {
        self.pooling.reduce(embedding)
    }
}

impl<R, E, A> Pipeline<R, E, A>
where
    R: Rasterizer + Sync,
    E: Embedder + Sync,
    A: Sync,
{
    /// 按提交顺序逐个处理文件
    ///
    /// 单个文件或页面的失败会被记录在报告中，不影响其他文件；
    /// 说明整个流程配置错误的错误（例如向量维度不一致）会直接返回
    pub async fn ingest_batch(
        &self,
        collection: &str,
        files: &[PdfFile],
        abort: &AbortFlag,
        pb: &ProgressBar,
    ) -> Result<BatchReport> {
        if !self.store.collection_exists(collection).await? {
            return Err(Error::CollectionNotFound(collection.to_string()));
        }

        let mut report = BatchReport {
            collection: collection.to_string(),
            files: vec![],
            skipped: vec![],
            aborted: false,
        };

        for (i, file) in files.iter().enumerate() {
            if abort.is_aborted() {
                info!("任务已中止，跳过剩余 {} 个文件", files.len() - i);
                report.aborted = true;
                report.skipped.extend(files[i..].iter().map(|f| f.filename.clone()));
                break;
            }
            pb.set_message(file.filename.clone());
            let file_report = self.ingest_file(collection, file, abort, pb).await?;
            report.aborted |= file_report.aborted;
            report.files.push(file_report);
        }

        info!(
            "集合 {} 入库完成：{} 页成功，{} 处失败",
            collection,
            report.stored_pages(),
            report.failures().count()
        );

        Ok(report)
    }

    /// 处理单个文件的所有页面
    pub async fn ingest_file(
        &self,
        collection: &str,
        file: &PdfFile,
        abort: &AbortFlag,
        pb: &ProgressBar,
    ) -> Result<FileReport> {
        let mut report = FileReport::new(&file.filename);

        report.advance(JobState::Rasterizing);
        let pages = match block_in_place(|| self.rasterizer.rasterize(&file.path)) {
            Ok(pages) => pages,
            Err(err @ Error::Raster(_)) => return Ok(report.fail_file(&err)),
            Err(err) => return Err(err),
        };
        report.pages = pages.len() as u32;
        pb.inc_length(pages.len() as u64);
        debug!("{} 共 {} 页", file.filename, pages.len());

        for (i, image) in pages.iter().enumerate() {
            let page = i as u32 + 1;
            if abort.is_aborted() {
                report.abort_pages(page);
                break;
            }
            pb.set_message(format!("{} 第 {}/{} 页", file.filename, page, pages.len()));

            report.advance(JobState::Embedding);
            match self.ingest_page(collection, &file.filename, page, image, &mut report).await {
                Ok(id) => {
                    metrics::inc_page(true);
                    report.stored.push(StoredPage { page, id });
                }
                Err(err) if is_unit_failure(&err) => report.fail_page(page, &err),
                Err(err) => return Err(err),
            }
            pb.inc(1);
        }

        Ok(report.finish())
    }

    async fn ingest_page(
        &self,
        collection: &str,
        filename: &str,
        page: u32,
        image: &RgbImage,
        report: &mut FileReport,
    ) -> Result<String> {
        let mut embeddings = self.embedder.embed_images(std::slice::from_ref(image)).await?;
        if embeddings.len() != 1 {
            return Err(Error::InvalidEmbedding(format!(
                "一张图片得到了 {} 个嵌入",
                embeddings.len()
            )));
        }
        let embedding = embeddings.remove(0);
        debug!("{} 第 {} 页得到 {} 个 token 向量", filename, page, embedding.len());

        report.advance(JobState::Reducing);
        let vector = self.pool(&embedding)?;
        let encoded = block_in_place(|| encode_jpeg(image))?;

        let metadata = PageMetadata { filename: filename.to_string(), page, image: encoded };
        self.store.add_document(collection, &vector, &metadata).await
    }

}

impl<R, E, A> Pipeline<R, E, A>
where
    R: Sync,
    E: Embedder + Sync,
    A: Sync,
{
    /// 检索与问题最相关的 k 个页面
    pub async fn search(
        &self,
        collection: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<QueryResult>> {
        if k == 0 || k > MAX_TOP_K {
            return Err(Error::InvalidTopK { max: MAX_TOP_K, actual: k });
        }
        if !self.store.collection_exists(collection).await? {
            return Err(Error::CollectionNotFound(collection.to_string()));
        }

        let start = Instant::now();
        let embedding = self.embedder.embed_query(question).await?;
        let vector = self.pool(&embedding)?;
        let results = self.store.search(collection, &vector, k).await?;
        let elapsed = start.elapsed().as_secs_f32();
        metrics::observe_search_duration(k, elapsed);
        debug!("检索到 {} 个页面，耗时 {:.2}s", results.len(), elapsed);

        Ok(results)
    }
}

impl<R, E, A> Pipeline<R, E, A>
where
    R: Sync,
    E: Embedder + Sync,
    A: Answerer + Sync,
{
    /// 检索相关页面，并将页面图片和问题交给回答服务
    ///
    /// 没有检索到页面时不会调用回答服务
    pub async fn query(&self, collection: &str, question: &str, k: usize) -> Result<QueryOutcome> {
        let results = self.search(collection, question, k).await?;
        if results.is_empty() {
            info!("集合 {} 中没有相关文档", collection);
            return Ok(QueryOutcome::NoRelevantDocuments);
        }

        let images = results.iter().map(|r| r.metadata.image.clone()).collect::<Vec<EncodedImage>>();
        let answer = self.answerer.answer(question, &images).await;
        if let Err(err) = &answer {
            warn!("生成回答失败: {}", err);
            metrics::inc_answer_failure();
        }

        Ok(QueryOutcome::Answered { results, answer })
    }
}

/// 只影响当前页面的错误，记录后继续处理下一页
fn is_unit_failure(err: &Error) -> bool {
    matches!(err, Error::Raster(_) | Error::RetrievalService(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        for next in [JobState::Pending, JobState::Embedding, JobState::Stored, JobState::Failed] {
            assert!(!JobState::Stored.can_transition(next));
            assert!(!JobState::Failed.can_transition(next));
        }
    }

    #[test]
    fn any_running_state_can_fail() {
        for state in [JobState::Pending, JobState::Rasterizing, JobState::Embedding, JobState::Reducing]
        {
            assert!(state.can_transition(JobState::Failed));
        }
    }

    #[test]
    fn happy_path_transitions() {
        let path = [
            JobState::Pending,
            JobState::Rasterizing,
            JobState::Embedding,
            JobState::Reducing,
            JobState::Embedding,
            JobState::Reducing,
            JobState::Stored,
        ];
        for w in path.windows(2) {
            assert!(w[0].can_transition(w[1]), "{:?} -> {:?}", w[0], w[1]);
        }
        assert!(!JobState::Pending.can_transition(JobState::Embedding));
        assert!(!JobState::Rasterizing.can_transition(JobState::Reducing));
    }

    #[test]
    fn report_with_no_stored_pages_fails() {
        let mut report = FileReport::new("a.pdf");
        report.advance(JobState::Rasterizing);
        report.pages = 1;
        report.advance(JobState::Embedding);
        report.fail_page(1, &Error::RetrievalService("timeout".to_string()));
        let report = report.finish();
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failures[0].stage, JobState::Embedding);
        assert_eq!(report.failures[0].to_string(), "a.pdf 第 1 页: 检索服务失败: timeout");
    }

    #[test]
    fn empty_document_is_stored() {
        let mut report = FileReport::new("empty.pdf");
        report.advance(JobState::Rasterizing);
        assert_eq!(report.finish().state, JobState::Stored);
    }

    #[test]
    fn pdf_file_name_from_path() {
        let file = PdfFile::from_path("/tmp/docs/report.pdf");
        assert_eq!(file.filename, "report.pdf");
    }
}
