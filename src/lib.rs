pub mod answer;
pub mod cli;
pub mod config;
mod db;
pub mod embed;
pub mod error;
mod metrics;
pub mod pipeline;
pub mod pooling;
pub mod raster;
mod server;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use pipeline::{AbortFlag, BatchReport, PdfFile, Pipeline, QueryOutcome};
pub use pooling::{MultiVectorEmbedding, PooledVector, Pooling};
pub use store::{DocumentStore, DocumentStoreBuilder, EncodedImage, PageMetadata, QueryResult};

/// 一次检索最多返回的页面数量
pub const MAX_TOP_K: usize = 5;

/// 使用默认实现组装的流水线
pub type DefaultPipeline =
    Pipeline<raster::PdfiumRasterizer, embed::HttpEmbedder, answer::AnswerService>;
