use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};

use super::open_store;
use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, RasterOptions};
use crate::embed::HttpEmbedder;
use crate::raster::PdfiumRasterizer;
use crate::utils::{collect_pdf_files, pb_style};
use crate::{AbortFlag, PdfFile, Pipeline};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub raster: RasterOptions,
    #[command(flatten)]
    pub embed: EmbedOptions,
    /// 目标集合
    pub collection: String,
    /// PDF 文件，传入目录时添加目录下的所有 PDF
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// 集合不存在时自动创建
    #[arg(long)]
    pub create: bool,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = open_store(opts).await?;
        if self.create {
            store.create_collection(&self.collection).await?;
        }

        let files = collect_pdf_files(&self.paths)?
            .into_iter()
            .map(PdfFile::from_path)
            .collect::<Vec<_>>();
        info!("准备添加 {} 个文件到集合 {}", files.len(), self.collection);

        let embedder = HttpEmbedder::new(&self.embed)?;
        info!("嵌入模型: {}", embedder.model());
        let pipeline = Pipeline::new(store, PdfiumRasterizer::new(&self.raster), embedder, ());

        // 收到 Ctrl-C 后处理完当前页面再停止
        let abort = AbortFlag::new();
        let abort_clone = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，处理完当前页面后停止");
                abort_clone.abort();
            }
        });

        let pb = ProgressBar::no_length().with_style(pb_style());
        let report = pipeline.ingest_batch(&self.collection, &files, &abort, &pb).await?;
        pb.finish_with_message("PDF 添加完成");

        for failure in report.failures() {
            println!("[ERR] {}", failure);
        }
        for filename in &report.skipped {
            println!("[SKIP] {}", filename);
        }
        println!(
            "共添加 {} 页，失败 {} 处，跳过 {} 个文件",
            report.stored_pages(),
            report.failures().count(),
            report.skipped.len()
        );

        if report.aborted {
            return Err(anyhow!("任务已中止"));
        }
        Ok(())
    }
}
