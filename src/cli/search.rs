use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;

use super::open_store;
use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, SearchOptions};
use crate::embed::HttpEmbedder;
use crate::{Pipeline, QueryResult};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的集合
    pub collection: String,
    /// 问题
    pub question: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = open_store(opts).await?;
        let pipeline = Pipeline::new(store, (), HttpEmbedder::new(&self.embed)?, ());

        let result =
            pipeline.search(&self.collection, &self.question, self.search.k as usize).await?;

        print_result(&result, self.output_format)
    }
}

/// 命令行输出的搜索结果，不包含页面图片
#[derive(Serialize)]
struct SearchHit<'a> {
    id: &'a str,
    score: f32,
    filename: &'a str,
    page: u32,
}

impl<'a> From<&'a QueryResult> for SearchHit<'a> {
    fn from(r: &'a QueryResult) -> Self {
        Self { id: &r.id, score: r.score, filename: &r.metadata.filename, page: r.metadata.page }
    }
}

pub(super) fn print_result(result: &[QueryResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let hits = result.iter().map(SearchHit::from).collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&hits)?)
        }
        OutputFormat::Table => {
            for r in result {
                println!("{:.4}\t{}\t{}", r.score, r.metadata.filename, r.metadata.page);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
