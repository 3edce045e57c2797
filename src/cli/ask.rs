use clap::Parser;

use super::open_store;
use super::search::{OutputFormat, print_result};
use crate::answer::AnswerService;
use crate::cli::SubCommandExtend;
use crate::config::{AnswerOptions, EmbedOptions, Opts, SearchOptions};
use crate::embed::HttpEmbedder;
use crate::{Pipeline, QueryOutcome};

#[derive(Parser, Debug, Clone)]
pub struct AskCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub answer: AnswerOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的集合
    pub collection: String,
    /// 问题
    pub question: String,
    /// 同时输出检索到的页面
    #[arg(long)]
    pub show_pages: bool,
}

impl SubCommandExtend for AskCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        // 先检查回答后端配置，避免检索完才发现无法回答
        let answerer = AnswerService::new(&self.answer)?;
        let store = open_store(opts).await?;
        let pipeline = Pipeline::new(store, (), HttpEmbedder::new(&self.embed)?, answerer);

        match pipeline.query(&self.collection, &self.question, self.search.k as usize).await? {
            QueryOutcome::NoRelevantDocuments => {
                println!("没有找到相关文档，请先添加 PDF");
            }
            QueryOutcome::Answered { results, answer } => {
                if self.show_pages {
                    print_result(&results, OutputFormat::Table)?;
                    println!();
                }
                match answer {
                    Ok(answer) => println!("{}", answer),
                    Err(err) => {
                        // 检索结果仍然有效，只是无法生成回答
                        if !self.show_pages {
                            print_result(&results, OutputFormat::Table)?;
                        }
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(())
    }
}
