use clap::Parser;

use super::open_store;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct CreateCommand {
    /// 集合名称
    pub name: String,
}

impl SubCommandExtend for CreateCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = open_store(opts).await?;
        if store.create_collection(&self.name).await? {
            println!("已创建集合 {}", self.name);
        } else {
            println!("集合 {} 已存在", self.name);
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// 同时显示每个集合的文档数量和向量维度
    #[arg(short, long)]
    pub long: bool,
}

impl SubCommandExtend for ListCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = open_store(opts).await?;
        for name in store.list_collections().await? {
            if self.long {
                let info = store.collection_info(&name).await?;
                let dimension = info.dimension.map(|d| d.to_string()).unwrap_or("-".to_string());
                println!("{}\t{}\t{}\t{}", info.name, info.documents, dimension, info.pooling);
            } else {
                println!("{}", name);
            }
        }
        Ok(())
    }
}
