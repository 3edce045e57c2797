mod add;
mod ask;
mod collection;
mod search;
pub mod server;

pub use add::*;
pub use ask::*;
pub use collection::*;
pub use search::*;
pub use server::*;

use crate::config::Opts;
use crate::{DocumentStore, DocumentStoreBuilder};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

async fn open_store(opts: &Opts) -> anyhow::Result<DocumentStore> {
    Ok(DocumentStoreBuilder::new(opts.conf_dir.clone()).open().await?)
}
