use clap::Parser;
use pagesearch::Opts;
use pagesearch::cli::SubCommandExtend;
use pagesearch::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Create(config) => config.run(&opts).await,
        SubCommand::List(config) => config.run(&opts).await,
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Ask(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
