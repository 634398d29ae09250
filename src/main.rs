use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    proxypal_lib::run(proxypal_lib::Cli::parse()).await
}
