use clap::Parser; // for cli
use portfolio_demos::config::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    portfolio_demos::start_server(args).await
}
