use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = cachegate::cli::Cli::parse();
    if let Err(e) = cachegate::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
