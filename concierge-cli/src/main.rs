mod cli;

use clap::Parser;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    if let Err(e) = cli::execute(args).await {
        eprintln!("Error: {}", e.classify_privilege());
        std::process::exit(1);
    }
}
