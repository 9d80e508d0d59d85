// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{
    args::Args, op::Op, Files, Ingest, Init, Publish, ReadKey, Serve, Subscribe, Unsubscribe,
    Version,
};

command_enum! {
    (Init, Init),
    (Ingest, Ingest),
    (Files, Files),
    (Publish, Publish),
    (Subscribe, Subscribe),
    (Unsubscribe, Unsubscribe),
    (ReadKey, ReadKey),
    (Serve, Serve),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
