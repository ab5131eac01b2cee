use clap::Parser;
use kommo::cli::{self, Args};

#[tokio::main]
async fn main() -> kommo::Result<()> {
    let args = Args::parse();
    let _logging = kommo::logging::init(&args)?;
    cli::run(args).await
}
