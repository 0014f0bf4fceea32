mod cli;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    getman_dispatch::logging::init(args.verbose);

    match cli::run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "getman-dispatch failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
