//! Entry point invoked by the host runtime

use mongodb_query::cli::{self, ParseOutcome};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    cli::init_logging();

    let result = match cli::parse_args(std::env::args_os()) {
        Ok(args) => cli::run(&args).await,
        Err(ParseOutcome::Exit(info)) => info.exit(),
        Err(ParseOutcome::Failed(err)) => Err(err),
    };

    match result {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(code = err.error_code(), "{}", err);
            println!("{}", cli::failure_line(&err));
            ExitCode::from(err.exit_code())
        }
    }
}
