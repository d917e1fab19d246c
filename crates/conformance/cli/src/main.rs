//! gateway-conformance binary

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match gateway_conformance::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
