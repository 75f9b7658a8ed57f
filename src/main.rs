//! agent-tcp-test - end-to-end test driver for game engines
//!
//! Launches the engine, connects to its agent socket and runs JSON test
//! steps against it.

use agent_tcp_test::common::error::EXIT_FAILURE;
use agent_tcp_test::common::logging;
use agent_tcp_test::{cli, commands::RunArgs};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "agent-tcp-test",
    about = "Run agent TCP JSON tests against a game engine project"
)]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();

    let code = match cli::run(cli.run).await {
        Ok(summary) if summary.passed() => 0,
        Ok(_) => EXIT_FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };

    std::process::exit(code);
}
