mod commands;

use clap::Parser;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "jartrack",
    version,
    about = "Inventory, version & diff Java artifacts across a service fleet"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<jartrack_core::error::JartrackError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
