use clap::Parser;
use ssh_client_gen::cli::{self, Cli};
use ssh_client_gen::core::settings;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = cli.load_env() {
        return cli::report_error(&e);
    }
    cli::init_logging(&cli.settings().get_or(settings::LOG_LEVEL, "warn"));

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => cli::report_error(&e),
    }
}
