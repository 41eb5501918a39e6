use std::process::ExitCode;

use tmpo::{cli::model::Cli, config::TmpoConfig, session::Session};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let (file_path, required) = cli.config_file();
    let cfg = match TmpoConfig::load(file_path, required) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let session = match Session::open(&cfg).await {
        Ok(session) => session,
        Err(e) => {
            error!("failed to open session: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.dispatch(&session).await {
        Ok(Some(out)) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
