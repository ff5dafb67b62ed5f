mod cli;
mod hypes;
mod pipeline;
mod run_artifacts;
mod video;

use anyhow::Result;
use cli::Args;
use pipeline::orchestrator::{run, SetupError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kittibox_video=info,ort=warn")),
        )
        .init();

    let args = Args::parse_args();

    match run(&args) {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Some(setup) = e.downcast_ref::<SetupError>() {
                tracing::error!("{}", setup);
                if let SetupError::ModelFiles(_) = setup {
                    tracing::error!("Please check that the log directory holds model_files/hypes.json and the exported model.");
                }
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
