use std::process::ExitCode;

use ipsec_exporter::{logging::init_logging, IpsecExporter};
use tracing::{error, info};

use crate::args::process_cli_args;

mod args;

#[cfg_attr(feature = "hotpath", hotpath::main)]
#[tokio::main]
async fn main() -> ExitCode {
    let config = match process_cli_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.log_file());

    info!("Exporter configuration: {config:?}");
    match IpsecExporter::new(config).start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("IPsec exporter failed: {e}");
            ExitCode::FAILURE
        }
    }
}
