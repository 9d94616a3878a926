//! # fabricboot Node
//!
//! First-boot provisioner for a hypervisor node's network fabric: partitions
//! the physical NICs across the declared virtual switches, wires bonds,
//! VLANs and MTU, and reconciles the management VM's virtual NIC devices
//! against the declared topology.
//!
//! ## Usage
//! ```bash
//! fabricboot-node --config /etc/fabricboot/node.yaml
//! ```

use std::path::Path;

use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod pipeline;

use cli::Args;
use config::Config;

use fabricboot_common::write_failure_marker;

const DEFAULT_CONFIG_PATH: &str = "/etc/fabricboot/node.yaml";

fn main() {
    let args = Args::parse();

    let init = if args.log_json {
        fabricboot_common::init_logging_json(&args.log_level)
    } else {
        fabricboot_common::init_logging(&args.log_level)
    };
    if let Err(e) = init {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting fabricboot node provisioner"
    );

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to load configuration");
            std::process::exit(1);
        }
    };

    // A fatal condition is terminal: log it, record the marker, exit nonzero.
    if let Err(e) = pipeline::run(&config) {
        error!(error = %format!("{e:#}"), "provisioning failed");
        let marker = Path::new(&config.paths.failure_marker);
        if let Err(me) = write_failure_marker(marker, &format!("{e:#}")) {
            error!(error = %me, path = %marker.display(), "failed to write failure marker");
        }
        std::process::exit(1);
    }

    info!("provisioning complete");
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!(config_path = %path, "configuration loaded");
            Ok(config.with_cli_overrides(args))
        }
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(config) => {
                info!(config_path = %DEFAULT_CONFIG_PATH, "configuration loaded from default location");
                Ok(config.with_cli_overrides(args))
            }
            Err(_) => {
                info!("no config file found, using CLI arguments and defaults");
                Ok(Config::default().with_cli_overrides(args))
            }
        },
    }
}
