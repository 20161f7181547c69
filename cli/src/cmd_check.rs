//! `chainflow check`: load and validate a config, then list its sources.

use std::path::Path;

use anyhow::{Context, Result};
use chainflow_core::source::SourceKind;

use crate::app_config::AppConfig;

pub fn run(path: &Path, verbose: bool) -> Result<()> {
    let config = AppConfig::load(path)?;
    config.init_logging(verbose);

    let sources = config
        .chainflow
        .build_sources(&AppConfig::base_dir(path))
        .with_context(|| format!("validating '{}'", path.display()))?;

    println!("Config '{}' is valid", path.display());
    println!("  Networks: {}", config.chainflow.networks.len());
    println!("  Sources:  {}", sources.len());
    println!();

    for source in &sources {
        let range = match source.end_block {
            Some(end) => format!("{}..={}", source.start_block, end),
            None => format!("{}..", source.start_block),
        };
        println!(
            "  {:<20} {:<10} chain {:<8} {:<10} blocks {}",
            source.name,
            source.filter_kind(),
            source.chain_id(),
            source.network.name,
            range
        );

        match &source.kind {
            SourceKind::Block { interval } => println!("      every {interval} block(s)"),
            SourceKind::Log { abi, .. } => {
                for name in abi.event_names() {
                    println!("      {}:{}", source.name, name);
                }
            }
            SourceKind::CallTrace { abi, .. } => {
                for name in abi.function_names() {
                    println!("      {}:{}", source.name, name);
                }
            }
        }
        if let Some(abi) = source.abi() {
            for name in abi.overloaded() {
                println!("      (ignored, overloaded) {name}");
            }
        }
    }
    Ok(())
}
