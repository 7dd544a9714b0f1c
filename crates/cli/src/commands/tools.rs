use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use vulnhunter::config::{Config, DEFAULT_CONFIG_FILE};
use vulnhunter::sandbox::{ContainerSandbox, Sandbox};

pub fn run(config_path: Option<PathBuf>, check: bool) -> Result<()> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = Config::load(&path)?;
    let sandbox = Arc::new(ContainerSandbox::new(config.sandbox.runtime.clone()));
    let registry = vulnhunter_adapters::default_registry(&config, sandbox.clone() as Arc<dyn Sandbox>);

    println!(
        "{:<10} {:<10} {:<9} {:<8} {:<40} Description",
        "Name", "Layer", "Status", "Timeout", "Image"
    );
    println!("{}", "-".repeat(110));

    for adapter in registry.iter() {
        let tool = config.tool(adapter.name());
        let status = if tool.enabled {
            format!("{:<9}", "enabled").green()
        } else {
            format!("{:<9}", "disabled").red()
        };
        println!(
            "{:<10} {:<10} {} {:<8} {:<40} {}",
            adapter.name(),
            adapter.layer().as_str(),
            status,
            format!("{}s", tool.timeout),
            tool.image,
            adapter.description()
        );
    }

    println!("\nTotal: {} tools", registry.len());

    if check {
        let runtime = &config.sandbox.runtime;
        if sandbox.is_available() {
            println!("Container runtime `{runtime}`: {}", "reachable".green());
        } else {
            println!("Container runtime `{runtime}`: {}", "not reachable".red());
        }
    }
    Ok(())
}
