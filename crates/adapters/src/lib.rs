pub(crate) mod discover;
pub mod echidna;
pub mod mythril;
pub mod slither;

use std::sync::Arc;

use vulnhunter::config::Config;
use vulnhunter::sandbox::Sandbox;
use vulnhunter::tool::{AdapterRegistry, ToolAdapter};

pub use echidna::Echidna;
pub use mythril::Mythril;
pub use slither::Slither;

/// Returns all built-in adapters, configured from `config`
pub fn all_adapters(config: &Config, sandbox: Arc<dyn Sandbox>) -> Vec<Box<dyn ToolAdapter>> {
    vec![
        Box::new(Slither::new(config.tool(slither::NAME), Arc::clone(&sandbox))),
        Box::new(Mythril::new(config.tool(mythril::NAME), Arc::clone(&sandbox))),
        Box::new(Echidna::new(config.tool(echidna::NAME), sandbox)),
    ]
}

/// Registry holding every built-in adapter.
pub fn default_registry(config: &Config, sandbox: Arc<dyn Sandbox>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register_all(all_adapters(config, sandbox));
    registry
}
