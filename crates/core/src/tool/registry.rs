use crate::config::AnalysisLayer;

use super::traits::ToolAdapter;

/// Registry that holds every available tool adapter.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ToolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Register an adapter. A later adapter with the same name replaces the earlier one.
    pub fn register(&mut self, adapter: Box<dyn ToolAdapter>) {
        self.adapters.retain(|a| a.name() != adapter.name());
        self.adapters.push(adapter);
    }

    /// Register multiple adapters at once
    pub fn register_all(&mut self, adapters: Vec<Box<dyn ToolAdapter>>) {
        for adapter in adapters {
            self.register(adapter);
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolAdapter> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    /// Adapters belonging to any of `layers`, in registration order.
    /// `AnalysisLayer::All` matches every adapter.
    pub fn by_layers(&self, layers: &[AnalysisLayer]) -> Vec<&dyn ToolAdapter> {
        let all = layers.contains(&AnalysisLayer::All);
        self.adapters
            .iter()
            .filter(|a| all || layers.contains(&a.layer()))
            .map(|a| a.as_ref())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ToolAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    /// List all registered adapter names
    pub fn list_adapters(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecutionContext;
    use crate::tool::{ToolError, ToolResult};
    use std::path::Path;

    struct MockAdapter(&'static str, AnalysisLayer);

    impl ToolAdapter for MockAdapter {
        fn name(&self) -> &str {
            self.0
        }
        fn layer(&self) -> AnalysisLayer {
            self.1
        }
        fn description(&self) -> &str {
            "A mock adapter for testing"
        }
        fn initialize(&self, _ctx: &ExecutionContext) -> Result<(), ToolError> {
            Ok(())
        }
        fn analyze(&self, _path: &Path, _ctx: &ExecutionContext) -> ToolResult {
            ToolResult::success(self.0, vec![], 0.0)
        }
        fn cleanup(&self) {}
        fn is_available(&self) -> bool {
            true
        }
    }

    fn registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register_all(vec![
            Box::new(MockAdapter("slither", AnalysisLayer::Static)),
            Box::new(MockAdapter("mythril", AnalysisLayer::Symbolic)),
            Box::new(MockAdapter("echidna", AnalysisLayer::Fuzzing)),
        ]);
        registry
    }

    #[test]
    fn test_register_and_list() {
        let registry = registry();
        assert_eq!(registry.list_adapters(), vec!["slither", "mythril", "echidna"]);
        assert!(registry.get("mythril").is_some());
        assert!(registry.get("manticore").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Box::new(MockAdapter("slither", AnalysisLayer::Formal)));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("slither").unwrap().layer(), AnalysisLayer::Formal);
    }

    #[test]
    fn test_select_by_layers() {
        let registry = registry();
        let names: Vec<&str> = registry
            .by_layers(&[AnalysisLayer::Static, AnalysisLayer::Fuzzing])
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, vec!["slither", "echidna"]);
        assert_eq!(registry.by_layers(&[AnalysisLayer::All]).len(), 3);
        assert!(registry.by_layers(&[AnalysisLayer::Ai]).is_empty());
    }
}
