use tracing::debug;

use crate::config::{AnalysisLayer, Config};
use crate::tool::{AdapterRegistry, ToolAdapter};

use super::PipelineError;

/// What the caller asked for. Explicit tool names win over layers; an empty
/// request falls back to the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub layers: Vec<AnalysisLayer>,
    pub tools: Vec<String>,
}

impl AnalysisRequest {
    pub fn tools<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            layers: Vec::new(),
            tools: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn layers(layers: Vec<AnalysisLayer>) -> Self {
        Self {
            layers,
            tools: Vec::new(),
        }
    }
}

pub struct Selection<'a> {
    pub adapters: Vec<&'a dyn ToolAdapter>,
    pub notes: Vec<String>,
}

pub fn select<'a>(
    registry: &'a AdapterRegistry,
    config: &Config,
    request: &AnalysisRequest,
) -> Result<Selection<'a>, PipelineError> {
    let candidates = if !request.tools.is_empty() {
        by_names(registry, &request.tools)?
    } else if !request.layers.is_empty() {
        registry.by_layers(&request.layers)
    } else if !config.pipeline.default_tools.is_empty() {
        by_names(registry, &config.pipeline.default_tools)?
    } else {
        registry.by_layers(&config.pipeline.default_layers)
    };

    let mut adapters: Vec<&dyn ToolAdapter> = Vec::with_capacity(candidates.len());
    let mut notes = Vec::new();
    for adapter in candidates {
        if adapters.iter().any(|a| a.name() == adapter.name()) {
            continue;
        }
        if !config.is_tool_enabled(adapter.name()) {
            debug!(tool = adapter.name(), "disabled in configuration");
            notes.push(format!("{}: disabled in configuration, skipped", adapter.name()));
            continue;
        }
        adapters.push(adapter);
    }
    Ok(Selection { adapters, notes })
}

fn by_names<'a>(
    registry: &'a AdapterRegistry,
    names: &[String],
) -> Result<Vec<&'a dyn ToolAdapter>, PipelineError> {
    names
        .iter()
        .map(|name| {
            registry
                .get(name.trim())
                .ok_or_else(|| PipelineError::UnknownTool(name.clone()))
        })
        .collect()
}
