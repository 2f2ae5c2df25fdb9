//! Backward engine configuration

use serde::{Deserialize, Serialize};

/// Options for a reverse pass.
///
/// Deserializable so training setups can carry it next to their own
/// settings; missing fields fall back to [`EngineConfig::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject terminals holding more than one element instead of seeding
    /// them with ones.
    pub require_scalar_output: bool,
    /// Clear each consumed node's producer after its backward runs.
    /// With `false` the graph is retained and can be differentiated again;
    /// leaf gradients then sum across passes.
    pub detach_graph: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            require_scalar_output: false,
            detach_graph: true,
        }
    }
}

impl EngineConfig {
    /// Strict variant: scalar terminals only, graph detached after use.
    pub fn strict() -> Self {
        Self {
            require_scalar_output: true,
            ..Self::default()
        }
    }

    pub fn retain_graph(mut self, retain: bool) -> Self {
        self.detach_graph = !retain;
        self
    }
}
