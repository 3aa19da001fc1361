//! Tool Registry - maps pack name to a sequence of tool definitions
//! (spec §3 Tool Registry)

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::Tool;

/// A mapping from pack name to a sequence of tools. `resolve(packNames)`
/// flattens in order; on duplicate names, the last registration wins.
#[derive(Default)]
pub struct ToolRegistry {
    packs: HashMap<String, Vec<Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { packs: HashMap::new() }
    }

    pub fn register_pack(&mut self, name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) {
        let name = name.into();
        debug!(pack = %name, count = %tools.len(), "ToolRegistry::register_pack: called");
        self.packs.insert(name, tools);
    }

    pub fn has_pack(&self, name: &str) -> bool {
        self.packs.contains_key(name)
    }

    /// Flatten the named packs in order; last registration of a given
    /// tool name wins when packs overlap.
    pub fn resolve(&self, pack_names: &[String]) -> Vec<Arc<dyn Tool>> {
        debug!(?pack_names, "ToolRegistry::resolve: called");
        let mut by_name: Vec<(String, Arc<dyn Tool>)> = Vec::new();

        for pack_name in pack_names {
            let Some(tools) = self.packs.get(pack_name) else {
                debug!(pack = %pack_name, "ToolRegistry::resolve: unknown pack, skipping");
                continue;
            };
            for tool in tools {
                let name = tool.name().to_string();
                if let Some(existing) = by_name.iter_mut().find(|(n, _)| *n == name) {
                    existing.1 = tool.clone();
                } else {
                    by_name.push((name, tool.clone()));
                }
            }
        }

        by_name.into_iter().map(|(_, tool)| tool).collect()
    }
}
