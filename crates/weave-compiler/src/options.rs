//! Options the driver is run with.

use serde::{Deserialize, Serialize};

/// Settled weaving options. The command-line front end builds these from
/// its layered configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveOptions {
    /// Advice names to keep; empty keeps every advice.
    pub include: Vec<String>,
    /// Advice names to drop, applied after `include`.
    pub exclude: Vec<String>,
    /// Weave the context section even when no advice is left.
    pub allow_empty: bool,
    /// Run advices in input order, ignoring their `order`.
    pub ignore_order: bool,
    /// Ask for the glue file even when the module needs none.
    pub print_js: bool,
}

impl WeaveOptions {
    /// `true` when the advice called `name` survives include/exclude.
    pub fn selects(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|n| n == name);
        included && !self.exclude.iter().any(|n| n == name)
    }
}
