//! What a weaving run hands back.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use weave_module::ModuleContext;

/// Join points woven by one advice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceReport {
    pub name: String,
    pub join_points: usize,
}

/// Serializable summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveSummary {
    pub applied: bool,
    pub changed: bool,
    pub advices: Vec<AdviceReport>,
    pub input_sha256: String,
    pub output_sha256: String,
}

#[derive(Debug)]
pub struct TransformationResult {
    module: ModuleContext,
    applied: bool,
    advices: Vec<AdviceReport>,
    input_sha256: String,
    output_sha256: String,
}

impl TransformationResult {
    /// Wrap the woven module. `input_text` is the module's printed text
    /// before weaving, so the digests compare like with like.
    pub(crate) fn new(module: ModuleContext, input_text: &str, applied: bool, advices: Vec<AdviceReport>) -> Self {
        let output_sha256 = sha256_hex(&module.to_text());
        Self {
            module,
            applied,
            advices,
            input_sha256: sha256_hex(input_text),
            output_sha256,
        }
    }

    pub fn module(&self) -> &ModuleContext {
        &self.module
    }

    pub fn into_module(self) -> ModuleContext {
        self.module
    }

    /// `false` when the run stopped because no advice was left.
    pub fn applied(&self) -> bool {
        self.applied
    }

    pub fn advices(&self) -> &[AdviceReport] {
        &self.advices
    }

    pub fn input_sha256(&self) -> &str {
        &self.input_sha256
    }

    pub fn output_sha256(&self) -> &str {
        &self.output_sha256
    }

    pub fn changed(&self) -> bool {
        self.input_sha256 != self.output_sha256
    }

    /// Compact text of the woven module.
    pub fn text(&self) -> String {
        self.module.to_text()
    }

    pub fn pretty(&self) -> String {
        self.module.to_pretty()
    }

    pub fn summary(&self) -> WeaveSummary {
        WeaveSummary {
            applied: self.applied,
            changed: self.changed(),
            advices: self.advices.clone(),
            input_sha256: self.input_sha256.clone(),
            output_sha256: self.output_sha256.clone(),
        }
    }

    /// The summary as JSON, for diagnostics.
    pub fn summary_json(&self) -> String {
        serde_json::to_string(&self.summary()).unwrap_or_default()
    }
}

/// Lower-case hex SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
