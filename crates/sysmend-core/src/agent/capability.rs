//! Named inspection capabilities available to the diagnostic agent.
//!
//! A capability takes JSON arguments and always returns a string. Failures
//! are rendered as `"Error: ..."` text so the model sees them as evidence
//! rather than as control flow.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::inference::ToolCallRequest;

/// Tool name the model may call to hand in its final answer.
pub const SUBMIT_DIAGNOSIS_TOOL: &str = "submit_diagnosis";

/// Advertised shape of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn spec(&self) -> CapabilitySpec;

    /// Whether invoking this capability leaves the system unchanged.
    fn read_only(&self) -> bool;

    async fn invoke(&self, arguments: &Value) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability '{0}' is already registered")]
    Duplicate(String),

    #[error("capability '{0}' is not read-only")]
    Mutating(String),

    #[error("capability name '{0}' is reserved")]
    Reserved(String),
}

/// Name-to-capability map resolved once and injected into the agent.
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
    call_timeout: Duration,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            capabilities: BTreeMap::new(),
            call_timeout,
        }
    }

    /// Register a read-only capability.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), CapabilityError> {
        let name = capability.spec().name;
        if name == SUBMIT_DIAGNOSIS_TOOL {
            return Err(CapabilityError::Reserved(name));
        }
        if !capability.read_only() {
            return Err(CapabilityError::Mutating(name));
        }
        if self.capabilities.contains_key(&name) {
            return Err(CapabilityError::Duplicate(name));
        }
        self.capabilities.insert(name, capability);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    /// Specs in name order.
    pub fn specs(&self) -> Vec<CapabilitySpec> {
        self.capabilities.values().map(|c| c.spec()).collect()
    }

    /// Invoke a capability. Never fails; errors become tool output.
    pub async fn invoke(&self, call: &ToolCallRequest) -> String {
        let Some(capability) = self.capabilities.get(&call.name) else {
            warn!(tool = %call.name, "model requested unknown capability");
            return format!("Error: unknown capability '{}'", call.name);
        };

        debug!(tool = %call.name, arguments = %call.arguments, "invoking capability");
        match tokio::time::timeout(self.call_timeout, capability.invoke(&call.arguments)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(tool = %call.name, "capability timed out");
                format!(
                    "Error: capability '{}' timed out after {}ms",
                    call.name,
                    self.call_timeout.as_millis()
                )
            }
        }
    }
}
