//! Hub configuration.

use crate::{Error, Result};
use midihub_core::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub client_name: String,
    pub input_port_name: String,
    pub output_port_name: String,
    /// Name shared by the virtual source and virtual destination.
    pub virtual_endpoint_name: String,
    /// Per-source queue capacity; `None` means unbounded.
    pub queue_capacity: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    pub virtual_source_enabled: bool,
    pub virtual_destination_enabled: bool,
    pub network_enabled: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_name: "midihub Client".to_string(),
            input_port_name: "midihub Input Port".to_string(),
            output_port_name: "midihub Output Port".to_string(),
            virtual_endpoint_name: "midihub".to_string(),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            overflow_policy: OverflowPolicy::DropOldest,
            virtual_source_enabled: false,
            virtual_destination_enabled: false,
            network_enabled: false,
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("client_name", &self.client_name),
            ("input_port_name", &self.input_port_name),
            ("output_port_name", &self.output_port_name),
            ("virtual_endpoint_name", &self.virtual_endpoint_name),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{field} must not be empty")));
            }
        }

        if self.queue_capacity == Some(0) {
            return Err(Error::InvalidConfig(
                "queue_capacity must be at least 1 (use None for unbounded)".to_string(),
            ));
        }
        Ok(())
    }
}
