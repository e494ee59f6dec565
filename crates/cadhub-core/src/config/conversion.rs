//! Conversion collaborator configuration.
//!
//! Names the external programs backing each strategy and the limits
//! applied when invoking them.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for the conversion strategies and their collaborators.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// External FBX conversion tool (invoked as `<tool> -i <in> -o <stem> -b`).
    pub external_tool_path: String,

    /// Timeout in seconds for a single external tool invocation.
    #[validate(range(min = 1, max = 7200))]
    pub external_tool_timeout_seconds: u64,

    /// Command running the CAD-kernel helper scripts.
    pub cad_kernel_command: String,

    /// Command running the mesh-processing helper scripts.
    pub mesh_command: String,

    /// Upper bound on a single CAD-kernel or mesh collaborator call.
    ///
    /// Must stay below the stale workspace age, or the sweep could remove
    /// the workspace of a job that is still running.
    #[validate(range(min = 1, max = 86400))]
    pub collaborator_timeout_seconds: u64,
}

impl ConversionConfig {
    /// Longest time a single strategy step may hold its workspace.
    pub fn longest_step_seconds(&self) -> u64 {
        self.external_tool_timeout_seconds
            .max(self.collaborator_timeout_seconds)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            external_tool_path: "FBX2glTF".to_string(),
            external_tool_timeout_seconds: 300,
            cad_kernel_command: "freecadcmd".to_string(),
            mesh_command: "python3".to_string(),
            collaborator_timeout_seconds: 1800,
        }
    }
}
