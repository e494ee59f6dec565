//! External command-line converter (FBX2glTF by default).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::ExternalTool;
use crate::executor::{Invocation, ToolError, ToolOutput};

/// Runs `<program> -i <input> -o <output-stem> -b` with a hard timeout.
#[derive(Debug, Clone)]
pub struct CommandLineTool {
    program: PathBuf,
    timeout: Duration,
}

impl CommandLineTool {
    /// Create a tool runner.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn invocation(&self, input: &Path, output_stem: &Path) -> Invocation {
        Invocation::new(&self.program)
            .arg("-i")
            .path_arg(input)
            .arg("-o")
            .path_arg(output_stem)
            .arg("-b")
            .timeout(Some(self.timeout))
    }
}

#[async_trait]
impl ExternalTool for CommandLineTool {
    async fn convert(&self, input: &Path, output_stem: &Path) -> Result<ToolOutput, ToolError> {
        self.invocation(input, output_stem).run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_follows_tool_convention() {
        let tool = CommandLineTool::new("FBX2glTF", Duration::from_secs(300));
        let inv = tool.invocation(Path::new("/in/model.fbx"), Path::new("/out/model"));
        assert_eq!(inv.args, vec!["-i", "/in/model.fbx", "-o", "/out/model", "-b"]);
        assert_eq!(inv.timeout, Some(Duration::from_secs(300)));
        assert_eq!(inv.tool_name(), "FBX2glTF");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("FBX2glTF");
        std::fs::write(&script, "#!/bin/sh\necho 'bad input' >&2\nexit 1\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = CommandLineTool::new(&script, Duration::from_secs(10));
        let err = tool
            .convert(Path::new("model.fbx"), &dir.path().join("model"))
            .await
            .unwrap_err();
        let text = err.diagnostic();
        assert!(text.starts_with("FBX2glTF execution failed (exit code 1)."));
        assert!(text.contains("bad input"));
    }
}
