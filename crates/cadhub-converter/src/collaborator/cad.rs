//! FreeCAD-backed CAD kernel.
//!
//! Each operation runs `freecadcmd -c <script>` with paths passed through
//! environment variables. Opening a file reports its object inventory on
//! stdout; exporting re-imports the file and writes the selected objects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CadDocument, CadKernel, Shape};
use crate::error::CollaboratorError;
use crate::executor::Invocation;

const INVENTORY_MARKER: &str = "CADHUB_INVENTORY ";

const INVENTORY_SCRIPT: &str = r#"
import json, os
import FreeCAD, Import
Import.open(os.environ["CADHUB_INPUT"])
doc = FreeCAD.ActiveDocument
objects = [] if doc is None else doc.Objects
print("CADHUB_INVENTORY " + json.dumps({
    "name": "" if doc is None else doc.Name,
    "objects": [{"name": o.Name, "has_shape": hasattr(o, "Shape")} for o in objects],
}))
if doc is not None:
    FreeCAD.closeDocument(doc.Name)
"#;

const EXPORT_SCRIPT: &str = r#"
import json, os
import FreeCAD, Import
Import.open(os.environ["CADHUB_INPUT"])
doc = FreeCAD.ActiveDocument
try:
    wanted = set(json.loads(os.environ["CADHUB_SHAPES"]))
    shapes = [o for o in doc.Objects if o.Name in wanted and hasattr(o, "Shape")]
    Import.export(shapes, os.environ["CADHUB_OUTPUT"])
finally:
    FreeCAD.closeDocument(doc.Name)
"#;

/// CAD kernel that drives FreeCAD's command-line interpreter.
#[derive(Debug, Clone)]
pub struct ScriptedCadKernel {
    command: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptedCadKernel {
    /// Use `command` (usually `freecadcmd`) with an optional per-call limit.
    pub fn new(command: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Inventory {
    name: String,
    objects: Vec<InventoryObject>,
}

#[derive(Debug, Deserialize)]
struct InventoryObject {
    name: String,
    has_shape: bool,
}

fn parse_inventory(stdout: &str) -> Result<Inventory, CollaboratorError> {
    let line = stdout
        .lines()
        .find_map(|l| l.strip_prefix(INVENTORY_MARKER))
        .ok_or_else(|| {
            CollaboratorError::Failed(format!(
                "CAD kernel produced no object inventory. Output:\n{stdout}"
            ))
        })?;
    serde_json::from_str(line).map_err(|e| {
        CollaboratorError::Failed(format!("Unreadable CAD kernel inventory: {e}"))
    })
}

#[async_trait]
impl CadKernel for ScriptedCadKernel {
    async fn open(&self, path: &Path) -> Result<Box<dyn CadDocument>, CollaboratorError> {
        let output = Invocation::new(&self.command)
            .arg("-c")
            .arg(INVENTORY_SCRIPT)
            .env("CADHUB_INPUT", path.to_string_lossy())
            .timeout(self.timeout)
            .run()
            .await?;

        let inventory = parse_inventory(&output.stdout)?;
        Ok(Box::new(ScriptedDocument {
            kernel: self.clone(),
            source: path.to_path_buf(),
            inventory,
        }))
    }
}

/// Document handle holding the inventory of an opened file.
#[derive(Debug)]
struct ScriptedDocument {
    kernel: ScriptedCadKernel,
    source: PathBuf,
    inventory: Inventory,
}

#[async_trait]
impl CadDocument for ScriptedDocument {
    fn name(&self) -> &str {
        &self.inventory.name
    }

    fn object_count(&self) -> usize {
        self.inventory.objects.len()
    }

    fn shapes(&self) -> Vec<Shape> {
        self.inventory
            .objects
            .iter()
            .filter(|o| o.has_shape)
            .map(|o| Shape {
                name: o.name.clone(),
            })
            .collect()
    }

    async fn export(&self, shapes: &[Shape], path: &Path) -> Result<(), CollaboratorError> {
        let names: Vec<&str> = shapes.iter().map(|s| s.name.as_str()).collect();
        let names = serde_json::to_string(&names)
            .map_err(|e| CollaboratorError::Failed(format!("Cannot encode shape list: {e}")))?;

        Invocation::new(&self.kernel.command)
            .arg("-c")
            .arg(EXPORT_SCRIPT)
            .env("CADHUB_INPUT", self.source.to_string_lossy())
            .env("CADHUB_OUTPUT", path.to_string_lossy())
            .env("CADHUB_SHAPES", names)
            .timeout(self.kernel.timeout)
            .run()
            .await?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        // The interpreter process already released its document.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inventory_skips_banner_lines() {
        let stdout = "FreeCAD 0.21.2\n(c) Juergen Riegel\nCADHUB_INVENTORY {\"name\":\"part\",\"objects\":[{\"name\":\"Body\",\"has_shape\":true},{\"name\":\"Sketch\",\"has_shape\":false}]}\n";
        let inventory = parse_inventory(stdout).unwrap();
        assert_eq!(inventory.name, "part");
        assert_eq!(inventory.objects.len(), 2);
        assert!(inventory.objects[0].has_shape);
    }

    #[test]
    fn test_parse_inventory_without_marker_fails() {
        let err = parse_inventory("Exception while processing file").unwrap_err();
        assert!(err.to_string().contains("no object inventory"));
    }

    #[test]
    fn test_document_shapes_filter_shapeless_objects() {
        let doc = ScriptedDocument {
            kernel: ScriptedCadKernel::new("freecadcmd", None),
            source: PathBuf::from("part.step"),
            inventory: Inventory {
                name: "part".to_string(),
                objects: vec![
                    InventoryObject {
                        name: "Body".to_string(),
                        has_shape: true,
                    },
                    InventoryObject {
                        name: "Origin".to_string(),
                        has_shape: false,
                    },
                ],
            },
        };
        assert_eq!(doc.object_count(), 2);
        assert_eq!(
            doc.shapes(),
            vec![Shape {
                name: "Body".to_string()
            }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_reads_inventory_from_stub_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("freecadcmd");
        std::fs::write(
            &stub,
            "#!/bin/sh\necho 'CADHUB_INVENTORY {\"name\":\"stub\",\"objects\":[]}'\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let kernel = ScriptedCadKernel::new(&stub, Some(Duration::from_secs(10)));
        let doc = kernel.open(Path::new("empty.step")).await.unwrap();
        assert_eq!(doc.name(), "stub");
        assert_eq!(doc.object_count(), 0);
        doc.close();
    }
}
