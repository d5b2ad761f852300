//! Export configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::source::SourceResult;

/// What to export and how.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub export_meshes: bool,
    /// Stand-alone edges (not bounding a face)
    pub export_edges: bool,
    pub export_curves: bool,
    /// 3D polylines
    pub export_lines: bool,
    pub export_cameras: bool,
    pub export_materials: bool,
    pub export_normals: bool,
    /// One double-sided mesh per parent even when the sides differ
    pub export_double_sided: bool,
    /// Keep definitions and geometry in the root layer
    pub export_to_single_file: bool,
    /// Simplified, reference-free output when packaging a `.usdz`
    pub export_arkit_compatible: bool,
    /// Width / height of exported cameras without their own aspect ratio
    pub aspect_ratio: f64,
    /// Camera sensor height, in millimeters
    pub sensor_height: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            export_meshes: true,
            export_edges: false,
            export_curves: false,
            export_lines: false,
            export_cameras: true,
            export_materials: true,
            export_normals: false,
            export_double_sided: false,
            export_to_single_file: false,
            export_arkit_compatible: true,
            aspect_ratio: 16.0 / 9.0,
            sensor_height: 24.0,
        }
    }
}

impl ExportOptions {
    /// Load options from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Options with every geometry kind enabled.
    pub fn everything() -> Self {
        Self {
            export_edges: true,
            export_curves: true,
            export_lines: true,
            export_normals: true,
            ..Self::default()
        }
    }
}
