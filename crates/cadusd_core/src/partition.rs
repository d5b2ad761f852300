//! Output partitioning: which files a conversion writes.
//!
//! | output      | options          | layers written                                   |
//! |-------------|------------------|--------------------------------------------------|
//! | `a.usdz`    | ARKit            | `a.usda`, packaged into `a.usdz`                 |
//! | `a.usdz`    | otherwise        | `a.usda`, `a.components.usda`, `a.geom.usda`, packaged |
//! | `a.usd(a)`  | split (default)  | `a.usda`, `a.components.usda`, `a.geom.usda`     |
//! | `a.usd(a)`  | single file      | `a.usda`                                         |
//!
//! Textures go to `a_textures/` next to the root layer.

use std::path::{Path, PathBuf};

use crate::names::make_valid_identifier;
use crate::options::ExportOptions;

const ARCHIVE_EXTENSION: &str = "usdz";
const DEFAULT_LAYER_EXTENSION: &str = "usda";

/// The planned set of output files for one conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputLayout {
    /// File stem of the requested output
    pub base_name: String,
    pub directory: PathBuf,
    /// Extension used for every layer file
    pub layer_extension: String,
    pub root_layer: PathBuf,
    /// Definitions layer (split mode)
    pub components_layer: Option<PathBuf>,
    /// Top-level geometry sublayer (split mode)
    pub geometry_layer: Option<PathBuf>,
    /// USDZ archive to package everything into
    pub archive: Option<PathBuf>,
    pub texture_dir: PathBuf,
    /// Reference-free output for AR viewers
    pub arkit: bool,
}

impl OutputLayout {
    pub fn plan(output: &Path, options: &ExportOptions) -> Self {
        let directory = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let base_name = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        let extension = output
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| !e.is_empty());

        let packaged = extension.as_deref() == Some(ARCHIVE_EXTENSION);
        let layer_extension = match extension {
            Some(ext) if ext != ARCHIVE_EXTENSION => ext,
            _ => DEFAULT_LAYER_EXTENSION.to_string(),
        };
        let arkit = packaged && options.export_arkit_compatible;
        let split = !arkit && !options.export_to_single_file;

        let file = |suffix: &str| directory.join(format!("{}{}.{}", base_name, suffix, layer_extension));
        Self {
            root_layer: file(""),
            components_layer: split.then(|| file(".components")),
            geometry_layer: split.then(|| file(".geom")),
            archive: packaged.then(|| directory.join(format!("{}.{}", base_name, ARCHIVE_EXTENSION))),
            texture_dir: directory.join(format!("{}_textures", base_name)),
            directory,
            base_name,
            layer_extension,
            arkit,
        }
    }

    pub fn is_split(&self) -> bool {
        self.components_layer.is_some()
    }

    /// Name of the root prim; the base name made into a valid identifier.
    pub fn root_prim_name(&self) -> String {
        make_valid_identifier(&self.base_name)
    }

    /// Asset path a material uses for a texture file.
    pub fn texture_asset_path(&self, file_name: &str) -> String {
        format!("{}_textures/{}", self.base_name, file_name)
    }

    /// `./file` path of a layer, relative to the root layer.
    pub fn relative_path(layer: &Path) -> String {
        let name = layer
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("./{}", name)
    }

    /// Layer files in packaging order: the root layer first.
    pub fn layer_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.root_layer.clone()];
        files.extend(self.components_layer.iter().cloned());
        files.extend(self.geometry_layer.iter().cloned());
        files
    }
}
