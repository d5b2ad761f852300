//! Texture bookkeeping for materials.
//!
//! Materials refer to textures by file name inside the output's texture
//! directory. The catalog remembers where each file name came from so the
//! images can be copied (and packaged) once the scene is written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::usd::{AssetWriter, WriteResult};

/// File name of a texture path as stored in a source document.
///
/// Paths may come from another platform, so both `/` and `\` separate
/// directories.
pub fn texture_file_name(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Textures referenced by exported materials.
#[derive(Debug, Default)]
pub struct TextureCatalog {
    /// Source path by file name, first registration wins
    sources: BTreeMap<String, PathBuf>,

    /// Base directory for resolving relative source paths
    base_dir: Option<PathBuf>,
}

impl TextureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog that resolves relative texture paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources: BTreeMap::new(),
            base_dir: Some(base_dir.into()),
        }
    }

    /// Record a texture and return its file name.
    pub fn register(&mut self, source: &str) -> String {
        let name = texture_file_name(source);
        if !self.sources.contains_key(&name) {
            let resolved = self.resolve_path(source);
            self.sources.insert(name.clone(), resolved);
        } else if self.sources.get(&name) != Some(&self.resolve_path(source)) {
            log::warn!(
                "Texture {} shares its file name with another texture; keeping the first",
                source
            );
        }
        name
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Copy every registered texture into `dir`. Returns the destinations
    /// that were actually written.
    pub fn copy_all<W: AssetWriter + ?Sized>(&self, writer: &mut W, dir: &Path) -> WriteResult<Vec<PathBuf>> {
        let mut copied = Vec::with_capacity(self.sources.len());
        for (name, source) in &self.sources {
            let dest = dir.join(name);
            if writer.copy_texture(source, &dest)? {
                copied.push(dest);
            }
        }
        log::debug!("Copied {} of {} textures", copied.len(), self.sources.len());
        Ok(copied)
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        // Windows-style paths are never resolved against the base dir.
        let native = Path::new(path);
        if native.is_absolute() || path.contains('\\') {
            native.to_path_buf()
        } else if let Some(base) = &self.base_dir {
            base.join(native)
        } else {
            native.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::MemoryWriter;

    #[test]
    fn test_texture_file_name() {
        assert_eq!(texture_file_name("wood.jpg"), "wood.jpg");
        assert_eq!(texture_file_name("/Users/me/tex/wood.jpg"), "wood.jpg");
        assert_eq!(
            texture_file_name("C:\\Users\\Owner\\Pictures\\norway_maple_tree.jpg"),
            "norway_maple_tree.jpg"
        );
    }

    #[test]
    fn test_register_dedups_by_file_name() {
        let mut catalog = TextureCatalog::with_base_dir("/docs");
        assert_eq!(catalog.register("tex/wood.jpg"), "wood.jpg");
        assert_eq!(catalog.register("tex/wood.jpg"), "wood.jpg");
        assert_eq!(catalog.register("stone.png"), "stone.png");
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_copy_all_uses_resolved_sources() {
        let mut catalog = TextureCatalog::with_base_dir("/docs");
        catalog.register("tex/wood.jpg");
        let mut writer = MemoryWriter::new();

        let copied = catalog
            .copy_all(&mut writer, Path::new("/out/model_textures"))
            .unwrap();

        assert_eq!(copied, vec![PathBuf::from("/out/model_textures/wood.jpg")]);
        assert_eq!(writer.textures[0].0, PathBuf::from("/docs/tex/wood.jpg"));
    }
}
