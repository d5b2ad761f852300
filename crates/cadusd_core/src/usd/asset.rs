//! Persisting layers, textures and USDZ archives.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layer::{Layer, WriteResult};
use super::writer::write_usda;

/// USDZ entries must start on 64-byte boundaries.
const USDZ_ALIGNMENT: u16 = 64;

/// Destination for everything an export produces.
pub trait AssetWriter {
    /// Persist a layer at `path`.
    fn write_layer(&mut self, layer: &Layer, path: &Path) -> WriteResult<()>;

    /// Copy a texture image. Returns `false` when the source image does not
    /// exist; the material still refers to the destination path.
    fn copy_texture(&mut self, source: &Path, dest: &Path) -> WriteResult<bool>;

    /// Bundle `members` into a USDZ archive. The first member must be the
    /// root layer. Entry names are relative to `base_dir`.
    fn package(&mut self, archive: &Path, base_dir: &Path, members: &[PathBuf]) -> WriteResult<()>;
}

/// Writes USDA text files and zip archives to disk.
#[derive(Debug, Default)]
pub struct FileSystemWriter {
    /// Textures whose destination is their own source. Packaging leaves them
    /// on disk.
    in_place: Vec<PathBuf>,
}

impl FileSystemWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn ensure_parent(path: &Path) -> WriteResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Archive entry name: relative to `base_dir`, forward slashes.
fn entry_name(member: &Path, base_dir: &Path) -> String {
    let relative = member.strip_prefix(base_dir).unwrap_or(member);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl AssetWriter for FileSystemWriter {
    fn write_layer(&mut self, layer: &Layer, path: &Path) -> WriteResult<()> {
        ensure_parent(path)?;
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(write_usda(layer).as_bytes())?;
        file.flush()?;
        log::debug!("Wrote layer {}", path.display());
        Ok(())
    }

    fn copy_texture(&mut self, source: &Path, dest: &Path) -> WriteResult<bool> {
        if !source.is_file() {
            log::warn!("Texture {} not found; skipping copy", source.display());
            return Ok(false);
        }
        if same_file(source, dest) {
            log::debug!("Texture {} is already in place", dest.display());
            if !self.in_place.iter().any(|p| p == dest) {
                self.in_place.push(dest.to_path_buf());
            }
            return Ok(true);
        }
        ensure_parent(dest)?;
        fs::copy(source, dest)?;
        Ok(true)
    }

    fn package(&mut self, archive: &Path, base_dir: &Path, members: &[PathBuf]) -> WriteResult<()> {
        ensure_parent(archive)?;
        let mut zip = ZipWriter::new(File::create(archive)?);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .with_alignment(USDZ_ALIGNMENT);

        let mut packaged = Vec::with_capacity(members.len());
        for member in members {
            if !member.is_file() {
                log::warn!("{} missing; not packaged", member.display());
                continue;
            }
            zip.start_file(entry_name(member, base_dir), options)?;
            zip.write_all(&fs::read(member)?)?;
            packaged.push(member);
        }
        zip.finish()?;
        log::info!("Packaged {} files into {}", packaged.len(), archive.display());

        let mut dirs = Vec::new();
        for member in packaged {
            if self.in_place.iter().any(|p| p == member) {
                continue;
            }
            fs::remove_file(member)?;
            if let Some(dir) = member.parent() {
                if dir != base_dir && !dirs.iter().any(|d: &PathBuf| d == dir) {
                    dirs.push(dir.to_path_buf());
                }
            }
        }
        for dir in dirs {
            // Only succeeds once the directory is empty.
            let _ = fs::remove_dir(&dir);
        }
        Ok(())
    }
}

/// An archive recorded by [`MemoryWriter`].
#[derive(Clone, Debug, PartialEq)]
pub struct PackagedArchive {
    pub path: PathBuf,
    /// Entry names, in archive order
    pub entries: Vec<String>,
}

/// Keeps every output in memory. Used by tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    pub layers: BTreeMap<PathBuf, Layer>,
    /// Layer paths in the order they were written
    pub write_order: Vec<PathBuf>,
    /// `(source, dest)` pairs
    pub textures: Vec<(PathBuf, PathBuf)>,
    pub archives: Vec<PackagedArchive>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The layer written at a path ending in `file_name`.
    pub fn layer_named(&self, file_name: &str) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|(path, _)| path.file_name().map_or(false, |n| n == file_name))
            .map(|(_, layer)| layer)
    }
}

impl AssetWriter for MemoryWriter {
    fn write_layer(&mut self, layer: &Layer, path: &Path) -> WriteResult<()> {
        self.layers.insert(path.to_path_buf(), layer.clone());
        self.write_order.push(path.to_path_buf());
        Ok(())
    }

    fn copy_texture(&mut self, source: &Path, dest: &Path) -> WriteResult<bool> {
        self.textures.push((source.to_path_buf(), dest.to_path_buf()));
        Ok(true)
    }

    fn package(&mut self, archive: &Path, base_dir: &Path, members: &[PathBuf]) -> WriteResult<()> {
        self.archives.push(PackagedArchive {
            path: archive.to_path_buf(),
            entries: members.iter().map(|m| entry_name(m, base_dir)).collect(),
        });
        Ok(())
    }
}
