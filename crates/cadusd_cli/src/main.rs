//! cadusd - convert a CAD document (JSON) to USD.
//!
//! Run with: cargo run --bin cadusd -- house.json out/house.usdz

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use cadusd_core::{Document, ExportOptions, Exporter, FileSystemWriter, LogProgress};

#[derive(Parser, Debug)]
#[command(name = "cadusd", version, about = "Convert a CAD document to USD")]
struct Args {
    /// Source document (JSON)
    input: PathBuf,

    /// Output file: .usda, .usd or .usdz
    output: PathBuf,

    /// JSON file with export options; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Export stand-alone edges
    #[arg(long, overrides_with = "no_edges")]
    edges: bool,

    #[arg(long, overrides_with = "edges", hide = true)]
    no_edges: bool,

    #[arg(long, overrides_with = "no_curves")]
    curves: bool,

    #[arg(long, overrides_with = "curves", hide = true)]
    no_curves: bool,

    /// Export 3D polylines
    #[arg(long, overrides_with = "no_lines")]
    lines: bool,

    #[arg(long, overrides_with = "lines", hide = true)]
    no_lines: bool,

    /// Write per-vertex normals
    #[arg(long, overrides_with = "no_normals")]
    normals: bool,

    #[arg(long, overrides_with = "normals", hide = true)]
    no_normals: bool,

    /// One double-sided mesh per parent even when the sides differ
    #[arg(long, overrides_with = "no_double_sided")]
    double_sided: bool,

    #[arg(long, overrides_with = "double_sided", hide = true)]
    no_double_sided: bool,

    /// Keep definitions and geometry in the root layer
    #[arg(long, overrides_with = "no_single_file")]
    single_file: bool,

    #[arg(long, overrides_with = "single_file", hide = true)]
    no_single_file: bool,

    #[arg(long, overrides_with = "no_meshes", hide = true)]
    meshes: bool,

    #[arg(long, overrides_with = "meshes")]
    no_meshes: bool,

    #[arg(long, overrides_with = "no_cameras", hide = true)]
    cameras: bool,

    #[arg(long, overrides_with = "cameras")]
    no_cameras: bool,

    #[arg(long, overrides_with = "no_materials", hide = true)]
    materials: bool,

    #[arg(long, overrides_with = "materials")]
    no_materials: bool,

    #[arg(long, overrides_with = "no_arkit", hide = true)]
    arkit: bool,

    /// Keep references and instancing when writing a .usdz
    #[arg(long, overrides_with = "arkit")]
    no_arkit: bool,

    /// Aspect ratio of cameras without their own
    #[arg(long)]
    aspect_ratio: Option<f64>,

    /// Camera sensor height in millimeters
    #[arg(long)]
    sensor_height: Option<f64>,
}

/// `Some(true)` for `--x`, `Some(false)` for `--no-x`, `None` when neither
/// was given. The last of the pair on the command line wins.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Args {
    fn export_options(&self) -> Result<ExportOptions> {
        let mut options = match &self.options {
            Some(path) => ExportOptions::load(path)
                .with_context(|| format!("Failed to read options from {}", path.display()))?,
            None => ExportOptions::default(),
        };
        self.apply(&mut options);
        Ok(options)
    }

    /// Override `options` with every flag given on the command line.
    fn apply(&self, options: &mut ExportOptions) {
        let switches = [
            (switch(self.edges, self.no_edges), &mut options.export_edges),
            (switch(self.curves, self.no_curves), &mut options.export_curves),
            (switch(self.lines, self.no_lines), &mut options.export_lines),
            (switch(self.normals, self.no_normals), &mut options.export_normals),
            (
                switch(self.double_sided, self.no_double_sided),
                &mut options.export_double_sided,
            ),
            (
                switch(self.single_file, self.no_single_file),
                &mut options.export_to_single_file,
            ),
            (switch(self.meshes, self.no_meshes), &mut options.export_meshes),
            (switch(self.cameras, self.no_cameras), &mut options.export_cameras),
            (switch(self.materials, self.no_materials), &mut options.export_materials),
            (switch(self.arkit, self.no_arkit), &mut options.export_arkit_compatible),
        ];
        for (value, option) in switches {
            if let Some(value) = value {
                *option = value;
            }
        }

        if let Some(aspect_ratio) = self.aspect_ratio {
            options.aspect_ratio = aspect_ratio;
        }
        if let Some(sensor_height) = self.sensor_height {
            options.sensor_height = sensor_height;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let options = args.export_options()?;

    log::info!("Loading {}", args.input.display());
    let doc = Document::load(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;

    let texture_dir = args
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let totals = Exporter::new(&doc, options)
        .texture_base_dir(texture_dir)
        .export(&args.output, &mut FileSystemWriter::new(), &mut LogProgress)
        .with_context(|| format!("Failed to export {}", args.output.display()))?;

    print!("{}", totals.summary());
    Ok(())
}
