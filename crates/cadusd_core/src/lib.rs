//! CadUsd Core - CAD scene to USD export engine.
//!
//! This crate provides:
//!
//! - **Source access**: the `SourceDocument` trait and an in-memory `Document`
//! - **Export graph**: definitions written once and referenced by instances,
//!   groups written inline, meshes with per-face materials
//! - **USD output**: in-memory layers, USDA text and USDZ packaging
//!
//! # Example
//!
//! ```ignore
//! use cadusd_core::{convert, Document, ExportOptions, FileSystemWriter, LogProgress};
//!
//! let doc = Document::load("house.json")?;
//! let totals = convert(
//!     &doc,
//!     Path::new("house.usdz"),
//!     &ExportOptions::default(),
//!     &mut FileSystemWriter::new(),
//!     &mut LogProgress,
//! )?;
//! print!("{}", totals.summary());
//! ```

pub mod camera;
pub mod census;
pub mod exporter;
pub mod material;
pub mod mesh;
pub mod names;
pub mod options;
pub mod partition;
pub mod progress;
pub mod source;
pub mod stats;
pub mod texture;
pub mod usd;

// Re-export commonly used types
pub use exporter::{convert, ExportError, ExportResult, Exporter};
pub use options::ExportOptions;
pub use partition::OutputLayout;
pub use progress::{LogProgress, NoProgress, Progress, ProgressSink};
pub use source::{Document, Parent, SourceDocument, SourceError};
pub use stats::{ExportTotals, StatsDataPoint};
pub use usd::{AssetWriter, FileSystemWriter, MemoryWriter};
