//! USD (Universal Scene Description) output for CadUsd.
//!
//! The exporter builds one or more in-memory [`Layer`]s made of
//! [`PrimSpec`]s, then hands them to an [`AssetWriter`] that persists them.
//!
//! ## Supported Output
//!
//! - `Xform`, `Scope`, `Mesh`, `GeomSubset`, `BasisCurves`, `Camera`
//! - `Material` / `Shader` networks (UsdPreviewSurface, UsdUVTexture)
//! - Internal and external references, sublayers
//! - USDA (ASCII) text and USDZ archives
//!
//! ## Not Supported
//!
//! - Binary `.usdc` crate files (`.usd` layers are written as ASCII)
//! - Time samples
//!
//! # Example
//!
//! ```ignore
//! use cadusd_core::usd::{write_usda, Layer, PrimPath};
//!
//! let mut layer = Layer::new("scene.usda");
//! layer.define_prim(&PrimPath::root().child("World"), "Xform")?;
//! println!("{}", write_usda(&layer));
//! ```

mod asset;
mod layer;
mod types;
mod writer;

pub use asset::*;
pub use layer::*;
pub use types::*;
pub use writer::*;
