//! Material resolution, subset coalescing and material emission.
//!
//! Every triangle of an assembled mesh carries a [`MaterialTag`] per side.
//! [`coalesce`] folds those tags into [`MeshSubset`]s, one per distinct
//! [`MaterialKey`], in first-seen order. [`MaterialCache`] makes sure each
//! key is written as a `Material` prim at most once below a material root.

use std::collections::HashMap;

use cadusd_math::Vec3;

use crate::names::{make_valid_identifier, NameScope};
use crate::source::Appearance;
use crate::usd::{Attribute, Layer, PrimPath, Value, WriteResult};

/// Front color of a face that has no material.
pub const DEFAULT_FRONT_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Back color of a face that has no material.
pub const DEFAULT_BACK_COLOR: [u8; 4] = [198, 214, 224, 255];

/// Which side of a face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn default_color(self) -> [u8; 4] {
        match self {
            Side::Front => DEFAULT_FRONT_COLOR,
            Side::Back => DEFAULT_BACK_COLOR,
        }
    }
}

/// Identity of a material: a texture path, an RGBA color, or the shared
/// fallback for faces without any material.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialKey {
    /// Texture file name (directories stripped)
    Texture(String),
    Color([u8; 4]),
    /// Neither the face nor an enclosing group has a material. Front and
    /// back sides share it.
    Default,
}

impl MaterialKey {
    pub fn of(appearance: &Appearance) -> Self {
        match &appearance.texture {
            Some(texture) => MaterialKey::Texture(crate::texture::texture_file_name(texture)),
            None => MaterialKey::Color(appearance.color),
        }
    }

    pub fn is_textured(&self) -> bool {
        matches!(self, MaterialKey::Texture(_))
    }

    /// Candidate prim name for the material.
    pub fn material_name(&self) -> String {
        match self {
            MaterialKey::Texture(file) => {
                let stem = file.rsplit_once('.').map_or(file.as_str(), |(stem, _)| stem);
                make_valid_identifier(stem)
            }
            MaterialKey::Color([r, g, b, a]) if *a == 255 => {
                format!("Color_{:02X}{:02X}{:02X}", r, g, b)
            }
            MaterialKey::Color([r, g, b, a]) => {
                format!("Color_{:02X}{:02X}{:02X}_A{}", r, g, b, a)
            }
            MaterialKey::Default => "Default".to_string(),
        }
    }
}

/// Material assignment of one triangle side.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialTag {
    pub key: MaterialKey,
    /// Display color (also the diffuse color of color materials)
    pub color: [u8; 4],
}

impl MaterialTag {
    pub fn new(appearance: &Appearance) -> Self {
        Self {
            key: MaterialKey::of(appearance),
            color: appearance.color,
        }
    }

    /// Tag of one face side, given the face's own material or else the one
    /// inherited from enclosing groups. Without either the side gets the
    /// [`MaterialKey::Default`] material and its side's display color.
    pub fn resolve(appearance: Option<&Appearance>, side: Side) -> Self {
        match appearance {
            Some(appearance) => Self::new(appearance),
            None => Self {
                key: MaterialKey::Default,
                color: side.default_color(),
            },
        }
    }
}

/// Triangles of one mesh sharing a material.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshSubset {
    pub key: MaterialKey,
    /// Color of the first triangle with this key
    pub color: [u8; 4],
    /// Mesh face (triangle) indices, ascending
    pub faces: Vec<i32>,
}

/// Group triangles by material key. One subset per distinct key, ordered
/// by first appearance.
pub fn coalesce(tags: &[MaterialTag]) -> Vec<MeshSubset> {
    let mut subsets: Vec<MeshSubset> = Vec::new();
    let mut by_key: HashMap<&MaterialKey, usize> = HashMap::new();

    for (face, tag) in tags.iter().enumerate() {
        let index = *by_key.entry(&tag.key).or_insert_with(|| {
            subsets.push(MeshSubset {
                key: tag.key.clone(),
                color: tag.color,
                faces: Vec::new(),
            });
            subsets.len() - 1
        });
        subsets[index].faces.push(face as i32);
    }
    subsets
}

/// Convert an 8-bit color to linear-ish float RGB and opacity.
pub fn color_to_rgb_opacity(color: [u8; 4]) -> (Vec3, f32) {
    let [r, g, b, a] = color;
    (
        Vec3::new(r as f32, g as f32, b as f32) / 255.0,
        a as f32 / 255.0,
    )
}

/// Material prims already written below one material root.
///
/// Texture materials and the default material live for as long as the root
/// does. Color materials are forgotten at every
/// [`reset_batch`](Self::reset_batch) unless color sharing is enabled.
#[derive(Debug)]
pub struct MaterialCache {
    /// `Materials` scope of the root
    scope: PrimPath,
    names: NameScope,
    persistent: HashMap<MaterialKey, PrimPath>,
    batch: HashMap<MaterialKey, PrimPath>,
    share_colors: bool,
}

impl MaterialCache {
    pub fn new(root: &PrimPath, share_colors: bool) -> Self {
        Self {
            scope: root.child("Materials"),
            names: NameScope::new(),
            persistent: HashMap::new(),
            batch: HashMap::new(),
            share_colors,
        }
    }

    pub fn reset_batch(&mut self) {
        self.batch.clear();
    }

    pub fn get(&self, key: &MaterialKey) -> Option<&PrimPath> {
        self.persistent.get(key).or_else(|| self.batch.get(key))
    }

    fn remember(&mut self, key: MaterialKey, path: PrimPath) {
        if !matches!(key, MaterialKey::Color(_)) || self.share_colors {
            self.persistent.insert(key, path);
        } else {
            self.batch.insert(key, path);
        }
    }

    /// Path of the material for `subset`, writing it on first use.
    ///
    /// Returns the path and the number of shaders written (zero on a cache
    /// hit).
    pub fn material_for(
        &mut self,
        layer: &mut Layer,
        subset: &MeshSubset,
        texture_asset: impl FnOnce(&str) -> String,
    ) -> WriteResult<(PrimPath, u64)> {
        if let Some(path) = self.get(&subset.key) {
            return Ok((path.clone(), 0));
        }
        if layer.prim(&self.scope).is_none() {
            layer.define_prim(&self.scope, "Scope")?;
        }

        let path = self.scope.child(&self.names.claim(&subset.key.material_name()));
        let shaders = match &subset.key {
            MaterialKey::Texture(file) => {
                define_texture_material(layer, &path, &texture_asset(file), subset.color)?
            }
            MaterialKey::Color(color) => define_color_material(layer, &path, *color)?,
            MaterialKey::Default => define_color_material(layer, &path, DEFAULT_FRONT_COLOR)?,
        };
        self.remember(subset.key.clone(), path.clone());
        Ok((path, shaders))
    }
}

fn define_material(layer: &mut Layer, path: &PrimPath, surface: &PrimPath) -> WriteResult<()> {
    layer.define_prim(path, "Material")?.set_attribute(Attribute::connected(
        "outputs:surface",
        "token",
        surface.property("outputs:surface"),
    ));
    Ok(())
}

/// Define the UsdPreviewSurface shader shared by both material kinds.
fn define_preview_surface(layer: &mut Layer, path: &PrimPath, opacity: f32) -> WriteResult<()> {
    let shader = layer.define_prim(path, "Shader")?;
    shader.set_attribute(
        Attribute::new("info:id", "token", Value::token("UsdPreviewSurface")).uniform(),
    );
    shader.set_attribute(Attribute::new("inputs:opacity", "float", Value::Float(opacity)));
    shader.set_attribute(Attribute::new("inputs:useSpecularWorkflow", "int", Value::Int(0)));
    shader.set_attribute(Attribute::new("inputs:metallic", "float", Value::Float(0.0)));
    shader.set_attribute(Attribute::new("inputs:roughness", "float", Value::Float(0.8)));
    shader.set_attribute(Attribute::new("inputs:ior", "float", Value::Float(1.5)));
    shader.set_attribute(Attribute::declared("outputs:surface", "token"));
    Ok(())
}

/// A single UsdPreviewSurface with a constant diffuse color. One shader.
pub fn define_color_material(layer: &mut Layer, path: &PrimPath, color: [u8; 4]) -> WriteResult<u64> {
    let surface = path.child("PbrPreview");
    define_material(layer, path, &surface)?;

    let (rgb, opacity) = color_to_rgb_opacity(color);
    define_preview_surface(layer, &surface, opacity)?;
    layer.existing_prim_mut(&surface)?.set_attribute(Attribute::new(
        "inputs:diffuseColor",
        "color3f",
        Value::Float3(rgb),
    ));
    Ok(1)
}

/// UsdPreviewSurface fed by a UsdUVTexture reading the `st` primvar.
/// Three shaders.
pub fn define_texture_material(
    layer: &mut Layer,
    path: &PrimPath,
    asset_path: &str,
    color: [u8; 4],
) -> WriteResult<u64> {
    let surface = path.child("PbrPreview");
    let primvar = path.child("Primvar");
    let texture = path.child("Texture");
    define_material(layer, path, &surface)?;

    let (_, opacity) = color_to_rgb_opacity(color);
    define_preview_surface(layer, &surface, opacity)?;
    layer.existing_prim_mut(&surface)?.set_attribute(Attribute::connected(
        "inputs:diffuseColor",
        "color3f",
        texture.property("outputs:rgb"),
    ));

    let reader = layer.define_prim(&primvar, "Shader")?;
    reader.set_attribute(
        Attribute::new("info:id", "token", Value::token("UsdPrimvarReader_float2")).uniform(),
    );
    reader.set_attribute(Attribute::new("inputs:varname", "token", Value::token("st")));
    reader.set_attribute(Attribute::declared("outputs:result", "float2"));

    let sampler = layer.define_prim(&texture, "Shader")?;
    sampler.set_attribute(
        Attribute::new("info:id", "token", Value::token("UsdUVTexture")).uniform(),
    );
    sampler.set_attribute(Attribute::new(
        "inputs:file",
        "asset",
        Value::Asset(asset_path.to_string()),
    ));
    sampler.set_attribute(Attribute::new("inputs:wrapS", "token", Value::token("repeat")));
    sampler.set_attribute(Attribute::new("inputs:wrapT", "token", Value::token("repeat")));
    sampler.set_attribute(Attribute::connected(
        "inputs:st",
        "float2",
        primvar.property("outputs:result"),
    ));
    sampler.set_attribute(Attribute::declared("outputs:rgb", "float3"));
    Ok(3)
}
