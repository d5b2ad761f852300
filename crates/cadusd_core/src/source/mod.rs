//! Source document access.
//!
//! The exporter reads a hierarchical CAD document through the
//! [`SourceDocument`] trait: definitions, instances, groups, faces, edges,
//! curves, polylines and scenes. Every entity is addressed by an opaque,
//! stable id (an arena index), never by name, because names in a source
//! document are not guaranteed to be unique.
//!
//! [`Document`] is an in-memory implementation that can be built in code or
//! loaded from JSON.

mod document;

pub use document::{CurveRecord, Document, FaceRecord, Parent};

use cadusd_math::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a source document.
///
/// Any of these aborts a conversion.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown {kind} id {id}")]
    UnknownEntity { kind: &'static str, id: u32 },

    #[error("Malformed face {id}: {message}")]
    MalformedFace { id: u32, message: String },
}

/// Result type for source document queries.
pub type SourceResult<T> = Result<T, SourceError>;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of a reusable definition.
    DefinitionId
);
entity_id!(InstanceId);
entity_id!(GroupId);
entity_id!(FaceId);
entity_id!(EdgeId);
entity_id!(CurveId);
entity_id!(PolylineId);

/// The children of a definition, a group, or the document root.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityList {
    pub instances: Vec<InstanceId>,
    pub groups: Vec<GroupId>,
    pub faces: Vec<FaceId>,
    /// Stand-alone edges only (edges bounding a face are not listed).
    pub edges: Vec<EdgeId>,
    pub curves: Vec<CurveId>,
    pub polylines: Vec<PolylineId>,
}

impl EntityList {
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
            && self.groups.is_empty()
            && self.faces.is_empty()
            && self.edges.is_empty()
            && self.curves.is_empty()
            && self.polylines.is_empty()
    }
}

/// A source material: a color, optionally with a texture image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    /// RGBA, 0-255 per channel
    pub color: [u8; 4],

    /// Path of the texture image, as stored in the source document
    #[serde(default)]
    pub texture: Option<String>,
}

impl Appearance {
    pub fn color(color: [u8; 4]) -> Self {
        Self {
            color,
            texture: None,
        }
    }

    pub fn textured(texture: impl Into<String>) -> Self {
        Self {
            color: [255, 255, 255, 255],
            texture: Some(texture.into()),
        }
    }
}

/// Hidden flag and layer visibility of a drawing element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visibility {
    pub hidden: bool,
    pub layer_visible: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            hidden: false,
            layer_visible: true,
        }
    }
}

impl Visibility {
    pub fn is_visible(&self) -> bool {
        !self.hidden && self.layer_visible
    }
}

fn identity_transform() -> [f64; 16] {
    DMat4::IDENTITY.to_cols_array()
}

/// A reusable definition (a template that instances place in the scene).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,

    /// Billboard behaviour: instances always turn to face the camera
    #[serde(default)]
    pub always_face_camera: bool,

    #[serde(default)]
    pub entities: EntityList,
}

/// A placed occurrence of a definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub name: String,

    pub definition: DefinitionId,

    /// Column-major 4x4, translation in inches
    #[serde(default = "identity_transform")]
    pub transform: [f64; 16],

    #[serde(flatten)]
    pub visibility: Visibility,
}

/// An anonymous, single-use container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub name: String,

    /// Column-major 4x4, translation in inches
    #[serde(default = "identity_transform")]
    pub transform: [f64; 16],

    #[serde(flatten)]
    pub visibility: Visibility,

    /// Material inherited by child faces that specify none
    #[serde(default)]
    pub material: Option<Appearance>,

    #[serde(default)]
    pub entities: EntityList,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: identity_transform(),
            visibility: Visibility::default(),
            material: None,
            entities: EntityList::default(),
        }
    }
}

/// Per-face attributes that do not require triangulation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceInfo {
    pub visibility: Visibility,
    pub front: Option<Appearance>,
    pub back: Option<Appearance>,
}

/// Triangulated face geometry, in source units.
#[derive(Clone, Debug, Default)]
pub struct FaceMesh {
    pub positions: Vec<DVec3>,
    pub normals: Vec<DVec3>,
    pub front_uvs: Vec<DVec2>,
    pub back_uvs: Vec<DVec2>,
    /// Triangle indices into `positions` (every 3 indices form a triangle)
    pub indices: Vec<u32>,
}

impl FaceMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A straight segment between two vertices, in source units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: DVec3,
    pub end: DVec3,
}

/// A named viewpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneCamera {
    pub name: String,
    pub eye: DVec3,
    pub target: DVec3,
    #[serde(default = "default_up")]
    pub up: DVec3,
    #[serde(default = "default_true")]
    pub perspective: bool,
    /// Vertical field of view in degrees (perspective cameras)
    #[serde(default = "default_fov")]
    pub fov_degrees: f64,
    /// Frustum height (orthographic cameras)
    #[serde(default = "default_ortho_height")]
    pub ortho_height: f64,
    /// Camera-specific aspect ratio, if the scene stores one
    #[serde(default)]
    pub aspect_ratio: Option<f64>,
}

fn default_up() -> DVec3 {
    DVec3::Z
}

fn default_true() -> bool {
    true
}

fn default_fov() -> f64 {
    35.0
}

fn default_ortho_height() -> f64 {
    1.0
}

/// Read-only access to a source CAD document.
///
/// Implementations wrap whatever SDK reads the real file. Every call may
/// fail; the exporter treats any failure as fatal.
pub trait SourceDocument {
    /// Entities at the top level of the document.
    fn root_entities(&self) -> SourceResult<EntityList>;

    /// All definitions, in document-declared order.
    fn definition_ids(&self) -> SourceResult<Vec<DefinitionId>>;

    fn definition(&self, id: DefinitionId) -> SourceResult<Definition>;

    fn instance(&self, id: InstanceId) -> SourceResult<Instance>;

    fn group(&self, id: GroupId) -> SourceResult<Group>;

    fn face(&self, id: FaceId) -> SourceResult<FaceInfo>;

    /// Triangulate a face. A face that yields no vertices is returned as an
    /// empty mesh rather than an error.
    fn face_mesh(&self, id: FaceId) -> SourceResult<FaceMesh>;

    fn edge(&self, id: EdgeId) -> SourceResult<Segment>;

    /// The edges making up a curve, in order.
    fn curve(&self, id: CurveId) -> SourceResult<Vec<Segment>>;

    fn polyline(&self, id: PolylineId) -> SourceResult<Vec<DVec3>>;

    /// Scenes (named viewpoints), in document order.
    fn scenes(&self) -> SourceResult<Vec<SceneCamera>>;
}
