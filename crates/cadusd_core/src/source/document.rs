//! In-memory source document.
//!
//! Entities live in flat arenas indexed by their ids. Faces are stored as
//! planar polygons and fan-triangulated on request, the same way a CAD SDK
//! mesh helper hands back triangles for a face.

use std::path::Path;

use cadusd_math::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use super::*;

/// Where a newly added entity is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent {
    Root,
    Definition(DefinitionId),
    Group(GroupId),
}

/// A planar polygon face.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FaceRecord {
    /// Outer loop, in order
    pub outer: Vec<DVec3>,

    /// Face normal; computed from the loop when absent
    #[serde(default)]
    pub normal: Option<DVec3>,

    /// Per-loop-vertex UVs for the front side
    #[serde(default)]
    pub front_uvs: Option<Vec<DVec2>>,

    /// Per-loop-vertex UVs for the back side
    #[serde(default)]
    pub back_uvs: Option<Vec<DVec2>>,

    #[serde(default)]
    pub front: Option<Appearance>,

    #[serde(default)]
    pub back: Option<Appearance>,

    #[serde(flatten)]
    pub visibility: Visibility,
}

impl FaceRecord {
    /// A face from its outer loop, with no materials.
    pub fn from_loop(outer: Vec<DVec3>) -> Self {
        Self {
            outer,
            ..Default::default()
        }
    }

    pub fn with_front(mut self, appearance: Appearance) -> Self {
        self.front = Some(appearance);
        self
    }

    pub fn with_back(mut self, appearance: Appearance) -> Self {
        self.back = Some(appearance);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<DVec2>) -> Self {
        self.front_uvs = Some(uvs.clone());
        self.back_uvs = Some(uvs);
        self
    }

    /// Polygon normal using Newell's method.
    fn loop_normal(&self) -> DVec3 {
        let mut n = DVec3::ZERO;
        for (i, a) in self.outer.iter().enumerate() {
            let b = self.outer[(i + 1) % self.outer.len()];
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
        }
        n.normalize_or_zero()
    }
}

/// A curve: an ordered run of edges.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CurveRecord {
    pub edges: Vec<EdgeId>,
}

/// An in-memory CAD document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub root: EntityList,
    pub definitions: Vec<Definition>,
    pub instances: Vec<Instance>,
    pub groups: Vec<Group>,
    pub faces: Vec<FaceRecord>,
    pub edges: Vec<Segment>,
    pub curves: Vec<CurveRecord>,
    pub polylines: Vec<Vec<DVec3>>,
    pub scenes: Vec<SceneCamera>,
}

fn lookup<'a, T>(items: &'a [T], kind: &'static str, id: u32) -> SourceResult<&'a T> {
    items
        .get(id as usize)
        .ok_or(SourceError::UnknownEntity { kind, id })
}

fn next_id(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from JSON text.
    pub fn from_json_str(content: &str) -> SourceResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a document from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    fn entities_mut(&mut self, parent: Parent) -> &mut EntityList {
        match parent {
            Parent::Root => &mut self.root,
            Parent::Definition(id) => &mut self.definitions[id.index()].entities,
            Parent::Group(id) => &mut self.groups[id.index()].entities,
        }
    }

    /// Add a definition and return its id.
    pub fn add_definition(&mut self, name: impl Into<String>) -> DefinitionId {
        let id = DefinitionId(next_id(self.definitions.len()));
        self.definitions.push(Definition {
            name: name.into(),
            ..Default::default()
        });
        id
    }

    /// Place an instance of `definition` under `parent`.
    pub fn add_instance(
        &mut self,
        parent: Parent,
        definition: DefinitionId,
        name: impl Into<String>,
        transform: DMat4,
    ) -> InstanceId {
        let id = InstanceId(next_id(self.instances.len()));
        self.instances.push(Instance {
            name: name.into(),
            definition,
            transform: transform.to_cols_array(),
            visibility: Visibility::default(),
        });
        self.entities_mut(parent).instances.push(id);
        id
    }

    /// Add an (initially empty) group under `parent`.
    pub fn add_group(&mut self, parent: Parent, name: impl Into<String>, transform: DMat4) -> GroupId {
        let id = GroupId(next_id(self.groups.len()));
        self.groups.push(Group {
            name: name.into(),
            transform: transform.to_cols_array(),
            ..Default::default()
        });
        self.entities_mut(parent).groups.push(id);
        id
    }

    pub fn add_face(&mut self, parent: Parent, face: FaceRecord) -> FaceId {
        let id = FaceId(next_id(self.faces.len()));
        self.faces.push(face);
        self.entities_mut(parent).faces.push(id);
        id
    }

    /// Add a stand-alone edge.
    pub fn add_edge(&mut self, parent: Parent, start: DVec3, end: DVec3) -> EdgeId {
        let id = EdgeId(next_id(self.edges.len()));
        self.edges.push(Segment { start, end });
        self.entities_mut(parent).edges.push(id);
        id
    }

    /// Add a curve running through `points`. Its edges are owned by the
    /// curve and are not listed as stand-alone edges.
    pub fn add_curve(&mut self, parent: Parent, points: &[DVec3]) -> CurveId {
        let mut edges = Vec::new();
        for pair in points.windows(2) {
            let edge = EdgeId(next_id(self.edges.len()));
            self.edges.push(Segment {
                start: pair[0],
                end: pair[1],
            });
            edges.push(edge);
        }
        let id = CurveId(next_id(self.curves.len()));
        self.curves.push(CurveRecord { edges });
        self.entities_mut(parent).curves.push(id);
        id
    }

    pub fn add_polyline(&mut self, parent: Parent, points: Vec<DVec3>) -> PolylineId {
        let id = PolylineId(next_id(self.polylines.len()));
        self.polylines.push(points);
        self.entities_mut(parent).polylines.push(id);
        id
    }

    pub fn add_scene(&mut self, scene: SceneCamera) {
        self.scenes.push(scene);
    }

    pub fn definition_mut(&mut self, id: DefinitionId) -> &mut Definition {
        &mut self.definitions[id.index()]
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id.index()]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.index()]
    }

    pub fn face_mut(&mut self, id: FaceId) -> &mut FaceRecord {
        &mut self.faces[id.index()]
    }

    /// Fan-triangulate a face polygon.
    ///
    /// For a loop [0, 1, 2, 3, ...n-1] this creates triangles
    /// (0,1,2), (0,2,3), ... (0,n-2,n-1).
    fn triangulate(&self, id: FaceId, face: &FaceRecord) -> SourceResult<FaceMesh> {
        let count = face.outer.len();
        if count < 3 {
            return Ok(FaceMesh::default());
        }

        let uvs = |side: &Option<Vec<DVec2>>, label: &str| -> SourceResult<Vec<DVec2>> {
            match side {
                Some(uvs) if uvs.len() == count => Ok(uvs.clone()),
                Some(uvs) => Err(SourceError::MalformedFace {
                    id: id.0,
                    message: format!("{} {} UVs for {} vertices", uvs.len(), label, count),
                }),
                None => Ok(vec![DVec2::ZERO; count]),
            }
        };
        let front_uvs = uvs(&face.front_uvs, "front")?;
        let back_uvs = uvs(&face.back_uvs, "back")?;

        let normal = face
            .normal
            .map(|n| n.normalize_or_zero())
            .unwrap_or_else(|| face.loop_normal());

        let mut indices = Vec::with_capacity(3 * (count - 2));
        for i in 1..(count - 1) {
            indices.push(0);
            indices.push(i as u32);
            indices.push(i as u32 + 1);
        }

        Ok(FaceMesh {
            positions: face.outer.clone(),
            normals: vec![normal; count],
            front_uvs,
            back_uvs,
            indices,
        })
    }
}

impl SourceDocument for Document {
    fn root_entities(&self) -> SourceResult<EntityList> {
        Ok(self.root.clone())
    }

    fn definition_ids(&self) -> SourceResult<Vec<DefinitionId>> {
        Ok((0..self.definitions.len())
            .map(|i| DefinitionId(next_id(i)))
            .collect())
    }

    fn definition(&self, id: DefinitionId) -> SourceResult<Definition> {
        lookup(&self.definitions, "definition", id.0).cloned()
    }

    fn instance(&self, id: InstanceId) -> SourceResult<Instance> {
        lookup(&self.instances, "instance", id.0).cloned()
    }

    fn group(&self, id: GroupId) -> SourceResult<Group> {
        lookup(&self.groups, "group", id.0).cloned()
    }

    fn face(&self, id: FaceId) -> SourceResult<FaceInfo> {
        let face = lookup(&self.faces, "face", id.0)?;
        Ok(FaceInfo {
            visibility: face.visibility,
            front: face.front.clone(),
            back: face.back.clone(),
        })
    }

    fn face_mesh(&self, id: FaceId) -> SourceResult<FaceMesh> {
        let face = lookup(&self.faces, "face", id.0)?;
        self.triangulate(id, face)
    }

    fn edge(&self, id: EdgeId) -> SourceResult<Segment> {
        lookup(&self.edges, "edge", id.0).copied()
    }

    fn curve(&self, id: CurveId) -> SourceResult<Vec<Segment>> {
        let curve = lookup(&self.curves, "curve", id.0)?;
        curve.edges.iter().map(|&edge| self.edge(edge)).collect()
    }

    fn polyline(&self, id: PolylineId) -> SourceResult<Vec<DVec3>> {
        lookup(&self.polylines, "polyline", id.0).cloned()
    }

    fn scenes(&self) -> SourceResult<Vec<SceneCamera>> {
        Ok(self.scenes.clone())
    }
}
