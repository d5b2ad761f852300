//! Mesh assembly for one face-bearing parent.
//!
//! Every visible face of a definition or group is triangulated by the
//! source document and appended to a single [`MeshAssembly`]. Front and
//! back appearances are tracked per triangle, so the finished assembly can
//! decide whether one double-sided mesh describes both sides or a
//! `FrontSide`/`BackSide` pair is needed.

use cadusd_math::{point_from_source, Extent, Vec2, Vec3};

use crate::material::{coalesce, color_to_rgb_opacity, MaterialTag, MeshSubset, Side};
use crate::source::FaceMesh;
use crate::usd::{Attribute, PrimSpec, Value};

/// Name of the mesh written when both sides can share one mesh.
pub const BOTH_SIDES: &str = "BothSides";
pub const FRONT_SIDE: &str = "FrontSide";
pub const BACK_SIDE: &str = "BackSide";

/// Accumulated triangles of one parent.
#[derive(Clone, Debug, Default)]
pub struct MeshAssembly {
    /// Vertex positions, in centimeters
    pub points: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub front_uvs: Vec<Vec2>,
    pub back_uvs: Vec<Vec2>,
    /// Triangle vertex indices (three per triangle)
    pub indices: Vec<i32>,
    pub front: Vec<MaterialTag>,
    pub back: Vec<MaterialTag>,
    /// Faces that contributed at least one triangle
    pub original_faces: u64,
    /// False once any face arrived without per-vertex normals
    normals_complete: bool,
}

/// One mesh prim to write for an assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshPart {
    pub name: &'static str,
    pub side: Side,
    pub double_sided: bool,
    pub subsets: Vec<MeshSubset>,
}

impl MeshAssembly {
    pub fn new() -> Self {
        Self {
            normals_complete: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// Append one triangulated face with the resolved tag of each side.
    /// Returns `false` (and adds nothing) for a face without vertices.
    pub fn add_face(&mut self, mesh: &FaceMesh, front: MaterialTag, back: MaterialTag) -> bool {
        let count = mesh.vertex_count();
        if count == 0 || mesh.triangle_count() == 0 {
            log::trace!("Skipping face without triangles");
            return false;
        }

        let origin = self.points.len() as i32;
        self.points
            .extend(mesh.positions.iter().map(|&p| point_from_source(p)));

        if mesh.normals.len() == count {
            self.normals.extend(mesh.normals.iter().map(|n| n.as_vec3()));
        } else {
            self.normals_complete = false;
        }
        extend_uvs(&mut self.front_uvs, &mesh.front_uvs, count);
        extend_uvs(&mut self.back_uvs, &mesh.back_uvs, count);

        for triangle in mesh.indices.chunks_exact(3) {
            self.indices
                .extend(triangle.iter().map(|&i| origin + i as i32));
            self.front.push(front.clone());
            self.back.push(back.clone());
        }
        self.original_faces += 1;
        true
    }

    pub fn has_normals(&self) -> bool {
        self.normals_complete && self.normals.len() == self.points.len()
    }

    pub fn extent(&self) -> Extent {
        Extent::from_points(&self.points)
    }

    /// True when front and back carry the same materials and colors on every
    /// triangle (and the same UVs wherever a texture is involved).
    pub fn is_symmetric(&self) -> bool {
        if self.front != self.back {
            return false;
        }
        let textured = self.front.iter().any(|t| t.key.is_textured());
        !textured || self.front_uvs == self.back_uvs
    }

    /// Decide which mesh prims to write.
    ///
    /// `force_double_sided` writes one double-sided mesh with the front
    /// appearances even when the sides differ.
    pub fn plan(&self, force_double_sided: bool) -> Vec<MeshPart> {
        if self.is_empty() {
            return Vec::new();
        }
        if force_double_sided || self.is_symmetric() {
            return vec![MeshPart {
                name: BOTH_SIDES,
                side: Side::Front,
                double_sided: true,
                subsets: coalesce(&self.front),
            }];
        }
        vec![
            MeshPart {
                name: FRONT_SIDE,
                side: Side::Front,
                double_sided: false,
                subsets: coalesce(&self.front),
            },
            MeshPart {
                name: BACK_SIDE,
                side: Side::Back,
                double_sided: false,
                subsets: coalesce(&self.back),
            },
        ]
    }

    fn tags(&self, side: Side) -> &[MaterialTag] {
        match side {
            Side::Front => &self.front,
            Side::Back => &self.back,
        }
    }

    /// Author the geometry attributes of `part` on a `Mesh` prim.
    pub fn author(&self, prim: &mut PrimSpec, part: &MeshPart, export_normals: bool) {
        let extent = self.extent().to_pair();
        let orientation = match part.side {
            Side::Front => "rightHanded",
            Side::Back => "leftHanded",
        };

        prim.set_attribute(Attribute::new(
            "extent",
            "float3[]",
            Value::Float3Array(extent.to_vec()),
        ));
        prim.set_attribute(
            Attribute::new("subdivisionScheme", "token", Value::token("none")).uniform(),
        );
        prim.set_attribute(
            Attribute::new("orientation", "token", Value::token(orientation)).uniform(),
        );
        prim.set_attribute(
            Attribute::new("doubleSided", "bool", Value::Bool(part.double_sided)).uniform(),
        );
        prim.set_attribute(Attribute::new(
            "points",
            "point3f[]",
            Value::Float3Array(self.points.clone()),
        ));

        if export_normals {
            if self.has_normals() {
                let normals = match part.side {
                    Side::Front => self.normals.clone(),
                    Side::Back => self.normals.iter().map(|n| -*n).collect(),
                };
                prim.set_attribute(
                    Attribute::new("normals", "normal3f[]", Value::Float3Array(normals))
                        .interpolation("vertex"),
                );
            } else {
                log::warn!(
                    "{}: {} points but {} normals; not writing normals",
                    prim.name,
                    self.points.len(),
                    self.normals.len()
                );
            }
        }

        prim.set_attribute(Attribute::new(
            "faceVertexCounts",
            "int[]",
            Value::IntArray(vec![3; self.triangle_count()]),
        ));
        prim.set_attribute(Attribute::new(
            "faceVertexIndices",
            "int[]",
            Value::IntArray(self.indices.clone()),
        ));

        let (colors, opacities): (Vec<Vec3>, Vec<f32>) = self
            .tags(part.side)
            .iter()
            .map(|t| color_to_rgb_opacity(t.color))
            .unzip();
        prim.set_attribute(
            Attribute::new("primvars:displayColor", "color3f[]", Value::Float3Array(colors))
                .interpolation("uniform"),
        );
        prim.set_attribute(
            Attribute::new("primvars:displayOpacity", "float[]", Value::FloatArray(opacities))
                .interpolation("uniform"),
        );

        let uvs = match part.side {
            Side::Front => &self.front_uvs,
            Side::Back => &self.back_uvs,
        };
        prim.set_attribute(
            Attribute::new("primvars:st", "texCoord2f[]", Value::Float2Array(uvs.clone()))
                .interpolation("vertex"),
        );
    }
}

fn extend_uvs(out: &mut Vec<Vec2>, uvs: &[cadusd_math::DVec2], count: usize) {
    if uvs.len() == count {
        out.extend(uvs.iter().map(|uv| uv.as_vec2()));
    } else {
        out.extend(std::iter::repeat(Vec2::ZERO).take(count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{MaterialKey, DEFAULT_BACK_COLOR, DEFAULT_FRONT_COLOR};
    use crate::source::Appearance;
    use cadusd_math::{DVec2, DVec3};

    fn quad() -> FaceMesh {
        FaceMesh {
            positions: vec![
                DVec3::ZERO,
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![DVec3::Z; 4],
            front_uvs: vec![DVec2::ZERO, DVec2::X, DVec2::ONE, DVec2::Y],
            back_uvs: vec![DVec2::ZERO, DVec2::X, DVec2::ONE, DVec2::Y],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    fn red() -> MaterialTag {
        MaterialTag::new(&Appearance::color([255, 0, 0, 255]))
    }

    #[test]
    fn test_add_face_offsets_indices() {
        let mut assembly = MeshAssembly::new();
        assert!(assembly.add_face(&quad(), red(), red()));
        assert!(assembly.add_face(&quad(), red(), red()));

        assert_eq!(assembly.vertex_count(), 8);
        assert_eq!(assembly.triangle_count(), 4);
        assert_eq!(assembly.original_faces, 2);
        assert_eq!(&assembly.indices[6..], &[4, 5, 6, 4, 6, 7]);
        // inches to centimeters
        assert!((assembly.points[1] - Vec3::new(2.54, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_degenerate_face_is_skipped() {
        let mut assembly = MeshAssembly::new();
        assert!(!assembly.add_face(&FaceMesh::default(), red(), red()));
        assert!(assembly.is_empty());
        assert!(assembly.plan(false).is_empty());
    }

    #[test]
    fn test_symmetric_faces_make_one_double_sided_mesh() {
        let mut assembly = MeshAssembly::new();
        assembly.add_face(&quad(), red(), red());
        assembly.add_face(&quad(), red(), red());

        let parts = assembly.plan(false);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, BOTH_SIDES);
        assert!(parts[0].double_sided);
        assert_eq!(parts[0].subsets.len(), 1);
        assert_eq!(parts[0].subsets[0].faces, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_default_sides_are_asymmetric() {
        let front = MaterialTag::resolve(None, Side::Front);
        let back = MaterialTag::resolve(None, Side::Back);
        let mut assembly = MeshAssembly::new();
        assembly.add_face(&quad(), front, back);

        let parts = assembly.plan(false);
        assert_eq!(parts.len(), 2);
        assert_eq!((parts[0].name, parts[0].side), (FRONT_SIDE, Side::Front));
        assert_eq!((parts[1].name, parts[1].side), (BACK_SIDE, Side::Back));
        // Both sides bind the one default material; only display colors differ.
        assert_eq!(parts[0].subsets[0].key, MaterialKey::Default);
        assert_eq!(parts[1].subsets[0].key, MaterialKey::Default);
        assert_eq!(parts[0].subsets[0].color, DEFAULT_FRONT_COLOR);
        assert_eq!(parts[1].subsets[0].color, DEFAULT_BACK_COLOR);

        let forced = assembly.plan(true);
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].subsets[0].color, DEFAULT_FRONT_COLOR);
    }

    #[test]
    fn test_textured_sides_need_matching_uvs() {
        let wood = MaterialTag::new(&Appearance::textured("wood.png"));
        let mut face = quad();
        face.back_uvs.reverse();
        let mut assembly = MeshAssembly::new();
        assembly.add_face(&face, wood.clone(), wood);

        assert!(!assembly.is_symmetric());
        assert_eq!(assembly.plan(false).len(), 2);
    }

    #[test]
    fn test_author_back_side() {
        let mut assembly = MeshAssembly::new();
        assembly.add_face(&quad(), red(), MaterialTag::new(&Appearance::color([0, 0, 255, 128])));
        let parts = assembly.plan(false);
        let mut prim = PrimSpec::new(BACK_SIDE, Some("Mesh"));

        assembly.author(&mut prim, &parts[1], true);

        assert_eq!(
            prim.attribute("orientation").unwrap().value,
            Some(Value::token("leftHanded"))
        );
        assert_eq!(
            prim.attribute("normals").unwrap().value,
            Some(Value::Float3Array(vec![Vec3::NEG_Z; 4]))
        );
        assert_eq!(
            prim.attribute("faceVertexCounts").unwrap().value,
            Some(Value::IntArray(vec![3, 3]))
        );
        match &prim.attribute("primvars:displayOpacity").unwrap().value {
            Some(Value::FloatArray(a)) => assert!((a[0] - 128.0 / 255.0).abs() < 1e-6),
            other => panic!("unexpected opacity {:?}", other),
        }
        match &prim.attribute("extent").unwrap().value {
            Some(Value::Float3Array(e)) => {
                assert_eq!(e[0], Vec3::ZERO);
                assert!((e[1] - Vec3::new(2.54, 2.54, 0.0)).length() < 1e-6);
            }
            other => panic!("unexpected extent {:?}", other),
        }
    }
}
