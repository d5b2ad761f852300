//! Export statistics.
//!
//! A [`StatsDataPoint`] records what one definition (or the top-level
//! geometry) writes on its own: meshes, triangles, materials and so on.
//! Instances do not re-walk geometry; their contribution is the definition's
//! data point added once per live instance, so totals describe what a reader
//! of the exported scene will actually have after composition.

use std::collections::{BTreeMap, HashMap};
use std::ops::{AddAssign, Mul};
use std::time::Duration;

use crate::source::DefinitionId;

/// Counts gathered while writing one definition or the top-level scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsDataPoint {
    pub meshes: u64,
    pub triangles: u64,
    pub original_faces: u64,
    pub edges: u64,
    pub curves: u64,
    pub lines: u64,
    pub materials: u64,
    pub shaders: u64,
    pub geom_subsets: u64,
}

impl AddAssign for StatsDataPoint {
    fn add_assign(&mut self, other: Self) {
        self.meshes += other.meshes;
        self.triangles += other.triangles;
        self.original_faces += other.original_faces;
        self.edges += other.edges;
        self.curves += other.curves;
        self.lines += other.lines;
        self.materials += other.materials;
        self.shaders += other.shaders;
        self.geom_subsets += other.geom_subsets;
    }
}

impl Mul<u64> for StatsDataPoint {
    type Output = Self;

    fn mul(self, n: u64) -> Self {
        Self {
            meshes: self.meshes * n,
            triangles: self.triangles * n,
            original_faces: self.original_faces * n,
            edges: self.edges * n,
            curves: self.curves * n,
            lines: self.lines * n,
            materials: self.materials * n,
            shaders: self.shaders * n,
            geom_subsets: self.geom_subsets * n,
        }
    }
}

/// What one definition (or the top-level geometry) writes, plus the
/// instances it places.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DefinitionRecord {
    pub own: StatsDataPoint,
    /// Live instances per definition, placed directly by this one
    pub instances: BTreeMap<DefinitionId, u64>,
}

impl DefinitionRecord {
    pub fn add_instance(&mut self, definition: DefinitionId) {
        *self.instances.entry(definition).or_insert(0) += 1;
    }
}

/// Resolves composed totals of definition records, memoizing each
/// definition so shared definitions are summed once.
pub struct StatsResolver<'a> {
    records: &'a HashMap<DefinitionId, DefinitionRecord>,
    resolved: HashMap<DefinitionId, StatsDataPoint>,
    visiting: Vec<DefinitionId>,
}

impl<'a> StatsResolver<'a> {
    pub fn new(records: &'a HashMap<DefinitionId, DefinitionRecord>) -> Self {
        Self {
            records,
            resolved: HashMap::new(),
            visiting: Vec::new(),
        }
    }

    /// Own counts plus every placed instance's composed counts.
    pub fn total(&mut self, record: &DefinitionRecord) -> StatsDataPoint {
        let mut total = record.own;
        for (&id, &count) in &record.instances {
            total += self.definition(id) * count;
        }
        total
    }

    /// Composed counts of one definition.
    pub fn definition(&mut self, id: DefinitionId) -> StatsDataPoint {
        if let Some(&done) = self.resolved.get(&id) {
            return done;
        }
        let records = self.records;
        let Some(record) = records.get(&id) else {
            return StatsDataPoint::default();
        };
        if self.visiting.contains(&id) {
            return StatsDataPoint::default();
        }
        self.visiting.push(id);
        let total = self.total(record);
        self.visiting.pop();
        self.resolved.insert(id, total);
        total
    }
}

/// Totals for one conversion, seeded to zero at the start of each run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportTotals {
    /// Definitions written
    pub component_definitions: u64,
    /// Instance scopes written
    pub component_instances: u64,
    pub cameras: u64,
    /// Geometry live in the composed scene
    pub scene: StatsDataPoint,
    /// Wall time of the conversion
    pub elapsed: Duration,
    /// Aspect ratio reported for cameras
    pub aspect_ratio: f64,
}

impl ExportTotals {
    pub fn meshes(&self) -> u64 {
        self.scene.meshes
    }

    pub fn triangles(&self) -> u64 {
        self.scene.triangles
    }

    pub fn materials(&self) -> u64 {
        self.scene.materials
    }

    /// Human-readable summary shown after an export.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let s = &self.scene;

        line(&mut out, "Exported ", self.component_definitions, "Component Definition", "Component Definitions");
        line(&mut out, "Exported ", self.component_instances, "Component Instance", "Component Instances");
        if s.meshes > 0 {
            line(&mut out, "Exported ", s.meshes, "Mesh", "Meshes");
            out.push_str(&format!(
                "\t{} {} from {} {}\n",
                with_commas(s.triangles),
                plural(s.triangles, "Triangle", "Triangles"),
                with_commas(s.original_faces),
                plural(s.original_faces, "Face", "Faces"),
            ));
        }
        if s.materials > 0 {
            line(&mut out, "Exported ", s.materials, "Material", "Materials");
            line(&mut out, "\t", s.shaders, "Shader", "Shaders");
        }
        line(&mut out, "\t", s.geom_subsets, "GeomSubset", "GeomSubsets");
        line(&mut out, "Exported ", s.edges, "Edge", "Edges");
        line(&mut out, "Exported ", s.lines, "PolyLine", "PolyLines");
        line(&mut out, "Exported ", s.curves, "Curve", "Curves");
        if self.cameras > 0 {
            out.push_str(&format!(
                "Exported {} {} w/aspect ratio {:.2}:1\n",
                with_commas(self.cameras),
                plural(self.cameras, "Camera", "Cameras"),
                self.aspect_ratio,
            ));
        }
        out.push_str(&format!(
            "Export took {:.2} seconds\n",
            self.elapsed.as_secs_f64()
        ));
        out
    }
}

fn plural<'a>(count: u64, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}

/// Append `"{prefix}{count} {noun}\n"`, skipping zero counts.
fn line(out: &mut String, prefix: &str, count: u64, one: &str, many: &str) {
    if count > 0 {
        out.push_str(&format!(
            "{}{} {}\n",
            prefix,
            with_commas(count),
            plural(count, one, many)
        ));
    }
}

/// Format with thousands separators: 1234567 -> "1,234,567".
pub fn with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
