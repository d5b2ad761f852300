//! Definition/instance graph exporter.
//!
//! Walks a [`SourceDocument`] and writes the layers planned by
//! [`OutputLayout`]. Every used definition is written once as a non-rendering
//! `over` (or, in split mode, as a `def` in the components layer) and each
//! visible instance references it. Groups are written inline.
//!
//! # Example
//!
//! ```ignore
//! use cadusd_core::{convert, Document, ExportOptions, FileSystemWriter, LogProgress};
//!
//! let doc = Document::load("house.json")?;
//! let totals = convert(
//!     &doc,
//!     Path::new("out/house.usda"),
//!     &ExportOptions::default(),
//!     &mut FileSystemWriter::new(),
//!     &mut LogProgress,
//! )?;
//! print!("{}", totals.summary());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use cadusd_math::{matrix_from_source, point_from_source, Extent, Vec3};
use thiserror::Error;

use crate::camera::export_cameras;
use crate::census::Census;
use crate::material::{MaterialCache, MaterialKey, MaterialTag, Side};
use crate::mesh::{MeshAssembly, MeshPart, BACK_SIDE, BOTH_SIDES, FRONT_SIDE};
use crate::names::NameScope;
use crate::options::ExportOptions;
use crate::partition::OutputLayout;
use crate::progress::{Progress, ProgressSink};
use crate::source::{
    Appearance, CurveId, DefinitionId, EdgeId, EntityList, FaceId, GroupId, InstanceId,
    PolylineId, SourceDocument, SourceError,
};
use crate::stats::{DefinitionRecord, ExportTotals, StatsResolver};
use crate::texture::{texture_file_name, TextureCatalog};
use crate::usd::{AssetWriter, Attribute, Layer, PrimPath, Reference, Value, WriteError};

/// Errors that abort a conversion.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Source document error: {0}")]
    Source(#[from] SourceError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Export cancelled")]
    Cancelled,
}

/// Result type for conversions.
pub type ExportResult<T> = Result<T, ExportError>;

/// Appended to a definition's name to form its prim name.
pub const DEFINITION_SUFFIX: &str = "__Definition";

/// Replaces [`DEFINITION_SUFFIX`] in instance prim names, followed by a
/// per-definition counter.
pub const INSTANCE_SUFFIX: &str = "__Instance_";

/// Transform below the root prim holding the top-level entities.
pub const GEOMETRY_SCOPE: &str = "Geom";

const MATERIALS_SCOPE: &str = "Materials";
const EDGES: &str = "Edges";
const CURVES: &str = "Curves";
const POLYLINES: &str = "Polylines";
const CURVE_WIDTH: f32 = 1.0;

/// Child names the exporter writes itself below a parent.
const FIXED_CHILD_NAMES: [&str; 7] = [
    BOTH_SIDES,
    FRONT_SIDE,
    BACK_SIDE,
    MATERIALS_SCOPE,
    EDGES,
    CURVES,
    POLYLINES,
];

/// Candidate prim name of the `counter`-th instance of a definition.
///
/// `Chair__Definition` becomes `Chair__Instance_3`. Every `__Definition`
/// in the name is replaced.
pub fn instance_name(definition_name: &str, counter: u64) -> String {
    if definition_name.contains(DEFINITION_SUFFIX) {
        format!(
            "{}{}",
            definition_name.replace(DEFINITION_SUFFIX, INSTANCE_SUFFIX),
            counter
        )
    } else {
        format!("{}{}{}", definition_name, INSTANCE_SUFFIX, counter)
    }
}

/// Converts one source document.
pub struct Exporter<'a, D: SourceDocument + ?Sized> {
    doc: &'a D,
    options: ExportOptions,
    texture_base_dir: Option<PathBuf>,
}

impl<'a, D: SourceDocument + ?Sized> Exporter<'a, D> {
    pub fn new(doc: &'a D, options: ExportOptions) -> Self {
        Self {
            doc,
            options,
            texture_base_dir: None,
        }
    }

    /// Directory relative texture paths in the document are resolved against.
    pub fn texture_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_base_dir = Some(dir.into());
        self
    }

    /// Run the conversion, writing every planned file through `writer`.
    ///
    /// Nothing is written until the whole document has been walked, so a
    /// cancelled or failed conversion leaves no partial output behind.
    pub fn export<W: AssetWriter + ?Sized>(
        &self,
        output: &Path,
        writer: &mut W,
        progress: &mut dyn ProgressSink,
    ) -> ExportResult<ExportTotals> {
        let started = Instant::now();
        let layout = OutputLayout::plan(output, &self.options);
        log::info!(
            "Exporting to {} ({} layer{})",
            layout.root_layer.display(),
            layout.layer_files().len(),
            if layout.is_split() { "s" } else { "" }
        );

        let textures = match &self.texture_base_dir {
            Some(dir) => TextureCatalog::with_base_dir(dir.clone()),
            None => TextureCatalog::new(),
        };
        let mut run = ExportRun::new(self.doc, &self.options, layout, textures, progress)?;
        run.walk()?;
        run.finish(writer)?;

        run.totals.elapsed = started.elapsed();
        log::info!(
            "Export finished in {:.2}s: {} meshes, {} triangles",
            run.totals.elapsed.as_secs_f64(),
            run.totals.meshes(),
            run.totals.triangles()
        );
        Ok(run.totals)
    }
}

/// Convert `doc` to `output` with the given options.
pub fn convert<D, W>(
    doc: &D,
    output: &Path,
    options: &ExportOptions,
    writer: &mut W,
    progress: &mut dyn ProgressSink,
) -> ExportResult<ExportTotals>
where
    D: SourceDocument + ?Sized,
    W: AssetWriter + ?Sized,
{
    Exporter::new(doc, options.clone()).export(output, writer, progress)
}

/// Layer a subtree is written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Root,
    Components,
    Geometry,
}

struct Layers {
    root: Layer,
    components: Option<Layer>,
    geometry: Option<Layer>,
}

impl Layers {
    fn get_mut(&mut self, target: Target) -> &mut Layer {
        match target {
            Target::Root => &mut self.root,
            Target::Components => self.components.as_mut().unwrap_or(&mut self.root),
            Target::Geometry => self.geometry.as_mut().unwrap_or(&mut self.root),
        }
    }
}

struct DefinitionEntry {
    name: String,
    billboard: bool,
}

/// Writing state of one material root: a definition, or the top-level
/// geometry.
struct Emission {
    target: Target,
    definition: Option<DefinitionId>,
    record: DefinitionRecord,
    materials: MaterialCache,
}

impl Emission {
    fn new(target: Target, root: &PrimPath, definition: Option<DefinitionId>, share_colors: bool) -> Self {
        Self {
            target,
            definition,
            record: DefinitionRecord::default(),
            materials: MaterialCache::new(root, share_colors),
        }
    }
}

struct ExportRun<'a, 'p, D: SourceDocument + ?Sized> {
    doc: &'a D,
    options: &'a ExportOptions,
    layout: OutputLayout,
    layers: Layers,
    root_path: PrimPath,
    /// Names of prims at the layer root: the root prim and every definition
    root_names: NameScope,
    census: Census,
    definitions: HashMap<DefinitionId, DefinitionEntry>,
    definition_order: Vec<DefinitionId>,
    records: HashMap<DefinitionId, DefinitionRecord>,
    instance_counters: HashMap<DefinitionId, u64>,
    /// Source path of each texture file name, registered once a material uses it
    texture_sources: HashMap<String, String>,
    textures: TextureCatalog,
    progress: &'p mut dyn ProgressSink,
    totals: ExportTotals,
}

impl<'a, 'p, D: SourceDocument + ?Sized> ExportRun<'a, 'p, D> {
    fn new(
        doc: &'a D,
        options: &'a ExportOptions,
        layout: OutputLayout,
        textures: TextureCatalog,
        progress: &'p mut dyn ProgressSink,
    ) -> ExportResult<Self> {
        let root_name = layout.root_prim_name();
        if root_name != layout.base_name {
            log::warn!(
                "Output name {:?} is not a valid prim name; using {:?}",
                layout.base_name,
                root_name
            );
        }
        let root_path = PrimPath::root().child(&root_name);
        let geometry_path = root_path.child(GEOMETRY_SCOPE);

        let file_name = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let mut root = Layer::new(file_name(&layout.root_layer)).with_stage_metadata();
        root.default_prim = Some(root_name.clone());
        root.documentation = Some(format!("Converted from {}", layout.base_name));
        let prim = root.define_prim(&root_path, "Xform")?;
        prim.kind = Some("assembly".to_string());

        let mut components = None;
        let mut geometry = None;
        if let (Some(components_path), Some(geometry_path_file)) =
            (&layout.components_layer, &layout.geometry_layer)
        {
            root.sublayers.push(OutputLayout::relative_path(geometry_path_file));
            components = Some(Layer::new(file_name(components_path)).with_stage_metadata());

            let mut layer = Layer::new(file_name(geometry_path_file)).with_stage_metadata();
            layer.define_prim(&root_path, "")?;
            layer.make_over(&root_path)?;
            layer.define_prim(&geometry_path, "Xform")?;
            geometry = Some(layer);
        } else {
            root.define_prim(&geometry_path, "Xform")?;
        }

        let mut root_names = NameScope::new();
        root_names.reserve(&root_name);

        Ok(Self {
            doc,
            options,
            layout,
            layers: Layers {
                root,
                components,
                geometry,
            },
            root_path,
            root_names,
            census: Census::default(),
            definitions: HashMap::new(),
            definition_order: Vec::new(),
            records: HashMap::new(),
            instance_counters: HashMap::new(),
            texture_sources: HashMap::new(),
            textures,
            progress,
            totals: ExportTotals::default(),
        })
    }

    fn report(&mut self, percent: f64, message: &str) -> ExportResult<()> {
        match self.progress.report(percent, message) {
            Progress::Continue => Ok(()),
            Progress::Cancel => {
                log::info!("Export cancelled at {:.0}%", percent);
                Err(ExportError::Cancelled)
            }
        }
    }

    /// Color materials are shared across a whole material root in ARKit
    /// mode.
    fn share_colors(&self) -> bool {
        self.layout.arkit
    }

    fn walk(&mut self) -> ExportResult<()> {
        self.report(0.0, "Counting definitions")?;
        self.census = Census::run(self.doc)?;
        log::info!(
            "Counted {} used definitions, {} reachable instances and groups",
            self.census.used_count(),
            self.census.reachable_entities
        );
        self.report(
            10.0,
            &format!("Counted {} definitions", self.census.used_count()),
        )?;

        self.name_definitions()?;
        self.export_definitions()?;

        self.report(40.0, "Writing geometry")?;
        let top = self.export_geometry()?;

        if self.options.export_cameras {
            self.export_scenes()?;
        }

        let mut resolver = StatsResolver::new(&self.records);
        self.totals.scene = resolver.total(&top);
        self.totals.aspect_ratio = self.options.aspect_ratio;
        self.report(100.0, "Done")
    }

    /// Allocate every used definition's prim name before any subtree is
    /// written, so instances can resolve definitions declared after them.
    fn name_definitions(&mut self) -> ExportResult<()> {
        for id in self.doc.definition_ids()? {
            if !self.census.is_used(id) {
                continue;
            }
            let definition = self.doc.definition(id)?;
            let name = self
                .root_names
                .claim(&format!("{}{}", definition.name, DEFINITION_SUFFIX));
            self.definitions.insert(
                id,
                DefinitionEntry {
                    name,
                    billboard: definition.always_face_camera,
                },
            );
            self.definition_order.push(id);
        }
        Ok(())
    }

    fn export_definitions(&mut self) -> ExportResult<()> {
        let target = if self.layout.is_split() {
            Target::Components
        } else {
            Target::Root
        };
        let order = std::mem::take(&mut self.definition_order);
        let count = order.len();

        for (i, &id) in order.iter().enumerate() {
            let definition = self.doc.definition(id)?;
            let Some(entry) = self.definitions.get(&id) else {
                continue;
            };
            let path = PrimPath::root().child(&entry.name);

            let prim = self.layers.get_mut(target).define_prim(&path, "Xform")?;
            prim.kind = Some("component".to_string());
            prim.set_custom_data("source:name", Value::String(definition.name.clone()));

            let mut emission = Emission::new(target, &path, Some(id), self.share_colors());
            let mut names = NameScope::new();
            self.export_entities(&mut emission, &path, &definition.entities, &mut names, None)?;

            // Only once the whole subtree exists.
            if !self.layout.is_split() {
                self.layers.get_mut(target).make_over(&path)?;
            }
            log::debug!("Wrote definition {} as {}", definition.name, path);

            self.records.insert(id, emission.record);
            self.totals.component_definitions += 1;
            self.report(
                10.0 + 30.0 * (i + 1) as f64 / count as f64,
                &format!("Wrote {} of {} definitions", i + 1, count),
            )?;
        }
        self.definition_order = order;
        Ok(())
    }

    /// Write the top-level entities below `/<root>/Geom`. Returns what they
    /// wrote and placed.
    fn export_geometry(&mut self) -> ExportResult<DefinitionRecord> {
        let target = if self.layout.is_split() {
            Target::Geometry
        } else {
            Target::Root
        };
        let path = self.root_path.child(GEOMETRY_SCOPE);
        let entities = self.doc.root_entities()?;

        let mut emission = Emission::new(target, &path, None, self.share_colors());
        let mut names = NameScope::new();
        self.export_entities(&mut emission, &path, &entities, &mut names, None)?;
        Ok(emission.record)
    }

    fn export_scenes(&mut self) -> ExportResult<()> {
        let scenes = self.doc.scenes()?;
        if scenes.is_empty() {
            return Ok(());
        }
        self.report(95.0, &format!("Writing {} cameras", scenes.len()))?;
        self.totals.cameras =
            export_cameras(&mut self.layers.root, &self.root_path, &scenes, self.options)?;
        Ok(())
    }

    fn export_entities(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        entities: &EntityList,
        names: &mut NameScope,
        inherited: Option<&Appearance>,
    ) -> ExportResult<()> {
        for name in FIXED_CHILD_NAMES {
            names.reserve(name);
        }

        self.export_instances(emission, parent, &entities.instances, names)?;
        self.export_groups(emission, parent, &entities.groups, names, inherited)?;
        if self.options.export_meshes {
            self.export_faces(emission, parent, &entities.faces, inherited)?;
        }
        if self.options.export_edges {
            self.export_edges(emission, parent, &entities.edges)?;
        }
        if self.options.export_curves {
            self.export_curves(emission, parent, &entities.curves)?;
        }
        if self.options.export_lines {
            self.export_polylines(emission, parent, &entities.polylines)?;
        }
        Ok(())
    }

    fn export_instances(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        instances: &[InstanceId],
        names: &mut NameScope,
    ) -> ExportResult<()> {
        for &id in instances {
            let instance = self.doc.instance(id)?;
            if !instance.visibility.is_visible() {
                continue;
            }
            let Some(entry) = self.definitions.get(&instance.definition) else {
                log::error!(
                    "Instance {} ({}) refers to definition {} which has not been written; skipping",
                    id,
                    instance.name,
                    instance.definition
                );
                continue;
            };
            if emission.definition == Some(instance.definition) {
                log::warn!(
                    "Definition {} places an instance of itself; skipping {}",
                    entry.name,
                    instance.name
                );
                continue;
            }

            let counter = self.instance_counters.entry(instance.definition).or_insert(0);
            *counter += 1;
            let name = names.claim(&instance_name(&entry.name, *counter));
            let definition_path = PrimPath::root().child(&entry.name);
            let billboard = entry.billboard;

            let reference = match &self.layout.components_layer {
                Some(components) => Reference::External {
                    asset_path: OutputLayout::relative_path(components),
                    prim_path: definition_path,
                },
                None => Reference::Internal(definition_path),
            };

            let path = parent.child(&name);
            let prim = self.layers.get_mut(emission.target).define_prim(&path, "Xform")?;
            prim.set_transform(matrix_from_source(&instance.transform));
            prim.references.push(reference);
            if !self.layout.arkit {
                prim.instanceable = Some(true);
            }
            prim.set_custom_data("source:name", Value::String(instance.name.clone()));
            if billboard {
                prim.set_custom_data("source:billboard", Value::Bool(true));
            }

            emission.record.add_instance(instance.definition);
            self.totals.component_instances += 1;
        }
        Ok(())
    }

    fn export_groups(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        groups: &[GroupId],
        names: &mut NameScope,
        inherited: Option<&Appearance>,
    ) -> ExportResult<()> {
        let mut written = 0usize;
        for &id in groups {
            let group = self.doc.group(id)?;
            if !group.visibility.is_visible() {
                continue;
            }
            let name = if group.name.is_empty() {
                names.claim(&format!("GRP_{}", written))
            } else {
                names.claim(&group.name)
            };
            written += 1;

            let path = parent.child(&name);
            let prim = self.layers.get_mut(emission.target).define_prim(&path, "Xform")?;
            prim.set_transform(matrix_from_source(&group.transform));
            if !group.name.is_empty() {
                prim.kind = Some("group".to_string());
                prim.set_custom_data("source:name", Value::String(group.name.clone()));
            }

            let material = group.material.as_ref().or(inherited);
            let mut child_names = NameScope::new();
            self.export_entities(emission, &path, &group.entities, &mut child_names, material)?;
        }
        Ok(())
    }

    fn export_faces(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        faces: &[FaceId],
        inherited: Option<&Appearance>,
    ) -> ExportResult<()> {
        if faces.is_empty() {
            return Ok(());
        }

        let mut assembly = MeshAssembly::new();
        for &id in faces {
            let face = self.doc.face(id)?;
            if !face.visibility.is_visible() {
                continue;
            }
            let mesh = self.doc.face_mesh(id)?;
            let front = face.front.as_ref().or(inherited);
            let back = face.back.as_ref().or(inherited);
            let front_tag = MaterialTag::resolve(front, Side::Front);
            let back_tag = MaterialTag::resolve(back, Side::Back);
            if !assembly.add_face(&mesh, front_tag, back_tag) {
                log::trace!("Face {} has no triangles; skipping", id);
                continue;
            }
            for appearance in [front, back].into_iter().flatten() {
                if let Some(texture) = &appearance.texture {
                    self.texture_sources
                        .entry(texture_file_name(texture))
                        .or_insert_with(|| texture.clone());
                }
            }
        }

        let parts = assembly.plan(self.options.export_double_sided);
        if parts.is_empty() {
            return Ok(());
        }

        emission.materials.reset_batch();
        for part in &parts {
            let path = parent.child(part.name);
            let prim = self.layers.get_mut(emission.target).define_prim(&path, "Mesh")?;
            assembly.author(prim, part, self.options.export_normals);
            emission.record.own.meshes += 1;

            if self.options.export_materials {
                self.bind_materials(emission, &path, part)?;
            }
        }
        emission.record.own.triangles += assembly.triangle_count() as u64;
        emission.record.own.original_faces += assembly.original_faces;
        Ok(())
    }

    /// Bind each subset's material, writing materials on first use.
    fn bind_materials(
        &mut self,
        emission: &mut Emission,
        mesh: &PrimPath,
        part: &MeshPart,
    ) -> ExportResult<()> {
        let layout = &self.layout;
        let asset_path = |file: &str| layout.texture_asset_path(file);
        let layer = self.layers.get_mut(emission.target);

        let mut materials = Vec::with_capacity(part.subsets.len());
        for subset in &part.subsets {
            let (material, shaders) = emission.materials.material_for(layer, subset, asset_path)?;
            if shaders > 0 {
                emission.record.own.materials += 1;
                emission.record.own.shaders += shaders;
                if let MaterialKey::Texture(file) = &subset.key {
                    if let Some(source) = self.texture_sources.get(file) {
                        self.textures.register(source);
                    }
                }
            }
            materials.push(material);
        }

        if let [material] = materials.as_slice() {
            layer.existing_prim_mut(mesh)?.bind_material(material);
            return Ok(());
        }

        layer.existing_prim_mut(mesh)?.set_attribute(
            Attribute::new(
                "subsetFamily:materialBind:familyType",
                "token",
                Value::token("partition"),
            )
            .uniform(),
        );
        let mut names = NameScope::new();
        for (subset, material) in part.subsets.iter().zip(&materials) {
            let path = mesh.child(&names.claim(&subset.key.material_name()));
            let prim = layer.define_prim(&path, "GeomSubset")?;
            prim.set_attribute(
                Attribute::new("elementType", "token", Value::token("face")).uniform(),
            );
            prim.set_attribute(
                Attribute::new("familyName", "token", Value::token("materialBind")).uniform(),
            );
            prim.set_attribute(Attribute::new(
                "indices",
                "int[]",
                Value::IntArray(subset.faces.clone()),
            ));
            prim.bind_material(material);
            emission.record.own.geom_subsets += 1;
        }
        Ok(())
    }

    fn export_edges(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        edges: &[EdgeId],
    ) -> ExportResult<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let mut points = Vec::with_capacity(edges.len() * 2);
        for &id in edges {
            let segment = self.doc.edge(id)?;
            points.push(point_from_source(segment.start));
            points.push(point_from_source(segment.end));
        }
        let counts = vec![2; edges.len()];
        self.write_curves(emission.target, &parent.child(EDGES), "Edges not part of a Face", points, counts)?;
        emission.record.own.edges += edges.len() as u64;
        Ok(())
    }

    fn export_curves(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        curves: &[CurveId],
    ) -> ExportResult<()> {
        let mut points = Vec::new();
        let mut counts = Vec::new();
        for &id in curves {
            let segments = self.doc.curve(id)?;
            if segments.is_empty() {
                continue;
            }
            for segment in &segments {
                points.push(point_from_source(segment.start));
                points.push(point_from_source(segment.end));
            }
            counts.push(2 * segments.len() as i32);
        }
        if counts.is_empty() {
            return Ok(());
        }
        let written = counts.len() as u64;
        self.write_curves(emission.target, &parent.child(CURVES), "Curves", points, counts)?;
        emission.record.own.curves += written;
        Ok(())
    }

    fn export_polylines(
        &mut self,
        emission: &mut Emission,
        parent: &PrimPath,
        polylines: &[PolylineId],
    ) -> ExportResult<()> {
        let mut points = Vec::new();
        let mut counts = Vec::new();
        for &id in polylines {
            let vertices = self.doc.polyline(id)?;
            if vertices.len() < 2 {
                log::trace!("Polyline {} has fewer than two points; skipping", id);
                continue;
            }
            counts.push(vertices.len() as i32);
            points.extend(vertices.into_iter().map(point_from_source));
        }
        if counts.is_empty() {
            return Ok(());
        }
        let written = counts.len() as u64;
        self.write_curves(emission.target, &parent.child(POLYLINES), "3D polylines", points, counts)?;
        emission.record.own.lines += written;
        Ok(())
    }

    /// Write linear `BasisCurves` with a constant width.
    fn write_curves(
        &mut self,
        target: Target,
        path: &PrimPath,
        documentation: &str,
        points: Vec<Vec3>,
        counts: Vec<i32>,
    ) -> ExportResult<()> {
        let extent = Extent::from_curve_points(&points, CURVE_WIDTH).to_pair();
        let prim = self.layers.get_mut(target).define_prim(path, "BasisCurves")?;
        prim.documentation = Some(documentation.to_string());
        prim.set_attribute(Attribute::new("type", "token", Value::token("linear")).uniform());
        prim.set_attribute(Attribute::new("extent", "float3[]", Value::Float3Array(extent.to_vec())));
        prim.set_attribute(Attribute::new("points", "point3f[]", Value::Float3Array(points)));
        prim.set_attribute(Attribute::new("curveVertexCounts", "int[]", Value::IntArray(counts)));
        prim.set_attribute(
            Attribute::new("widths", "float[]", Value::FloatArray(vec![CURVE_WIDTH]))
                .interpolation("constant"),
        );
        Ok(())
    }

    /// Persist every layer, copy textures and package the archive.
    fn finish<W: AssetWriter + ?Sized>(&mut self, writer: &mut W) -> ExportResult<()> {
        if self.layout.arkit {
            self.layers.root.flatten_references();
        }

        writer.write_layer(&self.layers.root, &self.layout.root_layer)?;
        if let (Some(layer), Some(path)) = (&self.layers.components, &self.layout.components_layer) {
            writer.write_layer(layer, path)?;
        }
        if let (Some(layer), Some(path)) = (&self.layers.geometry, &self.layout.geometry_layer) {
            writer.write_layer(layer, path)?;
        }

        let copied = self.textures.copy_all(writer, &self.layout.texture_dir)?;

        if let Some(archive) = &self.layout.archive {
            let mut members = self.layout.layer_files();
            members.extend(copied);
            log::info!("Packaging {} files into {}", members.len(), archive.display());
            writer.package(archive, &self.layout.directory, &members)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::source::{
        Definition, Document, FaceInfo, FaceMesh, FaceRecord, Group, Instance, Parent,
        SceneCamera, Segment, SourceResult,
    };
    use crate::usd::{MemoryWriter, PrimSpec, Specifier};
    use cadusd_math::{DMat4, DVec2, DVec3};

    fn quad(x: f64) -> FaceRecord {
        FaceRecord::from_loop(vec![
            DVec3::new(x, 0.0, 0.0),
            DVec3::new(x + 1.0, 0.0, 0.0),
            DVec3::new(x + 1.0, 1.0, 0.0),
            DVec3::new(x, 1.0, 0.0),
        ])
    }

    fn uvs() -> Vec<DVec2> {
        vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(0.0, 1.0),
        ]
    }

    fn single_file() -> ExportOptions {
        ExportOptions {
            export_to_single_file: true,
            ..ExportOptions::default()
        }
    }

    fn export_with(doc: &Document, output: &str, options: &ExportOptions) -> (MemoryWriter, ExportTotals) {
        let mut writer = MemoryWriter::new();
        let totals = convert(doc, Path::new(output), options, &mut writer, &mut NoProgress).unwrap();
        (writer, totals)
    }

    fn path(s: &str) -> PrimPath {
        s.trim_start_matches('/')
            .split('/')
            .fold(PrimPath::root(), |p, name| p.child(name))
    }

    fn prim<'l>(layer: &'l Layer, s: &str) -> &'l PrimSpec {
        layer
            .prim(&path(s))
            .unwrap_or_else(|| panic!("missing prim {}", s))
    }

    /// One chair definition with a wood (textured) face and a red face,
    /// both sides alike, instanced twice at the top level.
    fn chair_document() -> Document {
        let mut doc = Document::new();
        let chair = doc.add_definition("Chair");
        doc.add_face(
            Parent::Definition(chair),
            quad(0.0)
                .with_front(Appearance::textured("maps/wood.png"))
                .with_back(Appearance::textured("maps/wood.png"))
                .with_uvs(uvs()),
        );
        let red = Appearance::color([255, 0, 0, 255]);
        doc.add_face(
            Parent::Definition(chair),
            quad(2.0).with_front(red.clone()).with_back(red),
        );
        doc.add_instance(Parent::Root, chair, "Chair A", DMat4::IDENTITY);
        doc.add_instance(
            Parent::Root,
            chair,
            "Chair B",
            DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0)),
        );
        doc
    }

    #[test]
    fn test_instance_name() {
        assert_eq!(instance_name("Chair__Definition", 3), "Chair__Instance_3");
        assert_eq!(instance_name("Chair__Definition_", 1), "Chair__Instance__1");
        assert_eq!(instance_name("Odd", 2), "Odd__Instance_2");
        assert_eq!(
            instance_name("A__Definition_B__Definition", 1),
            "A__Instance__B__Instance_1"
        );
    }

    #[test]
    fn test_definition_instanced_twice_single_file() {
        let doc = chair_document();
        let (writer, totals) = export_with(&doc, "/out/Room.usda", &single_file());

        assert_eq!(writer.layers.len(), 1);
        let layer = writer.layer_named("Room.usda").unwrap();
        assert_eq!(layer.default_prim.as_deref(), Some("Room"));
        assert_eq!(layer.up_axis.as_deref(), Some("Z"));

        let definition = prim(layer, "/Chair__Definition");
        assert_eq!(definition.specifier, Specifier::Over);
        assert_eq!(definition.kind.as_deref(), Some("component"));
        assert_eq!(definition.count_type("Material"), 2);

        let a = prim(layer, "/Room/Geom/Chair__Instance_1");
        let b = prim(layer, "/Room/Geom/Chair__Instance_2");
        let target = Reference::Internal(path("/Chair__Definition"));
        assert_eq!(a.references, vec![target.clone()]);
        assert_eq!(b.references, vec![target]);
        assert_eq!(a.instanceable, Some(true));
        assert_ne!(a.transform(), b.transform());
        let origin = b.transform().unwrap().transform_point3(DVec3::ZERO);
        assert!((origin - DVec3::new(25.4, 0.0, 0.0)).length() < 1e-9);
        assert_eq!(a.custom_data.get("source:name"), Some(&Value::String("Chair A".into())));

        assert_eq!(totals.component_definitions, 1);
        assert_eq!(totals.component_instances, 2);
        // Two quads, two triangles each, per instance.
        assert_eq!(totals.triangles(), 2 * 4);
        assert_eq!(totals.scene.original_faces, 4);
        assert_eq!(totals.meshes(), 2);
        assert_eq!(totals.materials(), 4);
        assert_eq!(totals.scene.shaders, 2 * (3 + 1));
        assert_eq!(totals.scene.geom_subsets, 4);
    }

    #[test]
    fn test_subsets_bind_materials() {
        let doc = chair_document();
        let (writer, _) = export_with(&doc, "/out/Room.usda", &single_file());
        let layer = writer.layer_named("Room.usda").unwrap();

        let mesh = prim(layer, "/Chair__Definition/BothSides");
        assert_eq!(
            mesh.attribute("doubleSided").unwrap().value,
            Some(Value::Bool(true))
        );
        assert!(mesh.relationship("material:binding").is_none());

        let wood = prim(layer, "/Chair__Definition/BothSides/wood");
        assert_eq!(wood.type_name.as_deref(), Some("GeomSubset"));
        assert_eq!(wood.attribute("indices").unwrap().value, Some(Value::IntArray(vec![0, 1])));
        assert_eq!(
            wood.relationship("material:binding").unwrap().targets,
            vec!["/Chair__Definition/Materials/wood".to_string()]
        );

        let red = prim(layer, "/Chair__Definition/BothSides/Color_FF0000");
        assert_eq!(red.attribute("indices").unwrap().value, Some(Value::IntArray(vec![2, 3])));

        let texture = prim(layer, "/Chair__Definition/Materials/wood/Texture");
        assert_eq!(
            texture.attribute("inputs:file").unwrap().value,
            Some(Value::Asset("Room_textures/wood.png".into()))
        );
        assert_eq!(writer.textures.len(), 1);
        assert_eq!(writer.textures[0].1, PathBuf::from("/out/Room_textures/wood.png"));
    }

    #[test]
    fn test_unused_definitions_are_not_written() {
        let mut doc = chair_document();
        doc.add_definition("Unused");
        let lamp = doc.add_definition("Lamp");
        let hidden = doc.add_instance(Parent::Root, lamp, "Lamp", DMat4::IDENTITY);
        doc.instance_mut(hidden).visibility.hidden = true;

        let (writer, totals) = export_with(&doc, "/out/Room.usda", &single_file());
        let layer = writer.layer_named("Room.usda").unwrap();

        assert!(layer.prim(&path("/Unused__Definition")).is_none());
        assert!(layer.prim(&path("/Lamp__Definition")).is_none());
        assert_eq!(totals.component_definitions, 1);
    }

    #[test]
    fn test_hidden_instance_of_used_definition() {
        let mut doc = chair_document();
        let chair = DefinitionId(0);
        let hidden = doc.add_instance(Parent::Root, chair, "Ghost", DMat4::IDENTITY);
        doc.instance_mut(hidden).visibility.hidden = true;

        let (writer, totals) = export_with(&doc, "/out/Room.usda", &single_file());
        let layer = writer.layer_named("Room.usda").unwrap();

        assert!(layer.prim(&path("/Chair__Definition")).is_some());
        assert!(layer.prim(&path("/Room/Geom/Chair__Instance_3")).is_none());
        assert_eq!(totals.component_instances, 2);
    }

    #[test]
    fn test_uniform_material_is_one_mesh_one_binding() {
        let mut doc = Document::new();
        let blue = Appearance::color([0, 0, 255, 255]);
        for x in [0.0, 2.0, 4.0] {
            doc.add_face(Parent::Root, quad(x).with_front(blue.clone()).with_back(blue.clone()));
        }

        let (writer, totals) = export_with(&doc, "/out/Plate.usda", &single_file());
        let layer = writer.layer_named("Plate.usda").unwrap();

        let mesh = prim(layer, "/Plate/Geom/BothSides");
        assert!(mesh.children.is_empty());
        assert_eq!(
            mesh.relationship("material:binding").unwrap().targets,
            vec!["/Plate/Geom/Materials/Color_0000FF".to_string()]
        );
        assert!(layer.prim(&path("/Plate/Geom/FrontSide")).is_none());
        assert_eq!(totals.meshes(), 1);
        assert_eq!(totals.scene.geom_subsets, 0);
        assert_eq!(totals.materials(), 1);
    }

    #[test]
    fn test_asymmetric_faces_split_front_and_back() {
        let mut doc = Document::new();
        doc.add_face(Parent::Root, quad(0.0).with_front(Appearance::color([10, 20, 30, 255])));

        let (writer, totals) = export_with(&doc, "/out/Wall.usda", &single_file());
        let layer = writer.layer_named("Wall.usda").unwrap();

        let front = prim(layer, "/Wall/Geom/FrontSide");
        let back = prim(layer, "/Wall/Geom/BackSide");
        assert_eq!(
            front.attribute("orientation").unwrap().value,
            Some(Value::token("rightHanded"))
        );
        assert_eq!(
            back.attribute("orientation").unwrap().value,
            Some(Value::token("leftHanded"))
        );
        assert_eq!(totals.meshes(), 2);
        // Triangles are counted once, not per side.
        assert_eq!(totals.triangles(), 2);

        let forced = ExportOptions {
            export_double_sided: true,
            ..single_file()
        };
        let (writer, totals) = export_with(&doc, "/out/Wall.usda", &forced);
        let layer = writer.layer_named("Wall.usda").unwrap();
        assert!(layer.prim(&path("/Wall/Geom/BothSides")).is_some());
        assert!(layer.prim(&path("/Wall/Geom/BackSide")).is_none());
        assert_eq!(totals.meshes(), 1);
    }

    #[test]
    fn test_faces_without_material_share_one_default() {
        let mut doc = Document::new();
        let chair = doc.add_definition("Chair");
        doc.add_face(
            Parent::Definition(chair),
            quad(0.0)
                .with_front(Appearance::textured("maps/wood.png"))
                .with_back(Appearance::textured("maps/wood.png"))
                .with_uvs(uvs()),
        );
        doc.add_face(Parent::Definition(chair), quad(2.0));
        doc.add_instance(Parent::Root, chair, "Chair A", DMat4::IDENTITY);
        doc.add_instance(Parent::Root, chair, "Chair B", DMat4::IDENTITY);

        let (writer, totals) = export_with(&doc, "/out/Room.usda", &single_file());
        let layer = writer.layer_named("Room.usda").unwrap();

        let definition = prim(layer, "/Chair__Definition");
        assert_eq!(definition.count_type("Material"), 2);
        assert!(layer.prim(&path("/Chair__Definition/Materials/wood")).is_some());
        assert!(layer.prim(&path("/Chair__Definition/Materials/Default")).is_some());

        let front = prim(layer, "/Chair__Definition/FrontSide");
        let back = prim(layer, "/Chair__Definition/BackSide");
        assert_eq!(front.count_type("GeomSubset"), 2);
        assert_eq!(back.count_type("GeomSubset"), 2);
        let default = vec!["/Chair__Definition/Materials/Default".to_string()];
        assert_eq!(
            prim(layer, "/Chair__Definition/FrontSide/Default")
                .relationship("material:binding")
                .unwrap()
                .targets,
            default
        );
        assert_eq!(
            prim(layer, "/Chair__Definition/BackSide/Default")
                .relationship("material:binding")
                .unwrap()
                .targets,
            default
        );

        assert_eq!(totals.materials(), 2 * 2);
        assert_eq!(totals.scene.shaders, 2 * (3 + 1));
    }

    #[test]
    fn test_split_layout() {
        let doc = chair_document();
        let (writer, _) = export_with(&doc, "/out/Room.usda", &ExportOptions::default());

        assert_eq!(
            writer.write_order,
            vec![
                PathBuf::from("/out/Room.usda"),
                PathBuf::from("/out/Room.components.usda"),
                PathBuf::from("/out/Room.geom.usda"),
            ]
        );

        let root = writer.layer_named("Room.usda").unwrap();
        assert_eq!(root.sublayers, vec!["./Room.geom.usda".to_string()]);
        assert!(root.prim(&path("/Room/Geom")).is_none());
        assert!(root.prim(&path("/Chair__Definition")).is_none());

        let components = writer.layer_named("Room.components.usda").unwrap();
        assert_eq!(prim(components, "/Chair__Definition").specifier, Specifier::Def);

        let geometry = writer.layer_named("Room.geom.usda").unwrap();
        assert_eq!(prim(geometry, "/Room").specifier, Specifier::Over);
        assert_eq!(
            prim(geometry, "/Room/Geom/Chair__Instance_1").references,
            vec![Reference::External {
                asset_path: "./Room.components.usda".to_string(),
                prim_path: path("/Chair__Definition"),
            }]
        );
    }

    #[test]
    fn test_arkit_usdz_is_flattened_and_packaged() {
        let doc = chair_document();
        let (writer, totals) = export_with(&doc, "/out/Room.usdz", &ExportOptions::default());

        assert_eq!(writer.layers.len(), 1);
        let layer = writer.layer_named("Room.usda").unwrap();
        assert!(layer.prim(&path("/Chair__Definition")).is_none());

        let instance = prim(layer, "/Room/Geom/Chair__Instance_1");
        assert!(instance.references.is_empty());
        assert_eq!(instance.instanceable, None);
        let subset = prim(layer, "/Room/Geom/Chair__Instance_1/BothSides/wood");
        assert_eq!(
            subset.relationship("material:binding").unwrap().targets,
            vec!["/Room/Geom/Chair__Instance_1/Materials/wood".to_string()]
        );

        assert_eq!(writer.archives.len(), 1);
        assert_eq!(writer.archives[0].path, PathBuf::from("/out/Room.usdz"));
        assert_eq!(
            writer.archives[0].entries,
            vec!["Room.usda".to_string(), "Room_textures/wood.png".to_string()]
        );
        assert_eq!(totals.component_instances, 2);
    }

    #[test]
    fn test_usdz_without_arkit_packages_every_layer() {
        let doc = chair_document();
        let options = ExportOptions {
            export_arkit_compatible: false,
            ..ExportOptions::default()
        };
        let (writer, _) = export_with(&doc, "/out/Room.usdz", &options);

        assert_eq!(writer.layers.len(), 3);
        let geometry = writer.layer_named("Room.geom.usda").unwrap();
        assert_eq!(
            prim(geometry, "/Room/Geom/Chair__Instance_1").instanceable,
            Some(true)
        );
        assert_eq!(writer.archives[0].entries[0], "Room.usda");
        assert_eq!(writer.archives[0].entries.len(), 4);
    }

    #[test]
    fn test_nested_definitions_scale_stats() {
        let mut doc = Document::new();
        let leg = doc.add_definition("Leg");
        doc.add_face(Parent::Definition(leg), quad(0.0));
        let table = doc.add_definition("Table");
        for i in 0..4 {
            doc.add_instance(Parent::Definition(table), leg, format!("Leg {}", i), DMat4::IDENTITY);
        }
        for i in 0..3 {
            doc.add_instance(Parent::Root, table, format!("Table {}", i), DMat4::IDENTITY);
        }

        let (writer, totals) = export_with(&doc, "/out/Hall.usda", &single_file());
        let layer = writer.layer_named("Hall.usda").unwrap();

        // The table is declared after the leg it places.
        assert_eq!(
            prim(layer, "/Table__Definition/Leg__Instance_1").references,
            vec![Reference::Internal(path("/Leg__Definition"))]
        );
        assert!(layer.prim(&path("/Table__Definition/Leg__Instance_4")).is_some());
        assert!(layer.prim(&path("/Hall/Geom/Table__Instance_3")).is_some());

        assert_eq!(totals.component_definitions, 2);
        assert_eq!(totals.component_instances, 7);
        assert_eq!(totals.triangles(), 3 * 4 * 2);
        assert_eq!(totals.meshes(), 3 * 4 * 2);
    }

    #[test]
    fn test_groups_names_and_inherited_material() {
        let mut doc = Document::new();
        let named = doc.add_group(Parent::Root, "Kitchen", DMat4::IDENTITY);
        let first = doc.add_group(Parent::Group(named), "", DMat4::IDENTITY);
        let second = doc.add_group(Parent::Group(named), "", DMat4::IDENTITY);
        doc.group_mut(first).material = Some(Appearance::color([0, 255, 0, 255]));
        doc.add_face(Parent::Group(first), quad(0.0));
        doc.add_face(Parent::Group(second), quad(0.0));
        let hidden = doc.add_group(Parent::Root, "Hidden", DMat4::IDENTITY);
        doc.group_mut(hidden).visibility.hidden = true;

        let (writer, _) = export_with(&doc, "/out/Home.usda", &single_file());
        let layer = writer.layer_named("Home.usda").unwrap();

        let kitchen = prim(layer, "/Home/Geom/Kitchen");
        assert_eq!(kitchen.kind.as_deref(), Some("group"));
        assert_eq!(kitchen.custom_data.get("source:name"), Some(&Value::String("Kitchen".into())));
        assert!(layer.prim(&path("/Home/Geom/Hidden")).is_none());

        let green = prim(layer, "/Home/Geom/Kitchen/GRP_0/BothSides");
        assert_eq!(
            green.relationship("material:binding").unwrap().targets,
            vec!["/Home/Geom/Materials/Color_00FF00".to_string()]
        );
        // No group material: default colors differ per side, the material
        // does not.
        let default = vec!["/Home/Geom/Materials/Default".to_string()];
        for side in ["FrontSide", "BackSide"] {
            let mesh = prim(layer, &format!("/Home/Geom/Kitchen/GRP_1/{}", side));
            assert_eq!(mesh.relationship("material:binding").unwrap().targets, default);
        }
    }

    #[test]
    fn test_names_never_collide_with_fixed_children() {
        let mut doc = Document::new();
        doc.add_group(Parent::Root, "Materials", DMat4::IDENTITY);
        let edges = doc.add_group(Parent::Root, "Edges", DMat4::IDENTITY);
        doc.add_edge(Parent::Group(edges), DVec3::ZERO, DVec3::X);
        doc.add_face(Parent::Root, quad(0.0));

        let (writer, _) = export_with(&doc, "/out/N.usda", &single_file());
        let layer = writer.layer_named("N.usda").unwrap();

        assert_eq!(prim(layer, "/N/Geom/Materials_").type_name.as_deref(), Some("Xform"));
        assert_eq!(prim(layer, "/N/Geom/Materials").type_name.as_deref(), Some("Scope"));
        assert_eq!(prim(layer, "/N/Geom/Edges_").type_name.as_deref(), Some("Xform"));
        assert!(layer.prim(&path("/N/Geom/Edges_/Edges")).is_none());
    }

    #[test]
    fn test_edges_curves_and_polylines() {
        let mut doc = Document::new();
        doc.add_edge(Parent::Root, DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0));
        doc.add_edge(Parent::Root, DVec3::ZERO, DVec3::new(0.0, 1.0, 0.0));
        doc.add_curve(
            Parent::Root,
            &[DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0)],
        );
        doc.add_polyline(Parent::Root, vec![DVec3::ZERO, DVec3::Y, DVec3::ONE]);
        doc.add_polyline(Parent::Root, vec![DVec3::ZERO]);

        let (writer, totals) = export_with(&doc, "/out/Wire.usda", &{
            let mut options = ExportOptions::everything();
            options.export_to_single_file = true;
            options
        });
        let layer = writer.layer_named("Wire.usda").unwrap();

        let edges = prim(layer, "/Wire/Geom/Edges");
        assert_eq!(edges.type_name.as_deref(), Some("BasisCurves"));
        assert_eq!(
            edges.attribute("curveVertexCounts").unwrap().value,
            Some(Value::IntArray(vec![2, 2]))
        );
        let widths = edges.attribute("widths").unwrap();
        assert_eq!(widths.interpolation.as_deref(), Some("constant"));
        assert_eq!(widths.value, Some(Value::FloatArray(vec![1.0])));

        let curves = prim(layer, "/Wire/Geom/Curves");
        assert_eq!(
            curves.attribute("curveVertexCounts").unwrap().value,
            Some(Value::IntArray(vec![4]))
        );
        let lines = prim(layer, "/Wire/Geom/Polylines");
        assert_eq!(
            lines.attribute("curveVertexCounts").unwrap().value,
            Some(Value::IntArray(vec![3]))
        );

        assert_eq!(totals.scene.edges, 2);
        assert_eq!(totals.scene.curves, 1);
        assert_eq!(totals.scene.lines, 1);
    }

    #[test]
    fn test_disabled_geometry_kinds_are_skipped() {
        let mut doc = Document::new();
        doc.add_face(Parent::Root, quad(0.0));
        doc.add_edge(Parent::Root, DVec3::ZERO, DVec3::X);
        let options = ExportOptions {
            export_meshes: false,
            export_materials: false,
            ..single_file()
        };

        let (writer, totals) = export_with(&doc, "/out/E.usda", &options);
        let geom = prim(writer.layer_named("E.usda").unwrap(), "/E/Geom");
        assert!(geom.children.is_empty());
        assert_eq!(totals.meshes(), 0);
        assert_eq!(totals.scene.edges, 0);
    }

    #[test]
    fn test_cameras_in_root_layer() {
        let mut doc = chair_document();
        doc.add_scene(SceneCamera {
            name: "Entry".to_string(),
            eye: DVec3::new(0.0, -100.0, 60.0),
            target: DVec3::new(0.0, 0.0, 60.0),
            up: DVec3::Z,
            perspective: true,
            fov_degrees: 35.0,
            ortho_height: 1.0,
            aspect_ratio: None,
        });

        let (writer, totals) = export_with(&doc, "/out/Room.usda", &ExportOptions::default());
        let root = writer.layer_named("Room.usda").unwrap();
        assert_eq!(prim(root, "/Room/Scenes/Entry").type_name.as_deref(), Some("Camera"));
        assert_eq!(totals.cameras, 1);
        assert!(totals.summary().contains("Exported 1 Camera w/aspect ratio 1.78:1"));

        let options = ExportOptions {
            export_cameras: false,
            ..ExportOptions::default()
        };
        let (writer, totals) = export_with(&doc, "/out/Room.usda", &options);
        assert!(writer.layer_named("Room.usda").unwrap().prim(&path("/Room/Scenes")).is_none());
        assert_eq!(totals.cameras, 0);
    }

    #[test]
    fn test_billboard_definitions_are_flagged() {
        let mut doc = chair_document();
        doc.definition_mut(DefinitionId(0)).always_face_camera = true;

        let (writer, _) = export_with(&doc, "/out/Room.usda", &single_file());
        let instance = prim(writer.layer_named("Room.usda").unwrap(), "/Room/Geom/Chair__Instance_1");
        assert_eq!(instance.custom_data.get("source:billboard"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_renamed_root_prim() {
        let doc = chair_document();
        let (writer, _) = export_with(&doc, "/out/3rd floor.usda", &single_file());
        let layer = writer.layer_named("3rd floor.usda").unwrap();
        assert_eq!(layer.default_prim.as_deref(), Some("_3rd_floor"));
        assert!(layer.prim(&path("/_3rd_floor/Geom")).is_some());
    }

    #[test]
    fn test_duplicate_definition_names() {
        let mut doc = Document::new();
        let first = doc.add_definition("Box");
        let second = doc.add_definition("Box");
        doc.add_face(Parent::Definition(first), quad(0.0));
        doc.add_face(Parent::Definition(second), quad(5.0));
        doc.add_instance(Parent::Root, first, "a", DMat4::IDENTITY);
        doc.add_instance(Parent::Root, second, "b", DMat4::IDENTITY);

        let (writer, _) = export_with(&doc, "/out/B.usda", &single_file());
        let layer = writer.layer_named("B.usda").unwrap();

        assert_eq!(
            prim(layer, "/B/Geom/Box__Instance_1").references,
            vec![Reference::Internal(path("/Box__Definition"))]
        );
        assert_eq!(
            prim(layer, "/B/Geom/Box__Instance__1").references,
            vec![Reference::Internal(path("/Box__Definition_"))]
        );
    }

    #[test]
    fn test_cancellation() {
        let doc = chair_document();
        let mut writer = MemoryWriter::new();
        let mut cancel_after_census = |percent: f64, _: &str| {
            if percent >= 10.0 {
                Progress::Cancel
            } else {
                Progress::Continue
            }
        };

        let result = convert(
            &doc,
            Path::new("/out/Room.usda"),
            &ExportOptions::default(),
            &mut writer,
            &mut cancel_after_census,
        );
        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert!(writer.layers.is_empty());
    }

    #[test]
    fn test_progress_milestones_increase() {
        let doc = chair_document();
        let mut seen = Vec::new();
        let mut record = |percent: f64, _: &str| {
            seen.push(percent);
            Progress::Continue
        };
        convert(
            &doc,
            Path::new("/out/Room.usda"),
            &ExportOptions::default(),
            &mut MemoryWriter::new(),
            &mut record,
        )
        .unwrap();

        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_source_failure_aborts() {
        let mut doc = chair_document();
        doc.add_instance(Parent::Root, DefinitionId(42), "Broken", DMat4::IDENTITY);

        let mut writer = MemoryWriter::new();
        let result = convert(
            &doc,
            Path::new("/out/Room.usda"),
            &ExportOptions::default(),
            &mut writer,
            &mut NoProgress,
        );
        assert!(matches!(
            result,
            Err(ExportError::Source(SourceError::UnknownEntity { kind: "definition", id: 42 }))
        ));
        assert!(writer.layers.is_empty());
    }

    /// Drops one definition from enumeration, as a source whose census and
    /// definition list disagree would.
    struct MissingDefinition {
        doc: Document,
        missing: DefinitionId,
    }

    impl SourceDocument for MissingDefinition {
        fn root_entities(&self) -> SourceResult<EntityList> {
            self.doc.root_entities()
        }
        fn definition_ids(&self) -> SourceResult<Vec<DefinitionId>> {
            let mut ids = self.doc.definition_ids()?;
            ids.retain(|&id| id != self.missing);
            Ok(ids)
        }
        fn definition(&self, id: DefinitionId) -> SourceResult<Definition> {
            self.doc.definition(id)
        }
        fn instance(&self, id: InstanceId) -> SourceResult<Instance> {
            self.doc.instance(id)
        }
        fn group(&self, id: GroupId) -> SourceResult<Group> {
            self.doc.group(id)
        }
        fn face(&self, id: FaceId) -> SourceResult<FaceInfo> {
            self.doc.face(id)
        }
        fn face_mesh(&self, id: FaceId) -> SourceResult<FaceMesh> {
            self.doc.face_mesh(id)
        }
        fn edge(&self, id: EdgeId) -> SourceResult<Segment> {
            self.doc.edge(id)
        }
        fn curve(&self, id: CurveId) -> SourceResult<Vec<Segment>> {
            self.doc.curve(id)
        }
        fn polyline(&self, id: PolylineId) -> SourceResult<Vec<DVec3>> {
            self.doc.polyline(id)
        }
        fn scenes(&self) -> SourceResult<Vec<SceneCamera>> {
            self.doc.scenes()
        }
    }

    #[test]
    fn test_missing_definition_mapping_skips_instance() {
        let mut doc = chair_document();
        let lamp = doc.add_definition("Lamp");
        doc.add_face(Parent::Definition(lamp), quad(0.0));
        doc.add_instance(Parent::Root, lamp, "Lamp", DMat4::IDENTITY);
        let source = MissingDefinition { doc, missing: lamp };

        let (writer, totals) = {
            let mut writer = MemoryWriter::new();
            let totals = convert(
                &source,
                Path::new("/out/Room.usda"),
                &single_file(),
                &mut writer,
                &mut NoProgress,
            )
            .unwrap();
            (writer, totals)
        };
        let layer = writer.layer_named("Room.usda").unwrap();

        assert!(layer.prim(&path("/Lamp__Definition")).is_none());
        assert!(layer.prim(&path("/Room/Geom/Lamp__Instance_1")).is_none());
        assert_eq!(totals.component_instances, 2);
    }

    #[test]
    fn test_export_to_disk_usdz() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let texture = dir.path().join("wood.png");
        std::fs::write(&texture, b"png").unwrap();

        let mut doc = chair_document();
        let face = doc.face_mut(FaceId(0));
        face.front = Some(Appearance::textured("wood.png"));
        face.back = Some(Appearance::textured("wood.png"));

        let output = dir.path().join("Room.usdz");
        let totals = Exporter::new(&doc, ExportOptions::default())
            .texture_base_dir(dir.path())
            .export(&output, &mut crate::usd::FileSystemWriter::new(), &mut NoProgress)
            .unwrap();

        assert!(output.exists());
        assert!(!dir.path().join("Room.usda").exists());
        let file = std::fs::File::open(&output).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0).unwrap().name(), "Room.usda");
        assert_eq!(archive.by_index(1).unwrap().name(), "Room_textures/wood.png");
        assert_eq!(totals.component_instances, 2);
    }

    #[test]
    fn test_texture_already_in_texture_dir_is_left_intact() {
        let dir = tempfile::tempdir().unwrap();
        let texture = dir.path().join("Room_textures").join("wood.png");
        std::fs::create_dir_all(texture.parent().unwrap()).unwrap();
        std::fs::write(&texture, b"PNGDATA").unwrap();

        let mut doc = chair_document();
        let face = doc.face_mut(FaceId(0));
        face.front = Some(Appearance::textured("Room_textures/wood.png"));
        face.back = Some(Appearance::textured("Room_textures/wood.png"));

        for output in ["Room.usda", "Room.usdz"] {
            let output = dir.path().join(output);
            Exporter::new(&doc, ExportOptions::default())
                .texture_base_dir(dir.path())
                .export(&output, &mut crate::usd::FileSystemWriter::new(), &mut NoProgress)
                .unwrap();

            assert!(output.exists());
            assert_eq!(std::fs::read(&texture).unwrap(), b"PNGDATA");
        }

        let file = std::fs::File::open(dir.path().join("Room.usdz")).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut packaged = Vec::new();
        std::io::Read::read_to_end(&mut archive.by_name("Room_textures/wood.png").unwrap(), &mut packaged)
            .unwrap();
        assert_eq!(packaged, b"PNGDATA");
    }
}
