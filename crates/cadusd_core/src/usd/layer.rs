//! In-memory layers and prim lookup.

use std::collections::BTreeSet;

use thiserror::Error;

use super::types::{PrimPath, PrimSpec, Reference, Specifier};

/// Errors raised while authoring or persisting output.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Parent prim does not exist for {0}")]
    MissingParent(String),

    #[error("No prim at {0}")]
    UnknownPrim(String),

    #[error("Invalid prim path: {0}")]
    InvalidPath(String),
}

/// Result type for output authoring.
pub type WriteResult<T> = Result<T, WriteError>;

/// One output file's worth of scene description.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    /// File name this layer is written to, e.g. `model.geom.usda`
    pub identifier: String,
    pub default_prim: Option<String>,
    pub documentation: Option<String>,
    pub up_axis: Option<String>,
    pub meters_per_unit: Option<f64>,
    /// Relative paths of sublayers, strongest first
    pub sublayers: Vec<String>,
    pub root_prims: Vec<PrimSpec>,
}

impl Layer {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            default_prim: None,
            documentation: None,
            up_axis: None,
            meters_per_unit: None,
            sublayers: Vec::new(),
            root_prims: Vec::new(),
        }
    }

    /// Z-up, centimeter stage metadata used by every exported layer.
    pub fn with_stage_metadata(mut self) -> Self {
        self.up_axis = Some("Z".to_string());
        self.meters_per_unit = Some(0.01);
        self
    }

    /// Define a prim (or retype an existing one). The parent must exist.
    pub fn define_prim(&mut self, path: &PrimPath, type_name: &str) -> WriteResult<&mut PrimSpec> {
        let name = path.name();
        if name.is_empty() {
            return Err(WriteError::InvalidPath(path.to_string()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| WriteError::InvalidPath(path.to_string()))?;

        let siblings = if parent.is_root() {
            &mut self.root_prims
        } else {
            &mut self
                .prim_mut(&parent)
                .ok_or_else(|| WriteError::MissingParent(path.to_string()))?
                .children
        };

        let index = match siblings.iter().position(|p| p.name == name) {
            Some(i) => i,
            None => {
                siblings.push(PrimSpec::new(name, None));
                siblings.len() - 1
            }
        };
        let prim = &mut siblings[index];
        prim.specifier = Specifier::Def;
        if !type_name.is_empty() {
            prim.type_name = Some(type_name.to_string());
        }
        Ok(prim)
    }

    pub fn prim(&self, path: &PrimPath) -> Option<&PrimSpec> {
        let mut components = path.components();
        let first = components.next()?;
        let mut prim = self.root_prims.iter().find(|p| p.name == first)?;
        for name in components {
            prim = prim.child(name)?;
        }
        Some(prim)
    }

    pub fn prim_mut(&mut self, path: &PrimPath) -> Option<&mut PrimSpec> {
        let mut components = path.components();
        let first = components.next()?;
        let mut prim = self.root_prims.iter_mut().find(|p| p.name == first)?;
        for name in components {
            prim = prim.child_mut(name)?;
        }
        Some(prim)
    }

    /// Get a prim that must already exist.
    pub fn existing_prim_mut(&mut self, path: &PrimPath) -> WriteResult<&mut PrimSpec> {
        self.prim_mut(path)
            .ok_or_else(|| WriteError::UnknownPrim(path.to_string()))
    }

    /// Turn a defined prim into an `over`, so it only serves as a
    /// reference target.
    pub fn make_over(&mut self, path: &PrimPath) -> WriteResult<()> {
        self.existing_prim_mut(path)?.specifier = Specifier::Over;
        Ok(())
    }

    /// Replace every internal reference with a copy of the referenced
    /// subtree, then drop the `over` prims that only served as targets.
    ///
    /// Connections and relationship targets inside each copy are remapped
    /// to the copy's location. Instanceable flags are cleared since there
    /// is nothing left to share. Cyclic references are skipped with a
    /// warning.
    pub fn flatten_references(&mut self) {
        let source = self.clone();
        let mut targets = BTreeSet::new();
        let mut stack = Vec::new();

        let mut prims = std::mem::take(&mut self.root_prims);
        for prim in &mut prims {
            let path = PrimPath::root().child(&prim.name);
            expand_references(prim, &path, &source, &mut stack, &mut targets);
        }
        prims.retain(|p| {
            let path = PrimPath::root().child(&p.name);
            !(p.specifier == Specifier::Over && targets.contains(&path))
        });
        self.root_prims = prims;
    }
}

fn expand_references(
    prim: &mut PrimSpec,
    path: &PrimPath,
    source: &Layer,
    stack: &mut Vec<PrimPath>,
    targets: &mut BTreeSet<PrimPath>,
) {
    for child in &mut prim.children {
        let child_path = path.child(&child.name);
        expand_references(child, &child_path, source, stack, targets);
    }

    let references = std::mem::take(&mut prim.references);
    for reference in references {
        let target = match reference {
            Reference::Internal(target) => target,
            external @ Reference::External { .. } => {
                prim.references.push(external);
                continue;
            }
        };
        if stack.contains(&target) {
            log::warn!("Cyclic reference to {} at {}; skipping", target, path);
            continue;
        }
        let Some(referenced) = source.prim(&target) else {
            log::warn!("Reference target {} does not exist; skipping", target);
            continue;
        };
        targets.insert(target.clone());

        let mut copy = referenced.clone();
        copy.remap_paths(&target, path);
        stack.push(target);
        expand_references(&mut copy, path, source, stack, targets);
        stack.pop();

        merge_weaker(prim, copy);
    }
    prim.instanceable = None;
}

/// Merge opinions from a referenced prim. Opinions already on `prim` win.
fn merge_weaker(prim: &mut PrimSpec, weaker: PrimSpec) {
    if prim.type_name.is_none() {
        prim.type_name = weaker.type_name;
    }
    if prim.kind.is_none() {
        prim.kind = weaker.kind;
    }
    for schema in weaker.api_schemas {
        prim.apply_api(&schema);
    }
    for (key, value) in weaker.custom_data {
        prim.custom_data.entry(key).or_insert(value);
    }
    for attribute in weaker.attributes {
        if prim.attribute(&attribute.name).is_none() {
            prim.attributes.push(attribute);
        }
    }
    for relationship in weaker.relationships {
        if prim.relationship(&relationship.name).is_none() {
            prim.relationships.push(relationship);
        }
    }
    let mut children = Vec::with_capacity(weaker.children.len() + prim.children.len());
    for mut child in weaker.children {
        child.specifier = Specifier::Def;
        if prim.child(&child.name).is_none() {
            children.push(child);
        }
    }
    children.append(&mut prim.children);
    prim.children = children;
}
