//! Scene description building blocks: paths, values, properties and prims.

use std::collections::BTreeMap;
use std::fmt;

use cadusd_math::{DMat4, DVec3, Vec2, Vec3};

/// An absolute prim path such as `/Model/Geom/Chair__Instance_1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimPath(String);

impl PrimPath {
    /// The pseudo-root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path of a child prim. `name` must already be a valid identifier.
    pub fn child(&self, name: &str) -> Self {
        if self.is_root() {
            Self(format!("/{}", name))
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    /// Path of a property on this prim, e.g. `/Mat/Shader.outputs:surface`.
    pub fn property(&self, name: &str) -> String {
        format!("{}.{}", self.0, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component (empty for the root).
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(i) => Some(Self(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Names from the root down to this prim.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Replace a leading `from` prefix of `target` (a prim or property path)
    /// with `to`. Returns `None` when `target` is not below `from`.
    pub fn remap(target: &str, from: &PrimPath, to: &PrimPath) -> Option<String> {
        let rest = target.strip_prefix(from.as_str())?;
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('.') {
            Some(format!("{}{}", to.as_str(), rest))
        } else {
            None
        }
    }
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed attribute or metadata value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Token(String),
    String(String),
    Asset(String),
    Float2(Vec2),
    Float3(Vec3),
    Double3(DVec3),
    Matrix4d(DMat4),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Float2Array(Vec<Vec2>),
    Float3Array(Vec<Vec3>),
    TokenArray(Vec<String>),
}

impl Value {
    pub fn token(s: impl Into<String>) -> Self {
        Value::Token(s.into())
    }

    /// Type name used for this value in customData dictionaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Token(_) => "token",
            Value::String(_) => "string",
            Value::Asset(_) => "asset",
            Value::Float2(_) => "float2",
            Value::Float3(_) => "float3",
            Value::Double3(_) => "double3",
            Value::Matrix4d(_) => "matrix4d",
            Value::IntArray(_) => "int[]",
            Value::FloatArray(_) => "float[]",
            Value::Float2Array(_) => "float2[]",
            Value::Float3Array(_) => "float3[]",
            Value::TokenArray(_) => "token[]",
        }
    }
}

/// An attribute on a prim.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// Declared type, e.g. `point3f[]` or `color3f`
    pub type_name: String,
    /// `None` declares the attribute without authoring a value
    pub value: Option<Value>,
    /// Connection source (a property path), for shading networks
    pub connection: Option<String>,
    pub uniform: bool,
    /// Primvar interpolation metadata
    pub interpolation: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: Some(value),
            connection: None,
            uniform: false,
            interpolation: None,
        }
    }

    /// An attribute declared without a value (e.g. a shader output).
    pub fn declared(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: None,
            connection: None,
            uniform: false,
            interpolation: None,
        }
    }

    /// An attribute whose value comes from another property.
    pub fn connected(name: impl Into<String>, type_name: impl Into<String>, source: String) -> Self {
        Self {
            connection: Some(source),
            ..Self::declared(name, type_name)
        }
    }

    pub fn uniform(mut self) -> Self {
        self.uniform = true;
        self
    }

    pub fn interpolation(mut self, interpolation: &str) -> Self {
        self.interpolation = Some(interpolation.to_string());
        self
    }
}

/// A relationship with explicit targets.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub name: String,
    pub targets: Vec<String>,
}

/// A composition reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Reference {
    /// A prim in the same layer stack: `</Chair__Definition>`
    Internal(PrimPath),
    /// A prim in another file: `@./model.components.usda@</Chair__Definition>`
    External { asset_path: String, prim_path: PrimPath },
}

/// `def` or `over`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Specifier {
    /// Defines the prim; it is present on the composed stage.
    Def,
    /// Only holds opinions; contributes nothing renderable on its own.
    Over,
}

/// One prim and its subtree.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimSpec {
    pub name: String,
    pub specifier: Specifier,
    pub type_name: Option<String>,
    pub kind: Option<String>,
    pub instanceable: Option<bool>,
    pub documentation: Option<String>,
    /// Applied API schemas, e.g. `MaterialBindingAPI`
    pub api_schemas: Vec<String>,
    pub custom_data: BTreeMap<String, Value>,
    pub references: Vec<Reference>,
    pub attributes: Vec<Attribute>,
    pub relationships: Vec<Relationship>,
    pub children: Vec<PrimSpec>,
}

impl PrimSpec {
    pub fn new(name: impl Into<String>, type_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            specifier: Specifier::Def,
            type_name: type_name.map(str::to_string),
            kind: None,
            instanceable: None,
            documentation: None,
            api_schemas: Vec::new(),
            custom_data: BTreeMap::new(),
            references: Vec::new(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&PrimSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut PrimSpec> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Add or replace an attribute.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Add a relationship target, creating the relationship if needed.
    pub fn add_target(&mut self, name: &str, target: String) {
        match self.relationships.iter_mut().find(|r| r.name == name) {
            Some(rel) => rel.targets.push(target),
            None => self.relationships.push(Relationship {
                name: name.to_string(),
                targets: vec![target],
            }),
        }
    }

    pub fn apply_api(&mut self, schema: &str) {
        if !self.api_schemas.iter().any(|s| s == schema) {
            self.api_schemas.push(schema.to_string());
        }
    }

    /// Bind a material, applying the binding API.
    pub fn bind_material(&mut self, material: &PrimPath) {
        self.apply_api("MaterialBindingAPI");
        self.relationships.retain(|r| r.name != "material:binding");
        self.add_target("material:binding", material.to_string());
    }

    pub fn set_custom_data(&mut self, key: &str, value: Value) {
        self.custom_data.insert(key.to_string(), value);
    }

    /// Author a matrix transform with its op order.
    pub fn set_transform(&mut self, matrix: DMat4) {
        self.set_attribute(Attribute::new(
            "xformOp:transform",
            "matrix4d",
            Value::Matrix4d(matrix),
        ));
        self.set_attribute(
            Attribute::new(
                "xformOpOrder",
                "token[]",
                Value::TokenArray(vec!["xformOp:transform".to_string()]),
            )
            .uniform(),
        );
    }

    /// The authored transform, if any.
    pub fn transform(&self) -> Option<DMat4> {
        match self.attribute("xformOp:transform")?.value {
            Some(Value::Matrix4d(m)) => Some(m),
            _ => None,
        }
    }

    /// Rewrite relationship targets and connections that point below `from`
    /// so they point below `to`, throughout this subtree.
    pub fn remap_paths(&mut self, from: &PrimPath, to: &PrimPath) {
        for rel in &mut self.relationships {
            for target in &mut rel.targets {
                if let Some(remapped) = PrimPath::remap(target, from, to) {
                    *target = remapped;
                }
            }
        }
        for attr in &mut self.attributes {
            if let Some(source) = &attr.connection {
                if let Some(remapped) = PrimPath::remap(source, from, to) {
                    attr.connection = Some(remapped);
                }
            }
        }
        for child in &mut self.children {
            child.remap_paths(from, to);
        }
    }

    /// Count prims in this subtree (including self) matching a type name.
    pub fn count_type(&self, type_name: &str) -> usize {
        let own = usize::from(self.type_name.as_deref() == Some(type_name));
        own + self
            .children
            .iter()
            .map(|c| c.count_type(type_name))
            .sum::<usize>()
    }
}
