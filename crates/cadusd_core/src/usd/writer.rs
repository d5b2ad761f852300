//! USDA (ASCII) serialization.
//!
//! Produces text that `usdcat`/`usdview` accept:
//!
//! - layer metadata block (`defaultPrim`, `upAxis`, `subLayers`, ...)
//! - `def`/`over` prims with `kind`, `instanceable`, `customData`, `references`
//! - typed attributes, `uniform` variability, `.connect` sources
//! - `rel` targets

use std::fmt::Write as _;

use super::layer::Layer;
use super::types::*;

const INDENT: &str = "    ";

/// Serialize a layer to USDA text.
pub fn write_usda(layer: &Layer) -> String {
    let mut writer = UsdaWriter::new();
    writer.write_layer(layer);
    writer.finish()
}

/// USDA text writer.
struct UsdaWriter {
    out: String,
    depth: usize,
}

impl UsdaWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn write_layer(&mut self, layer: &Layer) {
        self.line("#usda 1.0");
        self.line("(");
        self.depth += 1;
        if let Some(default_prim) = &layer.default_prim {
            self.line(&format!("defaultPrim = {}", quote(default_prim)));
        }
        if let Some(doc) = &layer.documentation {
            self.line(&format!("doc = {}", quote(doc)));
        }
        if let Some(meters) = layer.meters_per_unit {
            self.line(&format!("metersPerUnit = {}", meters));
        }
        if !layer.sublayers.is_empty() {
            self.line("subLayers = [");
            self.depth += 1;
            let count = layer.sublayers.len();
            for (i, sublayer) in layer.sublayers.iter().enumerate() {
                let sep = if i + 1 < count { "," } else { "" };
                self.line(&format!("@{}@{}", sublayer, sep));
            }
            self.depth -= 1;
            self.line("]");
        }
        if let Some(up_axis) = &layer.up_axis {
            self.line(&format!("upAxis = {}", quote(up_axis)));
        }
        self.depth -= 1;
        self.line(")");

        for prim in &layer.root_prims {
            self.out.push('\n');
            self.write_prim(prim);
        }
    }

    fn write_prim(&mut self, prim: &PrimSpec) {
        let specifier = match prim.specifier {
            Specifier::Def => "def",
            Specifier::Over => "over",
        };
        let header = match &prim.type_name {
            Some(type_name) => format!("{} {} {}", specifier, type_name, quote(&prim.name)),
            None => format!("{} {}", specifier, quote(&prim.name)),
        };

        if has_metadata(prim) {
            self.line(&format!("{} (", header));
            self.depth += 1;
            self.write_prim_metadata(prim);
            self.depth -= 1;
            self.line(")");
        } else {
            self.line(&header);
        }

        self.line("{");
        self.depth += 1;
        for attribute in &prim.attributes {
            self.write_attribute(attribute);
        }
        for relationship in &prim.relationships {
            self.write_relationship(relationship);
        }
        for (i, child) in prim.children.iter().enumerate() {
            if i > 0 || !prim.attributes.is_empty() || !prim.relationships.is_empty() {
                self.out.push('\n');
            }
            self.write_prim(child);
        }
        self.depth -= 1;
        self.line("}");
    }

    fn write_prim_metadata(&mut self, prim: &PrimSpec) {
        if let Some(doc) = &prim.documentation {
            self.line(&format!("doc = {}", quote(doc)));
        }
        if let Some(kind) = &prim.kind {
            self.line(&format!("kind = {}", quote(kind)));
        }
        if let Some(instanceable) = prim.instanceable {
            self.line(&format!("instanceable = {}", instanceable));
        }
        if !prim.api_schemas.is_empty() {
            let list: Vec<_> = prim.api_schemas.iter().map(|s| quote(s)).collect();
            self.line(&format!("prepend apiSchemas = [{}]", list.join(", ")));
        }
        if !prim.custom_data.is_empty() {
            self.line("customData = {");
            self.depth += 1;
            for (key, value) in &prim.custom_data {
                self.line(&format!(
                    "{} {} = {}",
                    value.type_name(),
                    quote(key),
                    format_value(value)
                ));
            }
            self.depth -= 1;
            self.line("}");
        }
        match prim.references.as_slice() {
            [] => {}
            [single] => self.line(&format!("prepend references = {}", format_reference(single))),
            many => {
                let list: Vec<_> = many.iter().map(format_reference).collect();
                self.line(&format!("prepend references = [{}]", list.join(", ")));
            }
        }
    }

    fn write_attribute(&mut self, attribute: &Attribute) {
        let mut decl = String::new();
        if attribute.uniform {
            decl.push_str("uniform ");
        }
        let _ = write!(decl, "{} {}", attribute.type_name, attribute.name);

        if let Some(source) = &attribute.connection {
            let _ = write!(decl, ".connect = <{}>", source);
        } else if let Some(value) = &attribute.value {
            let _ = write!(decl, " = {}", format_value(value));
        }

        if let Some(interpolation) = &attribute.interpolation {
            self.line(&format!("{} (", decl));
            self.depth += 1;
            self.line(&format!("interpolation = {}", quote(interpolation)));
            self.depth -= 1;
            self.line(")");
        } else {
            self.line(&decl);
        }
    }

    fn write_relationship(&mut self, relationship: &Relationship) {
        match relationship.targets.as_slice() {
            [] => self.line(&format!("rel {}", relationship.name)),
            [single] => self.line(&format!("rel {} = <{}>", relationship.name, single)),
            many => {
                let list: Vec<_> = many.iter().map(|t| format!("<{}>", t)).collect();
                self.line(&format!("rel {} = [{}]", relationship.name, list.join(", ")));
            }
        }
    }
}

fn has_metadata(prim: &PrimSpec) -> bool {
    prim.documentation.is_some()
        || prim.kind.is_some()
        || prim.instanceable.is_some()
        || !prim.api_schemas.is_empty()
        || !prim.custom_data.is_empty()
        || !prim.references.is_empty()
}

fn format_reference(reference: &Reference) -> String {
    match reference {
        Reference::Internal(path) => format!("<{}>", path),
        Reference::External {
            asset_path,
            prim_path,
        } => format!("@{}@<{}>", asset_path, prim_path),
    }
}

/// Quote and escape a string literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn join<T>(items: &[T], f: impl Fn(&T) -> String) -> String {
    let parts: Vec<String> = items.iter().map(f).collect();
    format!("[{}]", parts.join(", "))
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Token(s) | Value::String(s) => quote(s),
        Value::Asset(s) => format!("@{}@", s),
        Value::Float2(v) => format!("({}, {})", v.x, v.y),
        Value::Float3(v) => format!("({}, {}, {})", v.x, v.y, v.z),
        Value::Double3(v) => format!("({}, {}, {})", v.x, v.y, v.z),
        Value::Matrix4d(m) => {
            let rows: Vec<String> = m
                .to_cols_array_2d()
                .iter()
                .map(|r| format!("({}, {}, {}, {})", r[0], r[1], r[2], r[3]))
                .collect();
            format!("( {} )", rows.join(", "))
        }
        Value::IntArray(values) => join(values, |i| i.to_string()),
        Value::FloatArray(values) => join(values, |f| f.to_string()),
        Value::Float2Array(values) => join(values, |v| format!("({}, {})", v.x, v.y)),
        Value::Float3Array(values) => join(values, |v| format!("({}, {}, {})", v.x, v.y, v.z)),
        Value::TokenArray(values) => join(values, |s| quote(s)),
    }
}
