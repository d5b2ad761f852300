//! Scenes (named viewpoints) as `Camera` prims.

use cadusd_math::CameraPose;

use crate::names::NameScope;
use crate::options::ExportOptions;
use crate::source::SceneCamera;
use crate::usd::{Attribute, Layer, PrimPath, Value, WriteResult};

/// Name of the transform holding every exported camera.
pub const SCENES_SCOPE: &str = "Scenes";

/// Focal length written for perspective cameras, in millimeters.
pub const FOCAL_LENGTH_MM: f32 = 20.5;

/// Write one camera per scene below `parent/Scenes`.
///
/// Nothing (not even the scope) is written when there are no scenes.
/// Returns the number of cameras written.
pub fn export_cameras(
    layer: &mut Layer,
    parent: &PrimPath,
    scenes: &[SceneCamera],
    options: &ExportOptions,
) -> WriteResult<u64> {
    if scenes.is_empty() {
        return Ok(0);
    }
    let scope = parent.child(SCENES_SCOPE);
    layer.define_prim(&scope, "Xform")?;

    let mut names = NameScope::new();
    for scene in scenes {
        let path = scope.child(&names.claim(&scene.name));
        export_camera(layer, &path, scene, options)?;
    }
    Ok(scenes.len() as u64)
}

fn export_camera(
    layer: &mut Layer,
    path: &PrimPath,
    scene: &SceneCamera,
    options: &ExportOptions,
) -> WriteResult<()> {
    let aspect_ratio = scene.aspect_ratio.unwrap_or(options.aspect_ratio);
    let pose = CameraPose::new(scene.eye, scene.target, scene.up);

    let prim = layer.define_prim(path, "Camera")?;
    prim.set_custom_data("source:name", Value::String(scene.name.clone()));
    prim.set_custom_data("source:eyePoint", Value::Double3(scene.eye));
    prim.set_custom_data("source:targetPoint", Value::Double3(scene.target));
    prim.set_custom_data("source:upDirection", Value::Double3(scene.up));
    prim.set_custom_data("source:aspectRatio", Value::Double(aspect_ratio));
    prim.set_custom_data("source:isPerspective", Value::Bool(scene.perspective));

    if scene.perspective {
        prim.set_custom_data("source:verticalFov", Value::Double(scene.fov_degrees));
        let vertical = options.sensor_height as f32;
        prim.set_attribute(Attribute::new("projection", "token", Value::token("perspective")));
        prim.set_attribute(Attribute::new(
            "verticalAperture",
            "float",
            Value::Float(vertical),
        ));
        prim.set_attribute(Attribute::new(
            "horizontalAperture",
            "float",
            Value::Float(vertical * aspect_ratio as f32),
        ));
        prim.set_attribute(Attribute::new(
            "focalLength",
            "float",
            Value::Float(FOCAL_LENGTH_MM),
        ));
    } else {
        // Passed through unscaled; importers adjust as they see fit.
        prim.set_custom_data("source:orthoHeight", Value::Double(scene.ortho_height));
        prim.set_attribute(Attribute::new("projection", "token", Value::token("orthographic")));
        prim.set_attribute(Attribute::new(
            "verticalAperture",
            "float",
            Value::Float(scene.ortho_height as f32),
        ));
    }

    if (scene.target - scene.eye).cross(scene.up).length_squared() < 1e-12 {
        log::warn!("Scene {} has a degenerate view; using identity placement", scene.name);
    } else {
        prim.set_transform(pose.to_transform());
    }
    Ok(())
}
