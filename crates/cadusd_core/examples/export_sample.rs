//! Example: Build a small document in code and export it.
//!
//! Run with: cargo run --example export_sample -- out/sample.usda

use std::env;
use std::path::Path;

use cadusd_core::source::{Appearance, FaceRecord};
use cadusd_core::{convert, Document, ExportOptions, FileSystemWriter, LogProgress, Parent};
use cadusd_math::{DMat4, DVec3};

fn box_faces(doc: &mut Document, parent: Parent, size: f64, color: [u8; 4]) {
    let s = size;
    let corners = [
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(s, 0.0, 0.0),
        DVec3::new(s, s, 0.0),
        DVec3::new(0.0, s, 0.0),
        DVec3::new(0.0, 0.0, s),
        DVec3::new(s, 0.0, s),
        DVec3::new(s, s, s),
        DVec3::new(0.0, s, s),
    ];
    let loops = [
        [0, 3, 2, 1],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [1, 2, 6, 5],
        [2, 3, 7, 6],
        [3, 0, 4, 7],
    ];
    let appearance = Appearance::color(color);
    for face in loops {
        let points = face.iter().map(|&i| corners[i]).collect();
        doc.add_face(
            parent,
            FaceRecord::from_loop(points)
                .with_front(appearance.clone())
                .with_back(appearance.clone()),
        );
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let output = args.get(1).map(String::as_str).unwrap_or("sample.usda");

    let mut doc = Document::new();
    let crate_def = doc.add_definition("Crate");
    box_faces(&mut doc, Parent::Definition(crate_def), 12.0, [160, 110, 60, 255]);

    let stack = doc.add_group(Parent::Root, "Stack", DMat4::IDENTITY);
    for i in 0..5 {
        let offset = DVec3::new(i as f64 * 14.0, 0.0, 0.0);
        doc.add_instance(
            Parent::Group(stack),
            crate_def,
            format!("Crate {}", i + 1),
            DMat4::from_translation(offset),
        );
    }
    doc.add_edge(Parent::Root, DVec3::ZERO, DVec3::new(0.0, 0.0, 100.0));

    let options = ExportOptions {
        export_edges: true,
        ..ExportOptions::default()
    };

    println!("Exporting to {}", output);
    match convert(
        &doc,
        Path::new(output),
        &options,
        &mut FileSystemWriter::new(),
        &mut LogProgress,
    ) {
        Ok(totals) => print!("\n{}", totals.summary()),
        Err(e) => eprintln!("Error exporting: {}", e),
    }
}
