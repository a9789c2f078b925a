//! Example: Load and inspect COLLADA / OBJ models.
//!
//! Run with: cargo run --example inspect_model -- [--max-weights N] [--json] <files...>

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use rig_core::collada::{load_collada_animation, load_collada_file, LoadOptions};
use rig_core::obj::load_obj_file;
use rig_core::{AnimatedModelData, AnimationData, JointData};

#[derive(Serialize)]
struct MeshSummary {
    name: String,
    vertices: usize,
    triangles: usize,
    skinned: bool,
    texture: Option<String>,
}

#[derive(Serialize)]
struct ModelSummary {
    path: String,
    meshes: Vec<MeshSummary>,
    joints: Vec<String>,
    animation_seconds: Option<f32>,
    key_frames: usize,
    errors: Vec<String>,
}

impl ModelSummary {
    fn new(path: &Path, model: &AnimatedModelData, animation: Option<&AnimationData>) -> Self {
        let mut joints = Vec::new();
        if let Some(skeleton) = &model.skeleton {
            skeleton.root.visit(&mut |joint: &JointData| joints.push(joint.name.clone()));
        }

        let mut errors: Vec<String> = model.errors.iter().map(ToString::to_string).collect();
        if let Some(animation) = animation {
            errors.extend(animation.errors.iter().map(ToString::to_string));
        }

        Self {
            path: path.display().to_string(),
            meshes: model
                .meshes
                .iter()
                .map(|mesh| MeshSummary {
                    name: mesh.name.clone(),
                    vertices: mesh.vertex_count(),
                    triangles: mesh.triangle_count(),
                    skinned: mesh.is_skinned(),
                    texture: mesh.texture.clone(),
                })
                .collect(),
            joints,
            animation_seconds: animation
                .filter(|a| !a.key_frames.is_empty())
                .map(|a| a.length_seconds),
            key_frames: animation.map_or(0, |a| a.key_frames.len()),
            errors,
        }
    }

    fn print(&self) {
        println!("\n=== {} ===", self.path);
        println!("Meshes: {}", self.meshes.len());
        for mesh in &self.meshes {
            println!(
                "  {} - {} vertices, {} triangles{}",
                mesh.name,
                mesh.vertices,
                mesh.triangles,
                if mesh.skinned { ", skinned" } else { "" }
            );
            if let Some(texture) = &mesh.texture {
                println!("       Texture: {}", texture);
            }
        }

        if !self.joints.is_empty() {
            println!("Joints: {}", self.joints.join(", "));
        }
        if let Some(seconds) = self.animation_seconds {
            println!("Animation: {} key frames, {:.2}s", self.key_frames, seconds);
        }

        if !self.errors.is_empty() {
            println!("Problems:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }
    }
}

fn inspect(path: &Path, options: &LoadOptions) -> Result<ModelSummary> {
    let is_obj = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"));

    if is_obj {
        let model = load_obj_file(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok(ModelSummary::new(path, &model, None));
    }

    let model = load_collada_file(path, options).with_context(|| format!("loading {}", path.display()))?;
    let file = std::fs::File::open(path)?;
    let animation = load_collada_animation(std::io::BufReader::new(file))?;
    Ok(ModelSummary::new(path, &model, Some(&animation)))
}

fn main() -> Result<()> {
    env_logger::init();

    let mut options = LoadOptions::default();
    let mut json = false;
    let mut paths = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--max-weights" => {
                let value = args.next().context("--max-weights needs a value")?;
                options.max_weights = value
                    .parse()
                    .with_context(|| format!("invalid --max-weights '{}'", value))?;
            }
            _ => paths.push(PathBuf::from(arg)),
        }
    }

    if paths.is_empty() {
        println!("Usage: inspect_model [--max-weights N] [--json] <model.dae|model.obj>...");
        println!("\nExamples:");
        println!("  cargo run --example inspect_model -- assets/character.dae");
        println!("  cargo run --example inspect_model -- --json --max-weights 4 a.dae b.obj");
        return Ok(());
    }
    if options.max_weights == 0 {
        bail!("--max-weights must be at least 1");
    }

    let results: Vec<Result<ModelSummary>> = paths.par_iter().map(|path| inspect(path, &options)).collect();

    let mut summaries = Vec::new();
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            summary.print();
        }
    }

    Ok(())
}
