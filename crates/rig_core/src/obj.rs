//! Wavefront OBJ loading.
//!
//! Static meshes only: OBJ carries no skin or skeleton, so every mesh comes
//! back unskinned and the model has no skeleton. Parsing is done by `tobj`;
//! this module maps its output onto [`MeshData`].

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use rig_math::Vec3;
use thiserror::Error;
use tobj::{LoadError, LoadOptions, Material, Model};

use crate::collada::ColladaError;
use crate::mesh::MeshData;
use crate::model::AnimatedModelData;

/// Errors that abort an OBJ load.
#[derive(Error, Debug)]
pub enum ObjError {
    #[error("OBJ parse error: {0}")]
    Parse(#[from] LoadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for OBJ loading.
pub type ObjResult<T> = Result<T, ObjError>;

/// Load an OBJ model.
///
/// `material_source` returns the bytes of an `mtllib` file referenced by the
/// OBJ, or `None` if it cannot be found; a missing library is reported in the
/// model's `errors` and the meshes load without materials.
pub fn load_obj_model<R, F>(mut reader: R, material_source: F) -> ObjResult<AnimatedModelData>
where
    R: BufRead,
    F: Fn(&Path) -> Option<Vec<u8>>,
{
    let missing = RefCell::new(Vec::new());

    let (models, materials) = tobj::load_obj_buf(
        &mut reader,
        &LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
        |path| match material_source(path) {
            Some(bytes) => tobj::load_mtl_buf(&mut Cursor::new(bytes)),
            None => {
                missing.borrow_mut().push(path.display().to_string());
                Err(LoadError::OpenFileFailed)
            }
        },
    )?;

    let mut model = AnimatedModelData::default();
    for reference in missing.into_inner() {
        let error = ColladaError::MissingAsset {
            mesh: "mtllib".to_string(),
            reference,
        };
        log::warn!("{}", error);
        model.errors.push(error);
    }

    let materials = materials.unwrap_or_else(|err| {
        log::debug!("Material library unavailable: {}", err);
        Vec::new()
    });

    model.meshes = models
        .iter()
        .filter(|m| {
            if m.mesh.indices.is_empty() {
                log::debug!("OBJ object {} has no faces, skipping", m.name);
            }
            !m.mesh.indices.is_empty()
        })
        .map(|m| convert_model(m, &materials))
        .collect();

    log::info!(
        "Loaded OBJ: {} meshes, {} triangles",
        model.mesh_count(),
        model.total_triangle_count()
    );
    Ok(model)
}

/// Load an OBJ file, resolving `mtllib` paths relative to its directory.
pub fn load_obj_file<P: AsRef<Path>>(path: P) -> ObjResult<AnimatedModelData> {
    let path = path.as_ref();
    log::info!("Loading OBJ model {}", path.display());
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file = File::open(path)?;

    load_obj_model(BufReader::new(file), |mtl| std::fs::read(base_dir.join(mtl)).ok())
}

fn chunk_vec3(values: &[f32]) -> Vec<Vec3> {
    values
        .chunks_exact(3)
        .map(|chunk| Vec3::new(chunk[0], chunk[1], chunk[2]))
        .collect()
}

fn convert_model(model: &Model, materials: &[Material]) -> MeshData {
    let mesh = &model.mesh;

    let positions = chunk_vec3(&mesh.positions);
    let normals = chunk_vec3(&mesh.normals);

    let mut data = MeshData::new(model.name.clone(), positions, normals, mesh.indices.clone());
    data.ensure_normals();

    if !mesh.texcoords.is_empty() {
        data.uvs = Some(
            mesh.texcoords
                .chunks_exact(2)
                .map(|chunk| [chunk[0], 1.0 - chunk[1]])
                .collect(),
        );
    }

    if let Some(material) = mesh.material_id.and_then(|id| materials.get(id)) {
        data.texture = material.diffuse_texture.clone();
        data.diffuse_color = material
            .diffuse
            .map(|[r, g, b]| [r, g, b, material.dissolve.unwrap_or(1.0)]);
    }

    data
}
