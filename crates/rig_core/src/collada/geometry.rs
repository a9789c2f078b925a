//! Mesh extraction from `<library_geometries>`.
//!
//! Each `<geometry>` becomes one [`MeshData`]. All primitives of a geometry
//! (`<triangles>`, `<polylist>`, `<polygons>`) are merged into a single
//! index buffer; polygons are fan-triangulated from their first corner.
//! Corners sharing the same position, normal and texcoord index collapse
//! into one output vertex, numbered in order of first appearance.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rig_math::{Mat4, Mat4Ext, Vec3};

use super::source::{
    input_stride, parse_floats, parse_indices, read_float_source, read_inputs, strip_hash, FloatSource, Input,
};
use super::{ColladaError, SkinningData};
use crate::mesh::MeshData;
use crate::xml::XmlNode;

/// Diffuse properties of a bound material.
#[derive(Clone, Debug, Default, PartialEq)]
struct Material {
    texture: Option<String>,
    diffuse_color: Option<[f32; 4]>,
}

/// Float sources of one `<mesh>` by id. Sources are only validated when a
/// primitive reads them.
type Sources<'m> = HashMap<&'m str, Result<FloatSource, String>>;

fn lookup<'s>(sources: &'s Sources<'_>, id: &str) -> Result<&'s FloatSource, String> {
    match sources.get(id) {
        Some(Ok(source)) => Ok(source),
        Some(Err(message)) => Err(message.clone()),
        None => Err(format!("source {} not found", id)),
    }
}

/// Position index plus (source id, index) of the normal and texcoord of one
/// corner.
type CornerKey<'m> = (usize, Option<(&'m str, usize)>, Option<(&'m str, usize)>);

/// Where a primitive reads one attribute from.
#[derive(Clone, Copy)]
struct Channel<'m, 's> {
    id: &'m str,
    source: &'s FloatSource,
    offset: usize,
}

/// The `<p>` stream of one primitive with the channels it indexes.
struct Corners<'m, 's> {
    stream: Vec<usize>,
    stride: usize,
    vertex_offset: usize,
    position_count: usize,
    normals: Option<Channel<'m, 's>>,
    uvs: Option<Channel<'m, 's>>,
}

impl<'m, 's> Corners<'m, 's> {
    /// Bounds-checked key of corner `index`.
    fn key(&self, index: usize) -> Result<CornerKey<'m>, String> {
        let base = index
            .checked_mul(self.stride)
            .ok_or_else(|| format!("corner {} out of range", index))?;
        let position = self.index_at(base, self.vertex_offset)?;
        if position >= self.position_count {
            return Err(format!(
                "position index {} out of range for {} positions",
                position, self.position_count
            ));
        }
        Ok((
            position,
            self.attribute(self.normals, base, "NORMAL")?,
            self.attribute(self.uvs, base, "TEXCOORD")?,
        ))
    }

    fn attribute(&self, channel: Option<Channel<'m, 's>>, base: usize, semantic: &str) -> Result<Option<(&'m str, usize)>, String> {
        let Some(channel) = channel else {
            return Ok(None);
        };
        let index = self.index_at(base, channel.offset)?;
        if index >= channel.source.count() {
            return Err(format!(
                "{} index {} out of range for {} values",
                semantic,
                index,
                channel.source.count()
            ));
        }
        Ok(Some((channel.id, index)))
    }

    fn index_at(&self, base: usize, offset: usize) -> Result<usize, String> {
        base.checked_add(offset)
            .and_then(|position| self.stream.get(position))
            .copied()
            .ok_or_else(|| format!("<p> holds {} indices, corner needs more", self.stream.len()))
    }
}

/// Accumulates deduplicated vertices across the primitives of a geometry.
#[derive(Default)]
struct MeshBuilder<'m> {
    lookup: HashMap<CornerKey<'m>, u32>,
    corners: Vec<CornerKey<'m>>,
    indices: Vec<u32>,
}

impl<'m> MeshBuilder<'m> {
    fn push(&mut self, key: CornerKey<'m>) {
        let next = self.corners.len() as u32;
        let index = *self.lookup.entry(key).or_insert_with(|| {
            self.corners.push(key);
            next
        });
        self.indices.push(index);
    }
}

/// Converts geometries into flat meshes, attaching materials and skins.
pub struct GeometryExtractor<'a> {
    geometries: &'a XmlNode,
    materials: Option<&'a XmlNode>,
    effects: Option<&'a XmlNode>,
    images: Option<&'a XmlNode>,
    bindings: HashMap<&'a str, &'a str>,
    skins: Option<&'a BTreeMap<String, SkinningData>>,
    joint_indices: Option<&'a HashMap<String, usize>>,
    max_weights: usize,
    correction: Mat4,
}

impl<'a> GeometryExtractor<'a> {
    pub fn new(library_geometries: &'a XmlNode) -> Self {
        Self {
            geometries: library_geometries,
            materials: None,
            effects: None,
            images: None,
            bindings: HashMap::new(),
            skins: None,
            joint_indices: None,
            max_weights: 3,
            correction: Mat4::IDENTITY,
        }
    }

    pub fn with_materials(
        mut self,
        library_materials: Option<&'a XmlNode>,
        library_effects: Option<&'a XmlNode>,
        library_images: Option<&'a XmlNode>,
    ) -> Self {
        self.materials = library_materials;
        self.effects = library_effects;
        self.images = library_images;
        self
    }

    /// Read `<instance_material symbol target>` bindings from the scenes.
    pub fn with_material_bindings(mut self, library_visual_scenes: Option<&'a XmlNode>) -> Self {
        if let Some(scenes) = library_visual_scenes {
            for instance in scenes.descendants().filter(|n| n.name() == "instance_material") {
                if let (Some(symbol), Some(target)) = (instance.attribute("symbol"), instance.attribute("target")) {
                    self.bindings.insert(symbol, strip_hash(target));
                }
            }
        }
        self
    }

    /// Attach skins. Joint ids are rewritten through `joint_indices`, keyed
    /// by skin joint name, when given; otherwise skin-local ids are kept.
    pub fn with_skins(
        mut self,
        skins: &'a BTreeMap<String, SkinningData>,
        joint_indices: Option<&'a HashMap<String, usize>>,
        max_weights: usize,
    ) -> Self {
        self.skins = Some(skins);
        self.joint_indices = joint_indices;
        self.max_weights = max_weights.max(1);
        self
    }

    pub fn with_correction(mut self, correction: Mat4) -> Self {
        self.correction = correction;
        self
    }

    /// Extract every mesh geometry.
    ///
    /// A geometry with invalid data is skipped and reported; the others are
    /// still returned.
    pub fn extract(&self) -> (Vec<MeshData>, Vec<ColladaError>) {
        let mut meshes = Vec::new();
        let mut errors = Vec::new();

        for geometry in self.geometries.children("geometry") {
            let id = geometry
                .attribute("id")
                .or_else(|| geometry.attribute("name"))
                .unwrap_or("geometry");
            let Some(mesh) = geometry.child("mesh") else {
                log::debug!("Geometry {} has no <mesh>, skipping", id);
                continue;
            };

            match self.extract_mesh(id, mesh, &mut errors) {
                Ok(Some(data)) => {
                    log::debug!(
                        "Mesh {}: {} vertices, {} triangles{}",
                        data.name,
                        data.vertex_count(),
                        data.triangle_count(),
                        if data.is_skinned() { ", skinned" } else { "" }
                    );
                    meshes.push(data);
                }
                Ok(None) => log::debug!("Geometry {} has no triangles, skipping", id),
                Err(message) => {
                    let error = ColladaError::invalid(id, message);
                    log::warn!("{}", error);
                    errors.push(error);
                }
            }
        }

        (meshes, errors)
    }

    fn extract_mesh(&self, id: &str, mesh: &XmlNode, errors: &mut Vec<ColladaError>) -> Result<Option<MeshData>, String> {
        let sources: Sources = mesh
            .children("source")
            .filter_map(|source| Some((source.attribute("id")?, read_float_source(source))))
            .collect();

        let vertices = mesh.child("vertices").ok_or("mesh has no <vertices>")?;
        let vertex_inputs = read_inputs(vertices)?;
        let positions = lookup(
            &sources,
            lowest_set(&vertex_inputs, "POSITION")
                .ok_or("vertices have no POSITION input")?
                .source,
        )?;
        require_stride(positions, 3, "POSITION")?;

        let mut builder = MeshBuilder::default();
        let mut material_symbol = None;

        for primitive in mesh.all_children() {
            if !matches!(primitive.name(), "triangles" | "polylist" | "polygons") {
                continue;
            }

            let inputs = read_inputs(primitive)?;
            let vertex_offset = lowest_set(&inputs, "VERTEX")
                .ok_or_else(|| format!("<{}> has no VERTEX input", primitive.name()))?
                .offset;
            let stride = input_stride(&inputs)?;

            let (counts, stream) = read_polygons(primitive, stride)?;
            let corners = Corners {
                stream,
                stride,
                vertex_offset,
                position_count: positions.count(),
                normals: attribute_channel(&sources, &inputs, &vertex_inputs, vertex_offset, "NORMAL", 3)?,
                uvs: attribute_channel(&sources, &inputs, &vertex_inputs, vertex_offset, "TEXCOORD", 2)?,
            };

            let mut first_corner = 0;
            for count in counts {
                if count < 3 {
                    log::debug!("Skipping degenerate polygon with {} corners in {}", count, id);
                } else {
                    let anchor = corners.key(first_corner)?;
                    for i in 1..count - 1 {
                        builder.push(anchor);
                        builder.push(corners.key(first_corner + i)?);
                        builder.push(corners.key(first_corner + i + 1)?);
                    }
                }
                first_corner += count;
            }

            if let Some(symbol) = primitive.attribute("material") {
                match material_symbol {
                    None => material_symbol = Some(symbol),
                    Some(first) if first != symbol => {
                        log::debug!("Geometry {} uses several materials, keeping {}", id, first)
                    }
                    Some(_) => {}
                }
            }
        }

        if builder.indices.is_empty() {
            return Ok(None);
        }

        let skin = self.skins.and_then(|skins| skins.get(id));
        let transform = self.correction * skin.map_or(Mat4::IDENTITY, |skin| skin.bind_shape_matrix);

        let mesh_positions = builder
            .corners
            .iter()
            .map(|&(position, _, _)| transform.transform_point3(vec3_at(positions, position)))
            .collect();

        // Normals are only kept when every corner has one
        let mesh_normals = builder
            .corners
            .iter()
            .map(|&(_, normal, _)| {
                let (source, index) = normal?;
                let source = lookup(&sources, source).ok()?;
                Some(transform.transform_normal3(vec3_at(source, index)))
            })
            .collect::<Option<Vec<Vec3>>>()
            .unwrap_or_default();

        let mesh_uvs = builder.corners.iter().any(|(_, _, uv)| uv.is_some()).then(|| {
            builder
                .corners
                .iter()
                .map(|&(_, _, uv)| {
                    uv.and_then(|(source, index)| lookup(&sources, source).ok()?.get(index))
                        .map_or([0.0, 0.0], |values| [values[0], 1.0 - values[1]])
                })
                .collect()
        });

        let mut data = MeshData::new(id, mesh_positions, mesh_normals, builder.indices);
        data.uvs = mesh_uvs;
        data.ensure_normals();

        if let Some(symbol) = material_symbol {
            let material = self.material(id, symbol, errors);
            data.texture = material.texture;
            data.diffuse_color = material.diffuse_color;
        }

        if let Some(skin) = skin {
            self.attach_skin(&mut data, &builder.corners, positions.count(), skin, errors);
        }

        data.validate()?;
        Ok(Some(data))
    }

    fn attach_skin(
        &self,
        data: &mut MeshData,
        corners: &[CornerKey<'_>],
        position_count: usize,
        skin: &SkinningData,
        errors: &mut Vec<ColladaError>,
    ) {
        if skin.vertex_weights.len() < position_count {
            let error = ColladaError::invalid(
                &data.name,
                format!(
                    "skin {} weights {} vertices but the mesh has {} positions",
                    skin.controller_id,
                    skin.vertex_weights.len(),
                    position_count
                ),
            );
            log::warn!("{}", error);
            errors.push(error);
            return;
        }

        // Skin-local joint id -> skeleton joint index
        let remap: Vec<Option<i32>> = skin
            .joint_names
            .iter()
            .enumerate()
            .map(|(local, name)| match self.joint_indices {
                Some(indices) => indices.get(name).map(|&index| index as i32),
                None => Some(local as i32),
            })
            .collect();

        let mut unmatched = BTreeSet::new();
        let mut joint_ids = Vec::with_capacity(corners.len() * self.max_weights);
        let mut weights = Vec::with_capacity(corners.len() * self.max_weights);
        for &(position, _, _) in corners {
            let mut vertex = skin.vertex_weights[position].clone();
            let dropped = vertex.remap(self.max_weights, |joint| {
                usize::try_from(joint).ok().and_then(|j| remap.get(j).copied().flatten())
            });
            for joint in dropped {
                if let Some(name) = usize::try_from(joint).ok().and_then(|j| skin.joint_names.get(j)) {
                    unmatched.insert(name.clone());
                }
            }
            joint_ids.extend(vertex.joint_ids);
            weights.extend(vertex.weights);
        }

        for joint in unmatched {
            let error = ColladaError::SkinningMismatch { joint };
            log::warn!("{}: {}", data.name, error);
            errors.push(error);
        }

        data.set_skin(self.max_weights, joint_ids, weights);
    }

    /// Follow material -> effect -> sampler -> surface -> image.
    fn material(&self, mesh: &str, symbol: &str, errors: &mut Vec<ColladaError>) -> Material {
        let mut missing = |reference: &str| {
            let error = ColladaError::MissingAsset {
                mesh: mesh.to_string(),
                reference: reference.to_string(),
            };
            log::warn!("{}", error);
            errors.push(error);
            Material::default()
        };

        let target = self.bindings.get(symbol).copied().unwrap_or(symbol);
        let Some(material) = self.materials.and_then(|materials| {
            materials
                .child_with_attribute("material", "id", target)
                .or_else(|| materials.child_with_attribute("material", "name", target))
        }) else {
            return missing(target);
        };

        let effect_id = strip_hash(
            material
                .child("instance_effect")
                .and_then(|instance| instance.attribute("url"))
                .unwrap_or(""),
        );
        let Some(effect) = self
            .effects
            .and_then(|effects| effects.child_with_attribute("effect", "id", effect_id))
        else {
            return missing(effect_id);
        };

        let Some(profile) = effect.child("profile_COMMON") else {
            return Material::default();
        };
        let Some(diffuse) = profile.child("technique").and_then(|technique| {
            ["phong", "lambert", "blinn", "constant"]
                .into_iter()
                .find_map(|shading| technique.child(shading))
                .and_then(|shading| shading.child("diffuse"))
        }) else {
            return Material::default();
        };

        let mut result = Material {
            diffuse_color: diffuse.child("color").and_then(|color| {
                match parse_floats(color.text()).ok()?.as_slice() {
                    [r, g, b] => Some([*r, *g, *b, 1.0]),
                    [r, g, b, a] => Some([*r, *g, *b, *a]),
                    _ => None,
                }
            }),
            texture: None,
        };

        if let Some(sampler) = diffuse.child("texture").and_then(|texture| texture.attribute("texture")) {
            let image_id = image_for_sampler(profile, sampler);
            let file = self
                .images
                .and_then(|images| images.child_with_attribute("image", "id", image_id))
                .and_then(|image| image.child("init_from"))
                .map(|init| init.child("ref").map_or(init.text(), XmlNode::text))
                .filter(|file| !file.is_empty());
            match file {
                Some(file) => {
                    result.texture = Some(file.strip_prefix("file://").unwrap_or(file).to_string());
                }
                None => {
                    missing(image_id);
                }
            }
        }

        result
    }
}

/// Source and offset of an optional attribute. Inputs on the primitive win
/// over inputs on `<vertices>`, which share the VERTEX offset.
fn channel<'m>(
    inputs: &[Input<'m>],
    vertex_inputs: &[Input<'m>],
    vertex_offset: usize,
    semantic: &str,
) -> Option<(&'m str, usize)> {
    if let Some(input) = lowest_set(inputs, semantic) {
        return Some((input.source, input.offset));
    }
    lowest_set(vertex_inputs, semantic).map(|input| (input.source, vertex_offset))
}

fn attribute_channel<'m, 's>(
    sources: &'s Sources<'_>,
    inputs: &[Input<'m>],
    vertex_inputs: &[Input<'m>],
    vertex_offset: usize,
    semantic: &str,
    minimum_stride: usize,
) -> Result<Option<Channel<'m, 's>>, String> {
    let Some((id, offset)) = channel(inputs, vertex_inputs, vertex_offset, semantic) else {
        return Ok(None);
    };
    let source = lookup(sources, id)?;
    require_stride(source, minimum_stride, semantic)?;
    Ok(Some(Channel { id, source, offset }))
}

/// The input with `semantic` and the lowest `set`.
fn lowest_set<'i, 'm>(inputs: &'i [Input<'m>], semantic: &str) -> Option<&'i Input<'m>> {
    inputs
        .iter()
        .filter(|input| input.semantic == semantic)
        .min_by_key(|input| input.set.unwrap_or(0))
}

/// Corner count of every polygon plus the flat `<p>` index stream.
fn read_polygons(primitive: &XmlNode, stride: usize) -> Result<(Vec<usize>, Vec<usize>), String> {
    let declared = primitive
        .parse_attribute::<usize>("count")
        .map_err(|e| e.to_string())?;

    match primitive.name() {
        "triangles" => {
            let stream = parse_indices(primitive.child("p").map_or("", XmlNode::text))?;
            let triangle_stride = stride
                .checked_mul(3)
                .ok_or_else(|| format!("input stride {} is too large", stride))?;
            if stream.len() % triangle_stride != 0 {
                return Err(format!(
                    "triangles <p> holds {} indices, not a multiple of {}",
                    stream.len(),
                    triangle_stride
                ));
            }
            let triangles = stream.len() / triangle_stride;
            if declared.is_some_and(|count| count != triangles) {
                return Err(format!(
                    "triangles declare {} triangles but <p> holds {}",
                    declared.unwrap_or(0),
                    triangles
                ));
            }
            Ok((vec![3; triangles], stream))
        }
        "polylist" => {
            let counts = parse_indices(primitive.child("vcount").map_or("", XmlNode::text))?;
            let stream = parse_indices(primitive.child("p").map_or("", XmlNode::text))?;
            if declared.is_some_and(|count| count != counts.len()) {
                return Err(format!(
                    "polylist declares {} polygons but vcount has {}",
                    declared.unwrap_or(0),
                    counts.len()
                ));
            }
            let required = counts
                .iter()
                .try_fold(0usize, |total, &count| total.checked_add(count))
                .and_then(|corners| corners.checked_mul(stride))
                .ok_or("polylist vcount total is too large")?;
            if required != stream.len() {
                return Err(format!(
                    "polylist <p> holds {} indices, vcount requires {}",
                    stream.len(),
                    required
                ));
            }
            Ok((counts, stream))
        }
        _ => {
            let mut counts = Vec::new();
            let mut stream = Vec::new();
            for p in primitive.children("p") {
                let polygon = parse_indices(p.text())?;
                if polygon.len() % stride != 0 {
                    return Err(format!(
                        "polygon holds {} indices, not a multiple of {}",
                        polygon.len(),
                        stride
                    ));
                }
                counts.push(polygon.len() / stride);
                stream.extend(polygon);
            }
            if primitive.child("ph").is_some() {
                log::debug!("Ignoring polygons with holes");
            }
            Ok((counts, stream))
        }
    }
}

/// Follow a `<texture texture="...">` reference through sampler2D and
/// surface params to an image id. References that are not params are taken
/// as image ids directly.
fn image_for_sampler<'p>(profile: &'p XmlNode, sampler: &'p str) -> &'p str {
    let param = |sid: &str| {
        profile
            .descendants()
            .find(|node| node.name() == "newparam" && node.attribute("sid") == Some(sid))
    };

    let Some(sampler2d) = param(sampler).and_then(|p| p.child("sampler2D")) else {
        return sampler;
    };
    if let Some(url) = sampler2d.child("instance_image").and_then(|i| i.attribute("url")) {
        return strip_hash(url);
    }
    let Some(surface_sid) = sampler2d.child("source").map(XmlNode::text) else {
        return sampler;
    };
    param(surface_sid)
        .and_then(|p| p.child("surface"))
        .and_then(|surface| surface.child("init_from"))
        .map_or(surface_sid, XmlNode::text)
}

fn require_stride(source: &FloatSource, minimum: usize, semantic: &str) -> Result<(), String> {
    if source.stride < minimum {
        return Err(format!(
            "{} source has stride {}, need at least {}",
            semantic, source.stride, minimum
        ));
    }
    Ok(())
}

fn vec3_at(source: &FloatSource, index: usize) -> Vec3 {
    source
        .get(index)
        .map_or(Vec3::ZERO, |values| Vec3::new(values[0], values[1], values[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::VertexSkinData;
    use crate::mesh::NO_JOINT;
    use crate::xml::parse_bytes;

    /// Unit quad in the XY plane with one +Z normal and four uvs.
    fn quad_geometry(primitive: &str) -> String {
        format!(
            r##"<library_geometries>
  <geometry id="quad-mesh" name="quad">
    <mesh>
      <source id="quad-positions">
        <float_array id="quad-positions-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
        <technique_common><accessor source="#quad-positions-array" count="4" stride="3"/></technique_common>
      </source>
      <source id="quad-normals">
        <float_array id="quad-normals-array" count="3">0 0 1</float_array>
        <technique_common><accessor source="#quad-normals-array" count="1" stride="3"/></technique_common>
      </source>
      <source id="quad-uvs">
        <float_array id="quad-uvs-array" count="8">0 0 1 0 1 1 0 1</float_array>
        <technique_common><accessor source="#quad-uvs-array" count="4" stride="2"/></technique_common>
      </source>
      <vertices id="quad-vertices">
        <input semantic="POSITION" source="#quad-positions"/>
      </vertices>
      {primitive}
    </mesh>
  </geometry>
</library_geometries>"##
        )
    }

    const INPUTS: &str = r##"<input semantic="VERTEX" source="#quad-vertices" offset="0"/>
        <input semantic="NORMAL" source="#quad-normals" offset="1"/>
        <input semantic="TEXCOORD" source="#quad-uvs" offset="2" set="0"/>"##;

    fn polylist_quad() -> String {
        quad_geometry(&format!(
            r#"<polylist count="1">{INPUTS}<vcount>4</vcount><p>0 0 0 1 0 1 2 0 2 3 0 3</p></polylist>"#
        ))
    }

    fn textured_quad() -> String {
        polylist_quad().replace("<polylist ", r#"<polylist material="skin-material" "#)
    }

    fn extract(doc: &str) -> (Vec<MeshData>, Vec<ColladaError>) {
        let library = parse_bytes(doc.as_bytes()).unwrap();
        GeometryExtractor::new(&library).extract()
    }

    #[test]
    fn test_quad_triangulated() {
        let (meshes, errors) = extract(&polylist_quad());

        assert!(errors.is_empty());
        let mesh = &meshes[0];
        assert_eq!(mesh.name, "quad-mesh");
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_uvs_flipped_and_normals_copied() {
        let (meshes, _) = extract(&polylist_quad());
        let mesh = &meshes[0];

        let uvs = mesh.uvs.as_ref().unwrap();
        assert_eq!(uvs[0], [0.0, 1.0]);
        assert_eq!(uvs[2], [1.0, 0.0]);
        assert!(mesh.normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-5));
    }

    #[test]
    fn test_triangles_pass_through() {
        let (meshes, errors) = extract(&quad_geometry(&format!(
            r#"<triangles count="2">{INPUTS}<p>0 0 0 1 0 1 2 0 2 2 0 2 3 0 3 0 0 0</p></triangles>"#
        )));

        assert!(errors.is_empty());
        assert_eq!(meshes[0].indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(meshes[0].vertex_count(), 4);
    }

    #[test]
    fn test_polygons_element() {
        let (meshes, errors) = extract(&quad_geometry(&format!(
            r#"<polygons count="1">{INPUTS}<p>0 0 0 1 0 1 2 0 2 3 0 3</p></polygons>"#
        )));

        assert!(errors.is_empty());
        assert_eq!(meshes[0].triangle_count(), 2);
    }

    #[test]
    fn test_distinct_uvs_split_vertices() {
        // Same position, two different uvs
        let (meshes, _) = extract(&quad_geometry(&format!(
            r#"<triangles count="2">{INPUTS}<p>0 0 0 1 0 1 2 0 2 0 0 3 2 0 2 3 0 3</p></triangles>"#
        )));
        assert_eq!(meshes[0].vertex_count(), 5);
    }

    #[test]
    fn test_index_out_of_range() {
        let (meshes, errors) = extract(&quad_geometry(&format!(
            r#"<triangles count="1">{INPUTS}<p>0 0 0 1 0 1 9 0 2</p></triangles>"#
        )));

        assert!(meshes.is_empty());
        assert!(matches!(
            &errors[0],
            ColladaError::InvalidGeometryData { mesh, .. } if mesh == "quad-mesh"
        ));
    }

    #[test]
    fn test_vcount_mismatch() {
        let (meshes, errors) = extract(&quad_geometry(&format!(
            r#"<polylist count="1">{INPUTS}<vcount>4</vcount><p>0 0 0 1 0 1 2 0 2</p></polylist>"#
        )));
        assert!(meshes.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_vcount_overflow_is_reported() {
        let (meshes, errors) = extract(&quad_geometry(&format!(
            r#"<polylist count="2">{INPUTS}<vcount>18446744073709551615 4</vcount><p>0 0 0 1 0 1 2 0 2 3 0 3</p></polylist>"#
        )));

        assert!(meshes.is_empty());
        assert!(matches!(&errors[0], ColladaError::InvalidGeometryData { .. }));
    }

    #[test]
    fn test_accessor_count_overflow_is_reported() {
        let doc = polylist_quad().replace(
            r##"<accessor source="#quad-positions-array" count="4""##,
            r##"<accessor source="#quad-positions-array" count="18446744073709551615""##,
        );
        let (meshes, errors) = extract(&doc);

        assert!(meshes.is_empty());
        assert!(matches!(&errors[0], ColladaError::InvalidGeometryData { .. }));
    }

    #[test]
    fn test_input_offset_overflow_is_reported() {
        let (meshes, errors) = extract(&quad_geometry(
            r##"<triangles count="1"><input semantic="VERTEX" source="#quad-vertices" offset="18446744073709551615"/><p>0 1 2</p></triangles>"##,
        ));

        assert!(meshes.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_missing_normals_are_computed() {
        let (meshes, _) = extract(&quad_geometry(
            r##"<triangles count="1"><input semantic="VERTEX" source="#quad-vertices" offset="0"/><p>0 1 2</p></triangles>"##,
        ));
        let mesh = &meshes[0];

        assert_eq!(mesh.normals.len(), 3);
        assert!(mesh.normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-5));
        assert!(mesh.uvs.is_none());
    }

    #[test]
    fn test_up_axis_correction() {
        let library = parse_bytes(polylist_quad().as_bytes()).unwrap();
        let (meshes, _) = GeometryExtractor::new(&library)
            .with_correction(rig_math::UpAxis::Z.correction())
            .extract();

        // +Z normals end up pointing +Y
        assert!(meshes[0].normals.iter().all(|n| (*n - Vec3::Y).length() < 1e-5));
    }

    const MATERIALS: &str = r##"<library_materials>
  <material id="skin-material" name="skin"><instance_effect url="#skin-effect"/></material>
</library_materials>"##;

    const EFFECTS: &str = r#"<library_effects>
  <effect id="skin-effect">
    <profile_COMMON>
      <newparam sid="diffuse-surface"><surface type="2D"><init_from>diffuse-image</init_from></surface></newparam>
      <newparam sid="diffuse-sampler"><sampler2D><source>diffuse-surface</source></sampler2D></newparam>
      <technique sid="common">
        <phong><diffuse><texture texture="diffuse-sampler" texcoord="UVMap"/></diffuse></phong>
      </technique>
    </profile_COMMON>
  </effect>
</library_effects>"#;

    #[test]
    fn test_texture_resolved_through_effect() {
        let library = parse_bytes(textured_quad().as_bytes()).unwrap();
        let materials = parse_bytes(MATERIALS.as_bytes()).unwrap();
        let effects = parse_bytes(EFFECTS.as_bytes()).unwrap();
        let images = parse_bytes(
            br#"<library_images><image id="diffuse-image"><init_from>file://textures/body.png</init_from></image></library_images>"#,
        )
        .unwrap();

        let (meshes, errors) = GeometryExtractor::new(&library)
            .with_materials(Some(&materials), Some(&effects), Some(&images))
            .extract();

        assert!(errors.is_empty());
        assert_eq!(meshes[0].texture.as_deref(), Some("textures/body.png"));
    }

    #[test]
    fn test_missing_image_is_reported() {
        let library = parse_bytes(textured_quad().as_bytes()).unwrap();
        let materials = parse_bytes(MATERIALS.as_bytes()).unwrap();
        let effects = parse_bytes(EFFECTS.as_bytes()).unwrap();

        let (meshes, errors) = GeometryExtractor::new(&library)
            .with_materials(Some(&materials), Some(&effects), None)
            .extract();

        assert_eq!(meshes.len(), 1);
        assert!(meshes[0].texture.is_none());
        assert!(matches!(
            &errors[0],
            ColladaError::MissingAsset { reference, .. } if reference == "diffuse-image"
        ));
    }

    #[test]
    fn test_diffuse_color() {
        let library = parse_bytes(textured_quad().as_bytes()).unwrap();
        let materials = parse_bytes(MATERIALS.as_bytes()).unwrap();
        let effects = parse_bytes(
            br#"<library_effects><effect id="skin-effect"><profile_COMMON><technique>
                <lambert><diffuse><color>0.5 0.25 1</color></diffuse></lambert>
            </technique></profile_COMMON></effect></library_effects>"#,
        )
        .unwrap();

        let (meshes, errors) = GeometryExtractor::new(&library)
            .with_materials(Some(&materials), Some(&effects), None)
            .extract();

        assert!(errors.is_empty());
        assert_eq!(meshes[0].diffuse_color, Some([0.5, 0.25, 1.0, 1.0]));
    }

    fn quad_skin() -> BTreeMap<String, SkinningData> {
        let weights = |joint: i32| {
            let mut vertex = VertexSkinData::default();
            vertex.add_influence(joint, 1.0);
            vertex.limit(2);
            vertex
        };
        let skin = SkinningData {
            controller_id: "quad-skin".to_string(),
            geometry_id: "quad-mesh".to_string(),
            joint_names: vec!["hip".to_string(), "tail".to_string()],
            bind_shape_matrix: Mat4::IDENTITY,
            vertex_weights: vec![weights(0), weights(0), weights(1), weights(NO_JOINT)],
        };
        BTreeMap::from([("quad-mesh".to_string(), skin)])
    }

    #[test]
    fn test_skin_remapped_to_skeleton() {
        let library = parse_bytes(polylist_quad().as_bytes()).unwrap();
        let skins = quad_skin();
        let joints = HashMap::from([("hip".to_string(), 3usize)]);

        let (meshes, errors) = GeometryExtractor::new(&library)
            .with_skins(&skins, Some(&joints), 2)
            .extract();
        let mesh = &meshes[0];

        assert!(mesh.is_skinned());
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.vertex_influences(0).unwrap().0, &[3, 0]);
        // "tail" is not in the skeleton: its vertex falls back to no joint
        assert_eq!(mesh.vertex_influences(2).unwrap(), (&[NO_JOINT, 0][..], &[1.0, 0.0][..]));
        assert_eq!(mesh.vertex_influences(3).unwrap().0[0], NO_JOINT);

        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ColladaError::SkinningMismatch { joint } if joint == "tail"));
    }

    #[test]
    fn test_skin_too_short_is_reported() {
        let library = parse_bytes(polylist_quad().as_bytes()).unwrap();
        let mut skins = quad_skin();
        if let Some(skin) = skins.get_mut("quad-mesh") {
            skin.vertex_weights.truncate(2);
        }

        let (meshes, errors) = GeometryExtractor::new(&library)
            .with_skins(&skins, None, 2)
            .extract();

        assert!(!meshes[0].is_skinned());
        assert_eq!(errors.len(), 1);
    }
}
