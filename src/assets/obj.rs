use std::collections::HashMap;
use std::path::Path;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use crate::assets::mesh_file::MeshData;
use crate::renderer::resources::vertex::VertexAttribute;

/// Load a Wavefront OBJ file as a single deduplicated mesh
pub fn load_obj(path: &Path) -> Result<MeshData> {
    if path.extension().is_none_or(|ext| ext != "obj") {
        bail!("{} is not an .obj file", path.display());
    }

    let (models, _materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
        .wrap_err_with(|| format!("Failed to load {}", path.display()))?;

    mesh_from_models(&models)
}

/// Flatten triangulated, single-indexed models into one mesh.
///
/// Positions are always present. Texture coordinates, normals and vertex colors
/// are only emitted when every model carries them. Texture V is flipped for Vulkan.
pub fn mesh_from_models(models: &[tobj::Model]) -> Result<MeshData> {
    let meshes = models.iter().map(|m| &m.mesh).collect::<Vec<_>>();
    if meshes.iter().all(|m| m.positions.is_empty()) {
        bail!("Model has no vertex positions");
    }

    let has_texcoords = meshes.iter().all(|m| !m.texcoords.is_empty());
    let has_normals = meshes.iter().all(|m| !m.normals.is_empty());
    let has_colors = meshes.iter().all(|m| !m.vertex_color.is_empty());
    log::info!("Positions: yes");
    log::info!("Texture coordinates: {}", yes_no(has_texcoords));
    log::info!("Normals: {}", yes_no(has_normals));
    log::info!("Vertex colors: {}", yes_no(has_colors));

    let mut attributes = vec![VertexAttribute::Vec3];
    if has_texcoords {
        attributes.push(VertexAttribute::Vec2);
    }
    if has_normals {
        attributes.push(VertexAttribute::Vec3);
    }
    if has_colors {
        attributes.push(VertexAttribute::Vec3);
    }

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut unique = HashMap::<Vec<u8>, u32>::new();
    let mut vertex = Vec::new();

    for mesh in meshes {
        for &index in &mesh.indices {
            let i = index as usize;
            vertex.clear();
            push_floats(&mut vertex, &mesh.positions[3 * i..3 * i + 3]);
            if has_texcoords {
                let uv = &mesh.texcoords[2 * i..2 * i + 2];
                push_floats(&mut vertex, &[uv[0], 1.0 - uv[1]]);
            }
            if has_normals {
                push_floats(&mut vertex, &mesh.normals[3 * i..3 * i + 3]);
            }
            if has_colors {
                push_floats(&mut vertex, &mesh.vertex_color[3 * i..3 * i + 3]);
            }

            let next = unique.len() as u32;
            let id = *unique.entry(vertex.clone()).or_insert_with(|| {
                vertices.extend_from_slice(&vertex);
                next
            });
            indices.push(id);
        }
    }

    let mesh = MeshData {
        attributes,
        vertices,
        indices,
    };
    log::info!(
        "Vertices: {} ({:.1} KB), indices: {}",
        mesh.vertex_count(),
        mesh.vertices.len() as f64 / 1024.0,
        mesh.indices.len(),
    );

    Ok(mesh)
}

fn push_floats(out: &mut Vec<u8>, values: &[f32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn yes_no(present: bool) -> &'static str {
    if present { "yes" } else { "no" }
}
