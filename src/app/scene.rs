use color_eyre::eyre::bail;
use color_eyre::Result;
use glam::{Mat4, Vec3, Vec4};
use crate::assets::mesh_file::MeshData;
use crate::renderer::resources::handle::Handle;
use crate::renderer::resources::mesh::GpuMesh;
use crate::renderer::resources::render_object::RenderObject;
use crate::renderer::resources::texture::Texture;
use crate::renderer::resources::vertex::{Vertex, VertexInputDescription};
use crate::renderer::Renderer;

const GRID_HALF_EXTENT: i32 = 5;
const GRID_SPACING: f32 = 3.0;

/// Load the demo assets and lay out a grid of objects
pub fn populate(renderer: &mut Renderer) -> Result<()> {
    let vertex_input = VertexInputDescription::from_attributes(&Vertex::ATTRIBUTES);

    let mesh = load_mesh(renderer, &vertex_input)?;
    let texture = load_texture(renderer)?;

    let untextured = renderer.load_material("default", "mesh.vert.spv", "default_lit.frag.spv", &vertex_input)?;
    let textured = renderer.load_material("textured", "mesh.vert.spv", "textured_lit.frag.spv", &vertex_input)?;
    if !untextured.is_valid() || !textured.is_valid() {
        bail!("Demo shaders are missing from {}", renderer.config().shader_dir().display());
    }

    let materials = [
        renderer.create_material_instance("default_untextured", untextured, Handle::INVALID),
        renderer.create_material_instance("textured_instance", textured, texture),
    ];

    for x in -GRID_HALF_EXTENT..=GRID_HALF_EXTENT {
        for z in -GRID_HALF_EXTENT..=GRID_HALF_EXTENT {
            let position = Vec3::new(x as f32, 0.0, z as f32) * GRID_SPACING;
            let t = (x + GRID_HALF_EXTENT) as f32 / (2 * GRID_HALF_EXTENT) as f32;
            renderer.add_render_object(RenderObject {
                mesh,
                material: materials[((x + z).rem_euclid(2)) as usize],
                transform: Mat4::from_translation(position),
                color: Vec4::new(t, 1.0 - t, 0.5, 1.0),
            });
        }
    }

    log::info!("Demo scene has {} render objects", renderer.render_object_count());
    Ok(())
}

/// The monkey model when it exists and fits the shaders, a cube otherwise
fn load_mesh(renderer: &mut Renderer, vertex_input: &VertexInputDescription) -> Result<Handle<GpuMesh>> {
    let monkey = renderer.load_mesh("monkey", "monkey.mesh")?;
    if monkey.is_valid() {
        let fits = renderer
            .mesh_vertex_input(monkey)
            .is_some_and(|input| same_layout(input, vertex_input));
        if fits {
            return Ok(monkey);
        }
        log::warn!("monkey.mesh does not have the position/uv/normal/color layout, using a cube");
    }

    renderer.register_mesh("cube", &MeshData::cube())
}

/// texture.png when it exists, a single white pixel otherwise
fn load_texture(renderer: &mut Renderer) -> Result<Handle<Texture>> {
    let texture = renderer.load_texture("texture", "texture.png")?;
    if texture.is_valid() {
        return Ok(texture);
    }
    renderer.register_texture("white", 1, 1, &[255; 4])
}

fn same_layout(a: &VertexInputDescription, b: &VertexInputDescription) -> bool {
    let formats = |d: &VertexInputDescription| d.attributes.iter().map(|a| a.format).collect::<Vec<_>>();
    formats(a) == formats(b)
}
