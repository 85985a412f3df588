/// "Resources" are the objects the renderer hands out handles to:
/// meshes, textures and materials, plus the helpers that upload them.

pub mod buffer;
pub mod handle;
pub mod image;
pub mod material;
pub mod mesh;
pub mod render_object;
pub mod texture;
pub mod vertex;
