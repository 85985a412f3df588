use ash::vk;
use bytemuck::{Pod, Zeroable};
use color_eyre::eyre::bail;
use color_eyre::Result;
use glam::{Vec2, Vec3};

/// Per-vertex attribute kinds a mesh file can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Vec3,
    Vec2,
    Float32,
    UInt32,
}

impl VertexAttribute {
    pub fn tag(self) -> u8 {
        match self {
            VertexAttribute::Vec3 => 0,
            VertexAttribute::Vec2 => 1,
            VertexAttribute::Float32 => 2,
            VertexAttribute::UInt32 => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => VertexAttribute::Vec3,
            1 => VertexAttribute::Vec2,
            2 => VertexAttribute::Float32,
            3 => VertexAttribute::UInt32,
            _ => bail!("Unknown vertex attribute tag {}", tag),
        })
    }

    pub fn format(self) -> vk::Format {
        match self {
            VertexAttribute::Vec3 => vk::Format::R32G32B32_SFLOAT,
            VertexAttribute::Vec2 => vk::Format::R32G32_SFLOAT,
            VertexAttribute::Float32 => vk::Format::R32_SFLOAT,
            VertexAttribute::UInt32 => vk::Format::R32_UINT,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            VertexAttribute::Vec3 => 12,
            VertexAttribute::Vec2 => 8,
            VertexAttribute::Float32 | VertexAttribute::UInt32 => 4,
        }
    }
}

/// Byte size of one vertex made of `attributes`
pub fn vertex_stride(attributes: &[VertexAttribute]) -> u32 {
    attributes.iter().map(|a| a.size()).sum()
}

/// Vertex input state of a graphics pipeline
#[derive(Debug, Clone, Default)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub flags: vk::PipelineVertexInputStateCreateFlags,
}

impl VertexInputDescription {
    /// Single interleaved binding 0, one location per attribute in order
    pub fn from_attributes(attributes: &[VertexAttribute]) -> Self {
        let bindings = vec![
            vk::VertexInputBindingDescription {
                binding: 0,
                stride: vertex_stride(attributes),
                input_rate: vk::VertexInputRate::VERTEX,
            },
        ];

        let mut offset = 0;
        let attributes = attributes
            .iter()
            .enumerate()
            .map(|(location, attribute)| {
                let description = vk::VertexInputAttributeDescription {
                    location: location as u32,
                    binding: 0,
                    format: attribute.format(),
                    offset,
                };
                offset += attribute.size();
                description
            })
            .collect();

        Self {
            bindings,
            attributes,
            flags: vk::PipelineVertexInputStateCreateFlags::empty(),
        }
    }
}

/// Vertex layout the bundled shaders are written against
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub texcoord: Vec2,
    pub normal: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const ATTRIBUTES: [VertexAttribute; 4] = [
        VertexAttribute::Vec3,
        VertexAttribute::Vec2,
        VertexAttribute::Vec3,
        VertexAttribute::Vec3,
    ];
}
