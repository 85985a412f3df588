use std::path::Path;
use bytemuck::Pod;
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use glam::{Vec2, Vec3};
use crate::renderer::resources::vertex::{vertex_stride, Vertex, VertexAttribute};

/// Placeholder for files holding several objects. Always 1.
const OBJECT_NUMBER: u16 = 1;

/// Extension marking lz4 compressed mesh files
pub const COMPRESSED_EXTENSION: &str = "lz4";

/// Interleaved vertex bytes described by an attribute list, plus 32-bit indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub attributes: Vec<VertexAttribute>,
    pub vertices: Vec<u8>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn from_vertices<V: Pod>(
        attributes: Vec<VertexAttribute>,
        vertices: &[V],
        indices: Vec<u32>,
    ) -> Result<Self> {
        let stride = vertex_stride(&attributes) as usize;
        if stride != size_of::<V>() {
            bail!(
                "Vertex type is {} bytes but the attributes describe {} bytes",
                size_of::<V>(),
                stride,
            );
        }
        Ok(Self {
            attributes,
            vertices: bytemuck::cast_slice(vertices).to_vec(),
            indices,
        })
    }

    pub fn vertex_stride(&self) -> u32 {
        vertex_stride(&self.attributes)
    }

    pub fn vertex_count(&self) -> u64 {
        match self.vertex_stride() {
            0 => 0,
            stride => self.vertices.len() as u64 / stride as u64,
        }
    }

    /// Vertex bytes must be a whole number of vertices of a non-empty layout
    pub fn validate(&self) -> Result<()> {
        let stride = self.vertex_stride() as usize;
        if stride == 0 {
            bail!("Mesh has no vertex attributes");
        }
        if self.vertices.len() % stride != 0 {
            bail!(
                "Mesh has {} vertex bytes, not a multiple of the {} byte stride",
                self.vertices.len(),
                stride,
            );
        }
        Ok(())
    }

    /// Little-endian layout: attribute count (u64), one u8 tag per attribute,
    /// object number (u16), vertex count (u64), vertex bytes, index count (u64), u32 indices
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut out = Vec::with_capacity(
            8 + self.attributes.len() + 2 + 8 + self.vertices.len() + 8 + self.indices.len() * 4,
        );

        out.extend_from_slice(&(self.attributes.len() as u64).to_le_bytes());
        out.extend(self.attributes.iter().map(|a| a.tag()));
        out.extend_from_slice(&OBJECT_NUMBER.to_le_bytes());

        out.extend_from_slice(&self.vertex_count().to_le_bytes());
        out.extend_from_slice(&self.vertices);

        out.extend_from_slice(&(self.indices.len() as u64).to_le_bytes());
        for index in &self.indices {
            out.extend_from_slice(&index.to_le_bytes());
        }

        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let attribute_count = reader.read_u64()? as usize;
        let attributes = reader
            .take(attribute_count)?
            .iter()
            .map(|tag| VertexAttribute::from_tag(*tag))
            .collect::<Result<Vec<_>>>()?;
        let _object_number = reader.read_u16()?;

        let stride = vertex_stride(&attributes) as u64;
        let vertex_count = reader.read_u64()?;
        let vertex_bytes = vertex_count
            .checked_mul(stride)
            .ok_or_else(|| eyre!("Vertex count {} overflows", vertex_count))?;
        let vertices = reader.take(vertex_bytes as usize)?.to_vec();

        let index_count = reader.read_u64()? as usize;
        let index_bytes = index_count
            .checked_mul(4)
            .ok_or_else(|| eyre!("Index count {} overflows", index_count))?;
        let indices = reader
            .take(index_bytes)?
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        if reader.remaining() > 0 {
            log::warn!("Ignoring {} trailing bytes in mesh file", reader.remaining());
        }

        Ok(Self {
            attributes,
            vertices,
            indices,
        })
    }

    /// Same payload as [`MeshData::encode`], lz4 block compressed behind a u32 uncompressed size
    pub fn encode_compressed(&self) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(&self.encode()?))
    }

    pub fn decode_compressed(bytes: &[u8]) -> Result<Self> {
        let payload = lz4_flex::decompress_size_prepended(bytes)
            .wrap_err("Failed to decompress mesh file")?;
        Self::decode(&payload)
    }

    /// Read a mesh file, decompressing it when the extension says so
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .wrap_err_with(|| format!("Failed to read mesh file {}", path.display()))?;
        let mesh = if is_compressed(path) {
            Self::decode_compressed(&bytes)
        } else {
            Self::decode(&bytes)
        };
        mesh.wrap_err_with(|| format!("Invalid mesh file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = if is_compressed(path) {
            self.encode_compressed()?
        } else {
            self.encode()?
        };
        std::fs::write(path, bytes)
            .wrap_err_with(|| format!("Failed to write mesh file {}", path.display()))
    }

    /// Unit cube with per-face normals and texture coordinates
    pub fn cube() -> Self {
        // (normal, tangent u, tangent v) per face
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            for (cu, cv) in corners {
                vertices.push(Vertex {
                    position: (normal + u * cu + v * cv) * 0.5,
                    texcoord: Vec2::new((cu + 1.0) * 0.5, 1.0 - (cv + 1.0) * 0.5),
                    normal,
                    color: Vec3::ONE,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            attributes: Vertex::ATTRIBUTES.to_vec(),
            vertices: bytemuck::cast_slice(&vertices).to_vec(),
            indices,
        }
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == COMPRESSED_EXTENSION)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            bail!(
                "Mesh data truncated: wanted {} bytes at offset {}, {} left",
                len,
                self.cursor,
                self.remaining(),
            );
        }
        let slice = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}
