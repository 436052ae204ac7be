//! Compiled mesh format.
//!
//! Layout: `[magic][version][vertex_count: u32][index_count: u32]
//! [vertices: Vertex * vertex_count][indices: u32 * index_count]`.
//! Indices describe a triangle list, so the index count is always a
//! multiple of 3.

use crate::codec::{write_header, Reader};
use crate::FormatError;
use bytemuck::{Pod, Zeroable};

pub const MESH_MAGIC: [u8; 4] = *b"PMSH";

/// On-disk and in-GPU vertex layout, 24 bytes.
///
/// Color is four RGBA bytes; conceptually [0,1] values stored as [0,255].
/// The builder flips the authored v coordinate (`1 - v`) so the runtime
/// samples with the top-left origin the backend expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [u8; 4],
}

/// Byte stride of one vertex, both on disk and in the GPU vertex buffer.
pub const VERTEX_STRIDE: usize = std::mem::size_of::<Vertex>();

/// Decoded contents of a compiled mesh file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshFile {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshFile {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Number of triangles the index list describes.
    pub fn triangle_count(&self) -> u32 {
        self.index_count() / 3
    }

    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        if self.indices.len() % 3 != 0 {
            return Err(FormatError::InvalidIndexCount(self.indices.len() as u32));
        }
        let mut out = Vec::with_capacity(
            4 + 1 + 8 + self.vertices.len() * VERTEX_STRIDE + self.indices.len() * 4,
        );
        write_header(&mut out, MESH_MAGIC);
        out.extend_from_slice(&self.vertex_count().to_le_bytes());
        out.extend_from_slice(&self.index_count().to_le_bytes());
        out.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        for index in &self.indices {
            out.extend_from_slice(&index.to_le_bytes());
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = Reader::new(bytes);
        reader.header(MESH_MAGIC)?;
        let vertex_count = reader.u32("vertex count")? as usize;
        let index_count = reader.u32("index count")?;
        if index_count % 3 != 0 {
            return Err(FormatError::InvalidIndexCount(index_count));
        }
        // The counts come from an untrusted header; make sure the payload
        // can actually back them before reserving anything.
        let payload = vertex_count as u64 * VERTEX_STRIDE as u64 + index_count as u64 * 4;
        if (reader.remaining() as u64) < payload {
            return Err(FormatError::Truncated("mesh payload"));
        }

        let vertex_bytes = reader.take(vertex_count * VERTEX_STRIDE, "vertex data")?;
        let vertices = vertex_bytes
            .chunks_exact(VERTEX_STRIDE)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let mut indices = Vec::with_capacity(index_count as usize);
        for _ in 0..index_count {
            indices.push(reader.u32("index data")?);
        }

        Ok(Self { vertices, indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshFile {
        let color = [255, 255, 255, 255];
        MeshFile {
            vertices: vec![
                Vertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0], color },
                Vertex { position: [1.0, -1.0, 0.0], uv: [1.0, 1.0], color },
                Vertex { position: [1.0, 1.0, 0.0], uv: [1.0, 0.0], color },
                Vertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 0.0], color },
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    #[test]
    fn vertex_is_24_bytes_with_color_at_20() {
        assert_eq!(VERTEX_STRIDE, 24);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 12);
        assert_eq!(std::mem::offset_of!(Vertex, color), 20);
    }

    #[test]
    fn quad_round_trips() {
        let mesh = quad();
        let decoded = MeshFile::decode(&mesh.encode().unwrap()).unwrap();
        assert_eq!(decoded, mesh);
        assert_eq!(decoded.vertex_count(), 4);
        assert_eq!(decoded.index_count(), 6);
        assert_eq!(decoded.triangle_count(), 2);
    }

    #[test]
    fn counts_precede_payload() {
        let bytes = quad().encode().unwrap();
        // magic + version, then the two u32 counts.
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 4);
        assert_eq!(u32::from_le_bytes(bytes[9..13].try_into().unwrap()), 6);
    }

    #[test]
    fn non_triangle_index_count_is_rejected() {
        let mut mesh = quad();
        mesh.indices.pop();
        assert!(matches!(
            mesh.encode(),
            Err(FormatError::InvalidIndexCount(5))
        ));
    }

    #[test]
    fn truncated_vertex_data_is_rejected() {
        let bytes = quad().encode().unwrap();
        assert!(matches!(
            MeshFile::decode(&bytes[..bytes.len() - 30]),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn hostile_index_count_fails_before_reserving() {
        let mut bytes = quad().encode().unwrap();
        // Claim ~4.3 billion indices the payload cannot back; the decoder
        // must bail on the byte check, not reserve 16 GiB first.
        bytes[9..13].copy_from_slice(&(u32::MAX - 3).to_le_bytes());
        assert!(matches!(
            MeshFile::decode(&bytes),
            Err(FormatError::Truncated("mesh payload"))
        ));
    }
}
