//! DDS texture container parsing.
//!
//! The runtime consumes block-compressed DDS files produced by the external
//! texture pipeline: `"DDS "` fourCC, 124-byte header, then the DXT1 or DXT5
//! payload with a complete mip chain. This module never writes DDS files.

use crate::FormatError;

pub const DDS_FOURCC: [u8; 4] = *b"DDS ";

const HEADER_SIZE: usize = 124;
// Byte offsets from the start of the file.
const OFFSET_HEIGHT: usize = 12;
const OFFSET_WIDTH: usize = 16;
const OFFSET_MIP_COUNT: usize = 28;
const OFFSET_PIXEL_FOURCC: usize = 84;
const DATA_START: usize = 4 + HEADER_SIZE;

/// Largest edge length accepted from a DDS header. Keeps every mip-size
/// computation far away from overflow; real hardware tops out here too.
pub const MAX_TEXTURE_DIMENSION: u32 = 16_384;

/// Block compression scheme of a DDS payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedFormat {
    /// BC1, no alpha, 8-byte blocks.
    Dxt1,
    /// BC3, interpolated alpha, 16-byte blocks.
    Dxt5,
}

impl CompressedFormat {
    pub fn block_size(self) -> usize {
        match self {
            Self::Dxt1 => 8,
            Self::Dxt5 => 16,
        }
    }
}

/// One level of a mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct DdsMip {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A parsed block-compressed texture with its full mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct DdsTexture {
    pub width: u32,
    pub height: u32,
    pub format: CompressedFormat,
    pub mips: Vec<DdsMip>,
}

impl DdsTexture {
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < DATA_START {
            return Err(FormatError::Truncated("DDS header"));
        }
        let fourcc: [u8; 4] = bytes[0..4].try_into().unwrap_or_default();
        if fourcc != DDS_FOURCC {
            return Err(FormatError::NotADds(fourcc));
        }

        let read_u32 = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let height = read_u32(OFFSET_HEIGHT);
        let width = read_u32(OFFSET_WIDTH);
        // Header fields are untrusted; reject dimensions no payload could
        // back before any size arithmetic happens.
        if width == 0
            || height == 0
            || width > MAX_TEXTURE_DIMENSION
            || height > MAX_TEXTURE_DIMENSION
        {
            return Err(FormatError::BadDimensions(width, height));
        }
        // A mip count of zero means the file carries only the base level.
        let mip_count = read_u32(OFFSET_MIP_COUNT).max(1);

        let pixel_fourcc: [u8; 4] = bytes[OFFSET_PIXEL_FOURCC..OFFSET_PIXEL_FOURCC + 4]
            .try_into()
            .unwrap_or_default();
        let format = match &pixel_fourcc {
            b"DXT1" => CompressedFormat::Dxt1,
            b"DXT5" => CompressedFormat::Dxt5,
            _ => return Err(FormatError::UnsupportedFourCc(pixel_fourcc)),
        };

        let mut mips = Vec::with_capacity(mip_count as usize);
        let mut offset = DATA_START;
        let (mut level_width, mut level_height) = (width, height);
        for _ in 0..mip_count {
            let size = mip_size(level_width, level_height, format);
            if bytes.len() < offset + size {
                return Err(FormatError::Truncated("DDS mip data"));
            }
            mips.push(DdsMip {
                width: level_width,
                height: level_height,
                data: bytes[offset..offset + size].to_vec(),
            });
            offset += size;
            level_width = (level_width / 2).max(1);
            level_height = (level_height / 2).max(1);
        }
        if offset != bytes.len() {
            return Err(FormatError::TrailingData(bytes.len() - offset));
        }

        Ok(Self {
            width,
            height,
            format,
            mips,
        })
    }
}

/// Byte size of one block-compressed level, rounded up to whole 4x4 blocks.
///
/// Callers have already bounded both edges by [`MAX_TEXTURE_DIMENSION`],
/// so the product stays well inside `usize`.
fn mip_size(width: u32, height: u32, format: CompressedFormat) -> usize {
    let blocks_x = width.div_ceil(4) as usize;
    let blocks_y = height.div_ceil(4) as usize;
    blocks_x * blocks_y * format.block_size()
}
