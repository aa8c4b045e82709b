/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

/// Color channel storage format. Mirrors `ICET_IMAGE_COLOR_{NONE,RGBA_UBYTE,RGBA_FLOAT}`
/// in `original_source/src/include/GL/ice-t.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    None,
    RgbaUByte,
    RgbaFloat,
}

impl ColorFormat {
    /// Bytes occupied by one pixel's color record, 0 when absent.
    pub const fn pixel_size(self) -> usize {
        match self {
            ColorFormat::None => 0,
            ColorFormat::RgbaUByte => 4,
            ColorFormat::RgbaFloat => 16,
        }
    }

    const fn magic_bit(self) -> u32 {
        match self {
            ColorFormat::None => 0,
            _ => COLOR_BUFFER_BIT,
        }
    }

    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(ColorFormat::None),
            1 => Some(ColorFormat::RgbaUByte),
            2 => Some(ColorFormat::RgbaFloat),
            _ => None,
        }
    }

    fn tag(self) -> u32 {
        match self {
            ColorFormat::None => 0,
            ColorFormat::RgbaUByte => 1,
            ColorFormat::RgbaFloat => 2,
        }
    }
}

/// Depth channel storage format. Mirrors `ICET_IMAGE_DEPTH_{NONE,FLOAT}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFormat {
    None,
    Float,
}

impl DepthFormat {
    pub const fn pixel_size(self) -> usize {
        match self {
            DepthFormat::None => 0,
            DepthFormat::Float => 4,
        }
    }

    const fn magic_bit(self) -> u32 {
        match self {
            DepthFormat::None => 0,
            DepthFormat::Float => DEPTH_BUFFER_BIT,
        }
    }

    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DepthFormat::None),
            1 => Some(DepthFormat::Float),
            _ => None,
        }
    }

    fn tag(self) -> u32 {
        match self {
            DepthFormat::None => 0,
            DepthFormat::Float => 1,
        }
    }
}

/// How the compositing engine decides a pixel is part of the foreground.
/// spec.md §3 "Composite mode".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// `depth < far_depth` is active; composite keeps the nearer pixel.
    ZBuffer,
    /// `alpha != 0` is active; composite does premultiplied over/under.
    Blend,
}

pub(crate) const COLOR_BUFFER_BIT: u32 = 0x1;
pub(crate) const DEPTH_BUFFER_BIT: u32 = 0x2;
pub(crate) const DENSE_IMAGE_BASE_MAGIC: u32 = 0x004D_5000;
pub(crate) const SPARSE_IMAGE_BASE_MAGIC: u32 = 0x004D_6000;

/// A descriptor shared by dense and sparse images: the pair of channel
/// formats plus logical dimensions. spec.md §3 "Dense image"/"Sparse image".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub color: ColorFormat,
    pub depth: DepthFormat,
}

impl ImageFormat {
    pub fn new(color: ColorFormat, depth: DepthFormat) -> Self {
        assert!(
            color != ColorFormat::None || depth != DepthFormat::None,
            "image must carry at least one of color or depth"
        );
        ImageFormat { color, depth }
    }

    /// Bytes per pixel when both channels (as present) are packed together,
    /// i.e. the size of one sparse-image `pixel_record`.
    pub const fn pixel_record_size(self) -> usize {
        self.color.pixel_size() + self.depth.pixel_size()
    }

    pub(crate) fn dense_magic(self) -> u32 {
        DENSE_IMAGE_BASE_MAGIC | self.color.magic_bit() | self.depth.magic_bit()
    }

    pub(crate) fn sparse_magic(self) -> u32 {
        SPARSE_IMAGE_BASE_MAGIC | self.color.magic_bit() | self.depth.magic_bit()
    }

    pub(crate) fn pack_tags(self) -> (u32, u32) {
        (self.color.tag(), self.depth.tag())
    }

    pub(crate) fn from_tags(color_tag: u32, depth_tag: u32) -> Option<Self> {
        Some(ImageFormat {
            color: ColorFormat::from_tag(color_tag)?,
            depth: DepthFormat::from_tag(depth_tag)?,
        })
    }

    /// Whether `is_active` should be evaluated from the depth or color
    /// channel for the given composite mode. Fails the same way the
    /// original's `compress_func_body.h` raises `ICET_INVALID_OPERATION`
    /// when Z-buffer compression is requested with no depth channel.
    pub fn active_channel_ok(self, mode: CompositeMode) -> bool {
        match mode {
            CompositeMode::ZBuffer => self.depth != DepthFormat::None,
            CompositeMode::Blend => self.color != ColorFormat::None,
        }
    }
}
