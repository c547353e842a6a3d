//! Render target descriptions.
//!
//! The scheduler never touches GPU memory. A [`RenderTarget`] only describes
//! which attachments exist so that clear/store/resolve/mipmap decisions can be
//! made; the resource layer owns the actual textures.

use bitflags::bitflags;

bitflags! {
    /// Buffers cleared at the start of a render pass.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Identity of a GPU texture owned by the resource layer.
///
/// Several render targets may share a texture, e.g. the six faces of a cubemap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Colour attachment of a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    pub texture: TextureId,
    /// Face index (0..6) when the target renders into one face of a cubemap.
    pub cubemap_face: Option<u8>,
    /// The texture has a mip chain that must be regenerated after writes.
    pub mipmaps: bool,
}

impl TextureInfo {
    #[must_use]
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            cubemap_face: None,
            mipmaps: false,
        }
    }

    #[must_use]
    pub fn cubemap_face(texture: TextureId, face: u8) -> Self {
        debug_assert!(face < 6, "cubemap face out of range: {face}");
        Self {
            texture,
            cubemap_face: Some(face),
            mipmaps: false,
        }
    }

    #[must_use]
    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        self.mipmaps = mipmaps;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_cubemap(&self) -> bool {
        self.cubemap_face.is_some()
    }
}

/// Offscreen render target.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderTarget {
    name: String,
    pub width: u32,
    pub height: u32,
    pub color: Option<TextureInfo>,
    pub depth: bool,
    pub stencil: bool,
    pub samples: u32,
}

impl RenderTarget {
    #[must_use]
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            color: None,
            depth: false,
            stencil: false,
            samples: 1,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: TextureInfo) -> Self {
        self.color = Some(color);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: bool, stencil: bool) -> Self {
        self.depth = depth;
        self.stencil = stencil;
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Depth-only targets (shadow maps, depth prepass) have no colour buffer.
    #[inline]
    #[must_use]
    pub fn is_depth_only(&self) -> bool {
        self.color.is_none() && self.depth
    }
}
