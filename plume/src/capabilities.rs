// Figure out which float textures the device can render to and filter.
//
// Nothing here is an error: a missing extension or format only narrows
// what the fluid fields are stored in.

use crate::backend::Channels;
use crate::render::{Context, RenderTarget, TextureFormat, TextureOptions};

use glow::HasContext;

// From OES_texture_half_float. WebGL 1 has no core token for it.
const HALF_FLOAT_OES: u32 = 0x8D61;

const RGBA: TextureFormat = TextureFormat {
    internal_format: glow::RGBA,
    format: glow::RGBA,
};
const RGBA16F: TextureFormat = TextureFormat {
    internal_format: glow::RGBA16F,
    format: glow::RGBA,
};
const RG16F: TextureFormat = TextureFormat {
    internal_format: glow::RG16F,
    format: glow::RG,
};
const R16F: TextureFormat = TextureFormat {
    internal_format: glow::R16F,
    format: glow::RED,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextVersion {
    WebGl2,
    WebGl1,
}

impl ContextVersion {
    /// The extensions to enable before probing.
    pub fn extensions(&self) -> [&'static str; 2] {
        match self {
            ContextVersion::WebGl2 => ["EXT_color_buffer_float", "OES_texture_float_linear"],
            ContextVersion::WebGl1 => ["OES_texture_half_float", "OES_texture_half_float_linear"],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub version: ContextVersion,
    pub half_float_type: Option<u32>,
    pub linear_filtering: bool,
    pub rgba: TextureFormat,
    pub rg: TextureFormat,
    pub r: TextureFormat,
}

impl Capabilities {
    pub fn probe(context: &Context, version: ContextVersion) -> Self {
        let extensions = context.supported_extensions();
        let (half_float_type, linear_filtering) =
            resolve_extensions(version, |name| extensions.contains(name));
        let texel_type = half_float_type.unwrap_or(glow::UNSIGNED_BYTE);

        let supports = |format| supports_format(context, format, texel_type);
        let capabilities = Self {
            version,
            half_float_type,
            linear_filtering,
            rgba: resolve_format(version, Channels::Rgba, supports),
            rg: resolve_format(version, Channels::Rg, supports),
            r: resolve_format(version, Channels::R, supports),
        };

        log::debug!("Capabilities: {:?}", capabilities);

        capabilities
    }

    /// The pixel type to allocate field textures with. Without half floats
    /// the fields fall back to 8-bit storage.
    pub fn texel_type(&self) -> u32 {
        self.half_float_type.unwrap_or(glow::UNSIGNED_BYTE)
    }

    pub fn format(&self, channels: Channels) -> TextureFormat {
        match channels {
            Channels::Rgba => self.rgba,
            Channels::Rg => self.rg,
            Channels::R => self.r,
        }
    }
}

/// Returns the half-float pixel type and whether float textures can be
/// linearly filtered.
pub fn resolve_extensions(
    version: ContextVersion,
    has_extension: impl Fn(&str) -> bool,
) -> (Option<u32>, bool) {
    match version {
        ContextVersion::WebGl2 => (
            Some(glow::HALF_FLOAT),
            has_extension("OES_texture_float_linear"),
        ),
        ContextVersion::WebGl1 => (
            has_extension("OES_texture_half_float").then_some(HALF_FLOAT_OES),
            has_extension("OES_texture_half_float_linear"),
        ),
    }
}

pub fn requested_format(version: ContextVersion, channels: Channels) -> TextureFormat {
    match (version, channels) {
        (ContextVersion::WebGl1, _) => RGBA,
        (ContextVersion::WebGl2, Channels::Rgba) => RGBA16F,
        (ContextVersion::WebGl2, Channels::Rg) => RG16F,
        (ContextVersion::WebGl2, Channels::R) => R16F,
    }
}

/// Walk the fallback chain until the device accepts a format.
///
/// WebGL 2 widens R16F to RG16F to RGBA16F. WebGL 1 only has plain RGBA.
pub fn resolve_format(
    version: ContextVersion,
    channels: Channels,
    supports: impl Fn(TextureFormat) -> bool,
) -> TextureFormat {
    let mut format = requested_format(version, channels);

    loop {
        if supports(format) {
            return format;
        }

        format = match (version, format.internal_format) {
            (ContextVersion::WebGl1, _) => return RGBA,
            (ContextVersion::WebGl2, glow::R16F) => RG16F,
            (ContextVersion::WebGl2, glow::RG16F) => RGBA16F,
            (ContextVersion::WebGl2, _) => return RGBA16F,
        };
    }
}

// Try to build a small complete render target in the format. The target is
// released as soon as the check is done.
fn supports_format(context: &Context, format: TextureFormat, texel_type: u32) -> bool {
    let options = TextureOptions {
        filter: glow::NEAREST,
        format,
        type_: texel_type,
    };

    RenderTarget::new(context, 4, 4, options).is_ok()
}
