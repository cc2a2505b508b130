//! Device capability descriptor and render-target format resolution

/// Number of float channels a field needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelFormat {
    R,
    Rg,
    Rgba,
}

impl ChannelFormat {
    pub fn channels(self) -> usize {
        match self {
            ChannelFormat::R => 1,
            ChannelFormat::Rg => 2,
            ChannelFormat::Rgba => 4,
        }
    }
}

/// Concrete float render-target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
}

impl TextureFormat {
    pub fn channels(self) -> usize {
        match self {
            TextureFormat::R16Float | TextureFormat::R32Float => 1,
            TextureFormat::Rg16Float | TextureFormat::Rg32Float => 2,
            TextureFormat::Rgba16Float | TextureFormat::Rgba32Float => 4,
        }
    }

    pub fn is_half(self) -> bool {
        matches!(
            self,
            TextureFormat::R16Float | TextureFormat::Rg16Float | TextureFormat::Rgba16Float
        )
    }
}

/// What a device reports for a single format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatSupport {
    pub renderable: bool,
    pub filterable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// What the device reported about float render targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    /// Float textures can be sampled with hardware bilinear filtering.
    pub supports_float_filtering: bool,
    pub supports_half_float: bool,
    /// Formats that are complete as color attachments.
    pub renderable: Vec<TextureFormat>,
}

impl Capabilities {
    /// Everything supported, as on any desktop-class device.
    pub fn full() -> Self {
        Self {
            supports_float_filtering: true,
            supports_half_float: true,
            renderable: vec![
                TextureFormat::R16Float,
                TextureFormat::Rg16Float,
                TextureFormat::Rgba16Float,
                TextureFormat::R32Float,
                TextureFormat::Rg32Float,
                TextureFormat::Rgba32Float,
            ],
        }
    }

    /// Float render targets without filtering and without one- or
    /// two-channel half formats, the minimal profile the solver still runs on.
    pub fn minimal() -> Self {
        Self {
            supports_float_filtering: false,
            supports_half_float: true,
            renderable: vec![TextureFormat::Rgba16Float, TextureFormat::Rgba32Float],
        }
    }

    /// Builds capabilities from per-format support. Renderable formats are
    /// kept even when they cannot be filtered; filtering counts as supported
    /// only if every format the solver would pick can be filtered.
    pub fn from_support(support: impl IntoIterator<Item = (TextureFormat, FormatSupport)>) -> Self {
        let support: Vec<(TextureFormat, FormatSupport)> = support
            .into_iter()
            .filter(|(_, support)| support.renderable)
            .collect();
        let renderable: Vec<TextureFormat> = support.iter().map(|(format, _)| *format).collect();

        let mut caps = Self {
            supports_float_filtering: false,
            supports_half_float: renderable.iter().any(|format| format.is_half()),
            renderable,
        };
        let filterable = |format: TextureFormat| {
            support
                .iter()
                .any(|(candidate, support)| *candidate == format && support.filterable)
        };
        caps.supports_float_filtering = FormatSet::resolve(&caps)
            .is_some_and(|set| [set.r, set.rg, set.rgba].into_iter().all(filterable));
        caps
    }

    pub fn can_render(&self, format: TextureFormat) -> bool {
        self.renderable.contains(&format)
    }

    pub fn filter_mode(&self) -> FilterMode {
        if self.supports_float_filtering {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        }
    }
}

/// Ordered fallback list for a requested channel layout: narrowest format
/// first, widening one step at a time, half precision before full.
pub fn candidates(channels: ChannelFormat, half_float: bool) -> Vec<TextureFormat> {
    let half: &[TextureFormat] = match channels {
        ChannelFormat::R => &[
            TextureFormat::R16Float,
            TextureFormat::Rg16Float,
            TextureFormat::Rgba16Float,
        ],
        ChannelFormat::Rg => &[TextureFormat::Rg16Float, TextureFormat::Rgba16Float],
        ChannelFormat::Rgba => &[TextureFormat::Rgba16Float],
    };
    let full: &[TextureFormat] = match channels {
        ChannelFormat::R => &[
            TextureFormat::R32Float,
            TextureFormat::Rg32Float,
            TextureFormat::Rgba32Float,
        ],
        ChannelFormat::Rg => &[TextureFormat::Rg32Float, TextureFormat::Rgba32Float],
        ChannelFormat::Rgba => &[TextureFormat::Rgba32Float],
    };

    let mut list = Vec::with_capacity(half.len() + full.len());
    if half_float {
        list.extend_from_slice(half);
    }
    list.extend_from_slice(full);
    list
}

/// First renderable entry of the candidate list, if any.
pub fn resolve_format(channels: ChannelFormat, caps: &Capabilities) -> Option<TextureFormat> {
    candidates(channels, caps.supports_half_float)
        .into_iter()
        .find(|format| caps.can_render(*format))
}

/// Resolved formats for the three field layouts the solver allocates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatSet {
    pub rgba: TextureFormat,
    pub rg: TextureFormat,
    pub r: TextureFormat,
}

impl FormatSet {
    pub fn resolve(caps: &Capabilities) -> Option<Self> {
        Some(Self {
            rgba: resolve_format(ChannelFormat::Rgba, caps)?,
            rg: resolve_format(ChannelFormat::Rg, caps)?,
            r: resolve_format(ChannelFormat::R, caps)?,
        })
    }
}
