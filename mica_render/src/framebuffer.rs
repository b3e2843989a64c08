//! Render-target state: color attachment slots plus an optional depth
//! attachment.
//!
//! Attachments are non-owning [`TextureView`]s paired with the id of the
//! texture they borrow from. The framebuffer never outlives its textures;
//! the context requires detaching before a referenced texture can be
//! destroyed.

use crate::color::ColorFormat;
use crate::context::TextureId;
use crate::error::RenderError;
use crate::shader::MAX_FRAGMENT_OUTPUTS;
use crate::texture::TextureView;

/// Color attachment slots per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = MAX_FRAGMENT_OUTPUTS;

/// Depth storage formats the rasterizer can test against.
pub const DEPTH_FORMATS: [ColorFormat; 3] = [
    ColorFormat::R16Unorm,
    ColorFormat::R16Float,
    ColorFormat::R32Float,
];

/// A texture bound as a render target.
#[derive(Copy, Clone, Debug)]
pub struct Attachment {
    pub texture: TextureId,
    pub(crate) view: TextureView,
}

impl Attachment {
    pub fn new(texture: TextureId, view: TextureView) -> Self {
        Self { texture, view }
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }
}

#[derive(Clone, Debug, Default)]
pub struct Framebuffer {
    color: Vec<Option<Attachment>>,
    depth: Option<Attachment>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the color attachment slot array.
    ///
    /// Shrinking drops the detached slots.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` beyond [`MAX_COLOR_ATTACHMENTS`].
    pub fn reserve_color_buffers(&mut self, count: usize) -> Result<(), RenderError> {
        if count > MAX_COLOR_ATTACHMENTS {
            return Err(RenderError::InvalidArgument);
        }

        self.color.resize(count, None);
        Ok(())
    }

    pub fn num_color_buffers(&self) -> usize {
        self.color.len()
    }

    /// Binds a color attachment to a reserved slot.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the slot was not reserved or the attachment's
    /// format is not a color format.
    pub fn attach_color_buffer(
        &mut self,
        slot: usize,
        attachment: Attachment,
    ) -> Result<(), RenderError> {
        if slot >= self.color.len() || !attachment.view.format().is_valid() {
            return Err(RenderError::InvalidArgument);
        }

        self.color[slot] = Some(attachment);
        Ok(())
    }

    pub fn detach_color_buffer(&mut self, slot: usize) -> Option<Attachment> {
        self.color.get_mut(slot).and_then(Option::take)
    }

    pub fn color_attachment(&self, slot: usize) -> Option<&Attachment> {
        self.color.get(slot).and_then(Option::as_ref)
    }

    /// Binds the depth attachment.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless the view is a single-channel 16-bit
    /// unorm, 16-bit float or 32-bit float texture.
    pub fn attach_depth_buffer(&mut self, attachment: Attachment) -> Result<(), RenderError> {
        if !DEPTH_FORMATS.contains(&attachment.view.format()) {
            return Err(RenderError::InvalidArgument);
        }

        self.depth = Some(attachment);
        Ok(())
    }

    pub fn detach_depth_buffer(&mut self) -> Option<Attachment> {
        self.depth.take()
    }

    pub fn depth_attachment(&self) -> Option<&Attachment> {
        self.depth.as_ref()
    }

    /// Whether any attachment borrows from `texture`.
    pub fn references(&self, texture: TextureId) -> bool {
        self.color
            .iter()
            .flatten()
            .chain(&self.depth)
            .any(|attachment| attachment.texture == texture)
    }

    /// Pixel size shared by every attachment.
    ///
    /// Meaningful only for a [valid](Self::validate) framebuffer.
    pub fn size(&self) -> (u16, u16) {
        self.color
            .iter()
            .flatten()
            .chain(&self.depth)
            .next()
            .map(|attachment| (attachment.view.width(), attachment.view.height()))
            .unwrap_or((0, 0))
    }

    /// Checks completeness: at least one attachment, no empty reserved
    /// slots, and matching sizes everywhere.
    ///
    /// # Errors
    ///
    /// `IncompleteFramebuffer` when any of those fail.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.color.iter().any(Option::is_none) {
            return Err(RenderError::IncompleteFramebuffer);
        }

        let mut attachments = self.color.iter().flatten().chain(&self.depth);
        let Some(first) = attachments.next() else {
            return Err(RenderError::IncompleteFramebuffer);
        };

        let size = (first.view.width(), first.view.height());
        if size.0 == 0 || size.1 == 0 {
            return Err(RenderError::IncompleteFramebuffer);
        }

        for attachment in attachments {
            if (attachment.view.width(), attachment.view.height()) != size {
                return Err(RenderError::IncompleteFramebuffer);
            }
        }

        Ok(())
    }
}
