//! Programmable pipeline stages.
//!
//! Shaders are plain host function values; there is no compilation step.
//! The pipeline calls them from every worker thread, which is safe
//! because `fn` items carry no state. Anything a shader needs beyond its
//! inputs lives in the uniform buffer named by the program.
//!
//! A stage may pin pipeline state (cull, depth, blend) by declaring
//! `Some(mode)`; a `None` declaration inherits the context's raster
//! state at draw time.

use glam::Vec4;

use crate::buffer::{UniformBuffer, VertexBuffer};
use crate::context::UniformBufferId;
use crate::error::RenderError;
use crate::state::{BlendMode, CullMode, DepthMask, DepthTest, RasterState};
use crate::vertex_array::VertexArray;

/// Varying slots per vertex.
pub const MAX_VARYINGS: usize = 4;

/// Color outputs per fragment.
pub const MAX_FRAGMENT_OUTPUTS: usize = 4;

/// Inputs to one vertex-shader invocation.
pub struct VertexInput<'a> {
    pub vao: &'a VertexArray,
    pub vbo: &'a VertexBuffer,
    pub ubo: &'a UniformBuffer,
    pub vertex_id: u32,
    pub instance_id: u32,
}

/// Vertex stage entry point.
///
/// Writes up to `num_varyings` values into the output slice and returns
/// the clip-space position.
pub type VertexShaderFn = fn(&VertexInput<'_>, &mut [Vec4]) -> Vec4;

/// Window-space position of a fragment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FragCoord {
    pub x: u16,
    pub y: u16,
    /// Screen-space depth, interpolated linearly.
    pub z: f32,
    /// Perspective `w` reconstructed at the fragment.
    pub w: f32,
}

/// Inputs to one fragment-shader invocation.
///
/// Varyings arrive already perspective-correctly interpolated.
pub struct FragmentInput<'a> {
    pub coord: FragCoord,
    pub ubo: &'a UniformBuffer,
    pub varyings: &'a [Vec4],
}

/// Fragment stage entry point.
///
/// Writes up to `num_outputs` colors and returns whether the fragment
/// should be kept; `false` discards it with no color or depth effect.
pub type FragmentShaderFn = fn(&FragmentInput<'_>, &mut [Vec4]) -> bool;

#[derive(Copy, Clone, Debug)]
pub struct VertexShader {
    pub shader: VertexShaderFn,
    /// Number of varyings this stage produces, at most [`MAX_VARYINGS`].
    pub num_varyings: usize,
    pub cull_mode: Option<CullMode>,
}

#[derive(Copy, Clone, Debug)]
pub struct FragmentShader {
    pub shader: FragmentShaderFn,
    /// Number of varyings this stage consumes.
    pub num_varyings: usize,
    /// Number of color attachments this stage writes, at most
    /// [`MAX_FRAGMENT_OUTPUTS`].
    pub num_outputs: usize,
    pub blend_mode: Option<BlendMode>,
    pub depth_test: Option<DepthTest>,
    pub depth_mask: Option<DepthMask>,
}

/// A linked vertex + fragment program.
#[derive(Clone, Debug)]
pub struct Shader {
    pub(crate) vertex: VertexShader,
    pub(crate) fragment: FragmentShader,
    pub(crate) uniform: Option<UniformBufferId>,
}

impl Shader {
    /// Links the two stages.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the varying counts disagree or any declared
    /// count is out of range.
    pub fn new(
        vertex: VertexShader,
        fragment: FragmentShader,
        uniform: Option<UniformBufferId>,
    ) -> Result<Self, RenderError> {
        if vertex.num_varyings > MAX_VARYINGS
            || fragment.num_varyings != vertex.num_varyings
            || fragment.num_outputs > MAX_FRAGMENT_OUTPUTS
        {
            return Err(RenderError::InvalidArgument);
        }

        Ok(Self {
            vertex,
            fragment,
            uniform,
        })
    }

    pub fn vertex(&self) -> &VertexShader {
        &self.vertex
    }

    pub fn fragment(&self) -> &FragmentShader {
        &self.fragment
    }

    pub fn uniform(&self) -> Option<UniformBufferId> {
        self.uniform
    }

    /// The raster state a draw with this program runs under: `base` with
    /// every `Some` declaration applied on top.
    pub(crate) fn apply_overrides(&self, base: &RasterState) -> RasterState {
        let mut state = *base;

        if let Some(cull) = self.vertex.cull_mode {
            state.set_cull_mode(cull);
        }
        if let Some(blend) = self.fragment.blend_mode {
            state.set_blend_mode(blend);
        }
        if let Some(test) = self.fragment.depth_test {
            state.set_depth_test(test);
        }
        if let Some(mask) = self.fragment.depth_mask {
            state.set_depth_mask(mask);
        }

        state
    }
}
