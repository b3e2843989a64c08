//! A multi-threaded software rasterizer.
//!
//! The pipeline runs entirely on the CPU: programmable vertex and
//! fragment stages (host `fn` values), clip-space clipping, edge-function
//! scan conversion, depth testing and blending into texture-backed
//! framebuffers, with the work spread over a fixed worker pool. Output
//! leaves the renderer through texture blits, either to other textures
//! or to an externally owned BGRA8 surface.
//!
//! [`Context`] owns every resource and is the entry point:
//!
//! ```
//! use mica_render::color::ColorFormat;
//! use mica_render::texture::TexelOrder;
//! use mica_render::Context;
//!
//! let mut ctx = Context::with_threads(4);
//! let target = ctx
//!     .create_texture(ColorFormat::Rgba8Unorm, 640, 480, 1, TexelOrder::Linear)
//!     .unwrap();
//! let fbo = ctx.create_framebuffer();
//! ctx.framebuffer_mut(fbo).reserve_color_buffers(1).unwrap();
//! ctx.attach_color_buffer(fbo, 0, target).unwrap();
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod color;
pub mod context;
pub mod error;
pub mod fixed;
pub mod framebuffer;
pub mod mesh;
pub mod sampler;
pub mod shader;
pub mod state;
pub mod surface;
pub mod texture;
pub mod vertex_array;

mod cell;
mod pipeline;

pub use context::Context;
pub use error::RenderError;
