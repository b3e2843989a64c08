//! Resource ownership and draw orchestration.
//!
//! The [`Context`] owns every texture, buffer, vertex array, framebuffer
//! and shader behind opaque handles, carries the raster state, and runs
//! draws/blits/clears on its worker pool. Handles of destroyed resources
//! may be reused by later creations; using a stale handle panics.
//!
//! A draw is two barrier dispatches: the vertex phase bins primitives per
//! worker, the fragment phase rasterizes per row band. Everything a
//! worker touches is either read-only for the whole draw or owned by
//! that worker alone, which is what makes the unchecked sharing below
//! sound.

use glam::DVec4;
use mica_tasks::TaskPool;
use slotmap::{DefaultKey, SlotMap};
use tracing::trace_span;

use crate::buffer::{IndexBuffer, IndexFormat, UniformBuffer, VertexBuffer};
use crate::cell::SyncCell;
use crate::color::ColorFormat;
use crate::error::RenderError;
use crate::framebuffer::{Attachment, Framebuffer};
use crate::mesh::Mesh;
use crate::pipeline::blit::{BlitRect, SurfacePixels};
use crate::pipeline::clear::encode_clear_color;
use crate::pipeline::{blit, clear, raster, vertex, DrawBounds, FrameTargets, WorkerBin};
use crate::shader::{FragmentShader, Shader, VertexShader};
use crate::state::{BlendMode, CullMode, DepthMask, DepthTest, RasterState, Rect};
use crate::surface::PresentableSurface;
use crate::texture::{TexelOrder, Texture};
use crate::vertex_array::VertexArray;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) DefaultKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexBufferId(pub(crate) DefaultKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexBufferId(pub(crate) DefaultKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub(crate) DefaultKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformBufferId(pub(crate) DefaultKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub(crate) DefaultKey);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub(crate) DefaultKey);

pub struct Context {
    textures: SlotMap<DefaultKey, Texture>,
    vertex_buffers: SlotMap<DefaultKey, VertexBuffer>,
    index_buffers: SlotMap<DefaultKey, IndexBuffer>,
    vertex_arrays: SlotMap<DefaultKey, VertexArray>,
    uniform_buffers: SlotMap<DefaultKey, UniformBuffer>,
    framebuffers: SlotMap<DefaultKey, Framebuffer>,
    shaders: SlotMap<DefaultKey, Shader>,
    state: RasterState,
    pool: TaskPool,
    /// Per-worker primitive bins, reset at the start of every draw.
    scratch: Vec<SyncCell<WorkerBin>>,
    /// Stands in for shaders that bind no uniform buffer.
    fallback_ubo: UniformBuffer,
}

impl Context {
    /// Creates a context with one worker per available CPU.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);
        Self::with_threads(threads)
    }

    pub fn with_threads(threads: usize) -> Self {
        let pool = TaskPool::new(threads);
        let scratch = std::iter::repeat_with(SyncCell::default)
            .take(pool.workers())
            .collect();

        Self {
            textures: SlotMap::new(),
            vertex_buffers: SlotMap::new(),
            index_buffers: SlotMap::new(),
            vertex_arrays: SlotMap::new(),
            uniform_buffers: SlotMap::new(),
            framebuffers: SlotMap::new(),
            shaders: SlotMap::new(),
            state: RasterState::new(),
            pool,
            scratch,
            fallback_ubo: UniformBuffer::new(),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.pool.workers()
    }

    /// Rebuilds the worker pool with `threads` workers.
    pub fn set_num_threads(&mut self, threads: usize) {
        self.pool.resize(threads);
        self.scratch.clear();
        self.scratch
            .extend(std::iter::repeat_with(SyncCell::default).take(self.pool.workers()));
    }

    // Textures

    /// Allocates a texture and returns its handle.
    ///
    /// # Errors
    ///
    /// As [`Texture::new`].
    pub fn create_texture(
        &mut self,
        format: ColorFormat,
        width: u16,
        height: u16,
        depth: u16,
        order: TexelOrder,
    ) -> Result<TextureId, RenderError> {
        let texture = Texture::new(format, width, height, depth, order)?;
        Ok(TextureId(self.textures.insert(texture)))
    }

    /// Releases a texture. The texture must not be attached to any
    /// framebuffer.
    pub fn destroy_texture(&mut self, id: TextureId) {
        debug_assert!(
            self.framebuffers.values().all(|fb| !fb.references(id)),
            "texture destroyed while still attached to a framebuffer",
        );
        self.textures.remove(id.0);
    }

    pub fn texture(&self, id: TextureId) -> &Texture {
        self.textures.get(id.0).expect("invalid texture handle")
    }

    pub fn texture_mut(&mut self, id: TextureId) -> &mut Texture {
        self.textures.get_mut(id.0).expect("invalid texture handle")
    }

    // Vertex buffers

    /// # Errors
    ///
    /// As [`VertexBuffer::new`].
    pub fn create_vertex_buffer(&mut self, size: usize) -> Result<VertexBufferId, RenderError> {
        let buffer = VertexBuffer::new(size)?;
        Ok(VertexBufferId(self.vertex_buffers.insert(buffer)))
    }

    pub fn destroy_vertex_buffer(&mut self, id: VertexBufferId) {
        self.vertex_buffers.remove(id.0);
    }

    pub fn vertex_buffer(&self, id: VertexBufferId) -> &VertexBuffer {
        self.vertex_buffers
            .get(id.0)
            .expect("invalid vertex buffer handle")
    }

    pub fn vertex_buffer_mut(&mut self, id: VertexBufferId) -> &mut VertexBuffer {
        self.vertex_buffers
            .get_mut(id.0)
            .expect("invalid vertex buffer handle")
    }

    // Index buffers

    /// # Errors
    ///
    /// As [`IndexBuffer::new`].
    pub fn create_index_buffer(
        &mut self,
        count: usize,
        format: IndexFormat,
        data: Option<&[u8]>,
    ) -> Result<IndexBufferId, RenderError> {
        let buffer = IndexBuffer::new(count, format, data)?;
        Ok(IndexBufferId(self.index_buffers.insert(buffer)))
    }

    pub fn destroy_index_buffer(&mut self, id: IndexBufferId) {
        self.index_buffers.remove(id.0);
    }

    pub fn index_buffer(&self, id: IndexBufferId) -> &IndexBuffer {
        self.index_buffers
            .get(id.0)
            .expect("invalid index buffer handle")
    }

    pub fn index_buffer_mut(&mut self, id: IndexBufferId) -> &mut IndexBuffer {
        self.index_buffers
            .get_mut(id.0)
            .expect("invalid index buffer handle")
    }

    // Vertex arrays

    pub fn create_vertex_array(&mut self) -> VertexArrayId {
        VertexArrayId(self.vertex_arrays.insert(VertexArray::new()))
    }

    pub fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.remove(id.0);
    }

    pub fn vertex_array(&self, id: VertexArrayId) -> &VertexArray {
        self.vertex_arrays
            .get(id.0)
            .expect("invalid vertex array handle")
    }

    pub fn vertex_array_mut(&mut self, id: VertexArrayId) -> &mut VertexArray {
        self.vertex_arrays
            .get_mut(id.0)
            .expect("invalid vertex array handle")
    }

    // Uniform buffers

    pub fn create_uniform_buffer(&mut self) -> UniformBufferId {
        UniformBufferId(self.uniform_buffers.insert(UniformBuffer::new()))
    }

    pub fn destroy_uniform_buffer(&mut self, id: UniformBufferId) {
        self.uniform_buffers.remove(id.0);
    }

    pub fn uniform_buffer(&self, id: UniformBufferId) -> &UniformBuffer {
        self.uniform_buffers
            .get(id.0)
            .expect("invalid uniform buffer handle")
    }

    pub fn uniform_buffer_mut(&mut self, id: UniformBufferId) -> &mut UniformBuffer {
        self.uniform_buffers
            .get_mut(id.0)
            .expect("invalid uniform buffer handle")
    }

    // Framebuffers

    pub fn create_framebuffer(&mut self) -> FramebufferId {
        FramebufferId(self.framebuffers.insert(Framebuffer::new()))
    }

    pub fn destroy_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.remove(id.0);
    }

    pub fn framebuffer(&self, id: FramebufferId) -> &Framebuffer {
        self.framebuffers
            .get(id.0)
            .expect("invalid framebuffer handle")
    }

    pub fn framebuffer_mut(&mut self, id: FramebufferId) -> &mut Framebuffer {
        self.framebuffers
            .get_mut(id.0)
            .expect("invalid framebuffer handle")
    }

    /// Attaches `texture` to a reserved color slot of `framebuffer`.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for dead handles, otherwise as
    /// [`Framebuffer::attach_color_buffer`].
    pub fn attach_color_buffer(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
    ) -> Result<(), RenderError> {
        let view = self
            .textures
            .get(texture.0)
            .ok_or(RenderError::InvalidHandle)?
            .view();
        let framebuffer = self
            .framebuffers
            .get_mut(framebuffer.0)
            .ok_or(RenderError::InvalidHandle)?;

        framebuffer.attach_color_buffer(slot, Attachment::new(texture, view))
    }

    /// Attaches `texture` as the depth buffer of `framebuffer`.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for dead handles, otherwise as
    /// [`Framebuffer::attach_depth_buffer`].
    pub fn attach_depth_buffer(
        &mut self,
        framebuffer: FramebufferId,
        texture: TextureId,
    ) -> Result<(), RenderError> {
        let view = self
            .textures
            .get(texture.0)
            .ok_or(RenderError::InvalidHandle)?
            .view();
        let framebuffer = self
            .framebuffers
            .get_mut(framebuffer.0)
            .ok_or(RenderError::InvalidHandle)?;

        framebuffer.attach_depth_buffer(Attachment::new(texture, view))
    }

    // Shaders

    /// Links a shader program.
    ///
    /// # Errors
    ///
    /// As [`Shader::new`]; `InvalidHandle` for a dead uniform handle.
    pub fn create_shader(
        &mut self,
        vertex: VertexShader,
        fragment: FragmentShader,
        uniform: Option<UniformBufferId>,
    ) -> Result<ShaderId, RenderError> {
        if let Some(uniform) = uniform {
            if !self.uniform_buffers.contains_key(uniform.0) {
                return Err(RenderError::InvalidHandle);
            }
        }

        let shader = Shader::new(vertex, fragment, uniform)?;
        Ok(ShaderId(self.shaders.insert(shader)))
    }

    pub fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(id.0);
    }

    pub fn shader(&self, id: ShaderId) -> &Shader {
        self.shaders.get(id.0).expect("invalid shader handle")
    }

    // Draw state

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.set_cull_mode(mode);
    }

    pub fn cull_mode(&self) -> CullMode {
        self.state.cull_mode()
    }

    pub fn set_depth_test(&mut self, test: DepthTest) {
        self.state.set_depth_test(test);
    }

    pub fn depth_test(&self) -> DepthTest {
        self.state.depth_test()
    }

    pub fn set_depth_mask(&mut self, mask: DepthMask) {
        self.state.set_depth_mask(mask);
    }

    pub fn depth_mask(&self) -> DepthMask {
        self.state.depth_mask()
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.set_blend_mode(mode);
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.state.blend_mode()
    }

    pub fn set_viewport(&mut self, x: u16, y: u16, width: u16, height: u16) {
        self.state.set_viewport(x, y, width, height);
    }

    pub fn viewport(&self) -> Rect {
        self.state.viewport()
    }

    pub fn set_scissor(&mut self, x: u16, y: u16, width: u16, height: u16) {
        self.state.set_scissor(x, y, width, height);
    }

    pub fn scissor(&self) -> Rect {
        self.state.scissor()
    }

    // Drawing

    /// Renders `mesh` with `shader` into `target`.
    ///
    /// Returns after every fragment has been written; a subsequent draw
    /// observes all effects of this one.
    pub fn draw(&mut self, mesh: &Mesh, shader: ShaderId, target: FramebufferId) {
        self.draw_instanced(mesh, 1, shader, target);
    }

    /// Renders several meshes back to back with the same program.
    pub fn draw_multiple(&mut self, meshes: &[Mesh], shader: ShaderId, target: FramebufferId) {
        for mesh in meshes {
            self.draw_instanced(mesh, 1, shader, target);
        }
    }

    /// Renders `mesh` `instances` times; the vertex shader distinguishes
    /// instances through its `instance_id` input.
    pub fn draw_instanced(
        &mut self,
        mesh: &Mesh,
        instances: usize,
        shader: ShaderId,
        target: FramebufferId,
    ) {
        let _span = trace_span!("Context::draw").entered();

        if instances == 0 || mesh.elements.is_empty() {
            return;
        }

        let workers = self.pool.workers();
        if self.scratch.len() != workers {
            self.scratch.clear();
            self.scratch
                .extend(std::iter::repeat_with(SyncCell::default).take(workers));
        }
        for bin in &mut self.scratch {
            bin.get_mut().clear();
        }

        let shader = self.shaders.get(shader.0).expect("invalid shader handle");
        let framebuffer = self
            .framebuffers
            .get(target.0)
            .expect("invalid framebuffer handle");

        if let Err(err) = framebuffer.validate() {
            debug_assert!(false, "draw into incomplete framebuffer: {}", err);
            tracing::error!("draw skipped: {}", err);
            return;
        }

        let vao = self
            .vertex_arrays
            .get(mesh.vao.0)
            .expect("invalid vertex array handle");
        let vbo = vao
            .vertex_buffer()
            .map(|id| {
                self.vertex_buffers
                    .get(id.0)
                    .expect("invalid vertex buffer handle")
            })
            .expect("draw with no vertex buffer bound");
        let ibo = mesh.mode.is_indexed().then(|| {
            let id = vao
                .index_buffer()
                .expect("indexed draw with no index buffer bound");
            self.index_buffers
                .get(id.0)
                .expect("invalid index buffer handle")
        });
        let ubo = match shader.uniform {
            Some(id) => self
                .uniform_buffers
                .get(id.0)
                .expect("invalid uniform buffer handle"),
            None => &self.fallback_ubo,
        };

        let state = shader.apply_overrides(&self.state);
        let targets = FrameTargets::new(framebuffer);
        debug_assert!(shader.fragment.num_outputs <= targets.color.len());

        let viewport = DrawBounds::viewport_rect(state.viewport(), targets.width, targets.height);
        let bounds = DrawBounds::new(
            state.viewport(),
            state.scissor(),
            targets.width,
            targets.height,
        );

        let vertex_job = vertex::VertexJob {
            vao,
            vbo,
            ibo,
            ubo,
            shader: &shader.vertex,
            mode: mesh.mode,
            elements: mesh.elements.clone(),
            instances: instances as u32,
            cull: state.cull_mode(),
            viewport,
            target_height: u32::from(targets.height),
        };

        let scratch = &self.scratch;

        {
            let _span = trace_span!("vertex_phase").entered();
            self.pool.dispatch(|invocation| {
                // SAFETY: Every worker mutates only the bin at its own
                // index.
                let bin = unsafe { scratch[invocation.worker].as_mut() };
                vertex::process(&vertex_job, bin, invocation);
            });
        }

        let fragment_job = raster::FragmentJob {
            targets: &targets,
            ubo,
            shader: &shader.fragment,
            depth_test: state.depth_test(),
            depth_write: state.depth_mask() == DepthMask::On && targets.depth.is_some(),
            blend: state.blend_mode(),
            bounds,
        };

        {
            let _span = trace_span!("fragment_phase").entered();
            self.pool.dispatch(|invocation| {
                // SAFETY: The vertex dispatch has completed (dispatch is a
                // barrier); all bins are read-only from here on.
                let bins: Vec<&WorkerBin> =
                    scratch.iter().map(|cell| unsafe { cell.as_ref() }).collect();
                raster::process(&fragment_job, &bins, invocation);
            });
        }
    }

    // Blitting

    /// Rescales the whole of `src` onto the whole of `dst`.
    pub fn blit_texture(&mut self, dst: TextureId, src: TextureId) {
        let (src_rect, dst_rect) = {
            let src = self.texture(src);
            let dst = self.texture(dst);
            (BlitRect::full(src), BlitRect::full(dst))
        };
        self.blit_texture_rects(dst, src, rect_of(src_rect), rect_of(dst_rect));
    }

    /// Rescales a source rectangle of `src` onto a destination rectangle
    /// of `dst`. Rectangles are `(x, y, w, h)` in texels.
    pub fn blit_texture_rects(
        &mut self,
        dst: TextureId,
        src: TextureId,
        src_rect: Rect,
        dst_rect: Rect,
    ) {
        let _span = trace_span!("Context::blit").entered();

        let [dst, src] = self
            .textures
            .get_disjoint_mut([dst.0, src.0])
            .expect("blit requires two distinct live textures");

        blit::texture_to_texture(
            &self.pool,
            src,
            dst,
            blit_rect(src_rect),
            blit_rect(dst_rect),
        );
    }

    /// Rescales the whole of `src` onto the whole surface.
    pub fn blit_surface(&mut self, surface: &mut dyn PresentableSurface, src: TextureId) {
        let src_rect = rect_of(BlitRect::full(self.texture(src)));
        let dst_rect = [0, 0, surface.width(), surface.height()];
        self.blit_surface_rects(surface, src, src_rect, dst_rect);
    }

    /// Rescales a source rectangle of `src` onto a destination rectangle
    /// of the surface, converting to BGRA8 and flipping vertically.
    pub fn blit_surface_rects(
        &mut self,
        surface: &mut dyn PresentableSurface,
        src: TextureId,
        src_rect: Rect,
        dst_rect: Rect,
    ) {
        let _span = trace_span!("Context::blit").entered();

        let texture = self.textures.get(src.0).expect("invalid texture handle");

        let width = u32::from(surface.width());
        let height = u32::from(surface.height());
        let pixels = surface.pixels_mut();
        debug_assert_eq!(pixels.len(), (width * height) as usize * 4);

        let pixels = SurfacePixels {
            ptr: pixels.as_mut_ptr(),
            width,
            height,
        };

        blit::texture_to_surface(
            &self.pool,
            texture,
            pixels,
            blit_rect(src_rect),
            blit_rect(dst_rect),
        );
    }

    // Clearing

    /// Fills one color attachment with `color`.
    pub fn clear_color_buffer(&mut self, target: FramebufferId, slot: usize, color: DVec4) {
        let _span = trace_span!("Context::clear").entered();

        let framebuffer = self
            .framebuffers
            .get(target.0)
            .expect("invalid framebuffer handle");
        let Some(attachment) = framebuffer.color_attachment(slot) else {
            debug_assert!(false, "clear of an unattached color slot");
            return;
        };

        let view = *attachment.view();
        let pattern = encode_clear_color(view.format(), color);
        clear::clear_view(&self.pool, &view, &pattern);
    }

    /// Fills the depth attachment with `depth`.
    pub fn clear_depth_buffer(&mut self, target: FramebufferId, depth: f64) {
        let _span = trace_span!("Context::clear").entered();

        let framebuffer = self
            .framebuffers
            .get(target.0)
            .expect("invalid framebuffer handle");
        let Some(attachment) = framebuffer.depth_attachment() else {
            debug_assert!(false, "clear of a missing depth attachment");
            return;
        };

        let view = *attachment.view();
        let pattern = encode_clear_color(view.format(), DVec4::splat(depth));
        clear::clear_view(&self.pool, &view, &pattern);
    }

    /// Fills several color attachments and optionally the depth
    /// attachment in one call.
    pub fn clear_framebuffer(
        &mut self,
        target: FramebufferId,
        colors: &[(usize, DVec4)],
        depth: Option<f64>,
    ) {
        for (slot, color) in colors {
            self.clear_color_buffer(target, *slot, *color);
        }

        if let Some(depth) = depth {
            self.clear_depth_buffer(target, depth);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn rect_of(rect: BlitRect) -> Rect {
    [
        rect.x as u16,
        rect.y as u16,
        rect.width as u16,
        rect.height as u16,
    ]
}

fn blit_rect(rect: Rect) -> BlitRect {
    BlitRect {
        x: u32::from(rect[0]),
        y: u32::from(rect[1]),
        width: u32::from(rect[2]),
        height: u32::from(rect[3]),
    }
}
