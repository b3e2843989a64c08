//! End-to-end draws through the full pipeline.

use glam::{DVec4, Vec4};
use mica_render::buffer::IndexFormat;
use mica_render::color::{Color, ColorFormat, ColorRgba};
use mica_render::context::{Context, FramebufferId, ShaderId, TextureId, VertexArrayId};
use mica_render::mesh::{Mesh, RenderMode};
use mica_render::sampler;
use mica_render::shader::{FragmentInput, FragmentShader, VertexInput, VertexShader};
use mica_render::state::{BlendMode, CullMode, DepthMask, DepthTest};
use mica_render::surface::PresentableSurface;
use mica_render::texture::{TexelOrder, WrapMode};
use mica_render::vertex_array::AttribKind;

const CLEAR: DVec4 = DVec4::new(0.0, 0.0, 0.0, 0.0);

/// In-memory BGRA8 window stand-in.
struct TestSurface {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
    presented: usize,
}

impl TestSurface {
    fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; usize::from(width) * usize::from(height) * 4],
            presented: 0,
        }
    }

    fn pixel(&self, x: u16, y: u16) -> [u8; 4] {
        let offset = (usize::from(y) * usize::from(self.width) + usize::from(x)) * 4;
        self.pixels[offset..offset + 4].try_into().unwrap()
    }
}

impl PresentableSurface for TestSurface {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn present(&mut self) {
        self.presented += 1;
    }
}

/// Reads attribute 0 as x/y/z and passes it through to clip space.
fn passthrough_vertex(input: &VertexInput<'_>, _varyings: &mut [Vec4]) -> Vec4 {
    let position: [f32; 3] = input.vbo.element(input.vao.offset(0, input.vertex_id));
    Vec4::new(position[0], position[1], position[2], 1.0)
}

/// As above, shifted right by 0.5 NDC per instance.
fn instanced_vertex(input: &VertexInput<'_>, _varyings: &mut [Vec4]) -> Vec4 {
    let position: [f32; 3] = input.vbo.element(input.vao.offset(0, input.vertex_id));
    let shift = input.instance_id as f32 * 0.5;
    Vec4::new(position[0] + shift, position[1], position[2], 1.0)
}

/// Emits the uniform color at offset 0.
fn uniform_color_fragment(input: &FragmentInput<'_>, outputs: &mut [Vec4]) -> bool {
    outputs[0] = input.ubo.get(0);
    true
}

/// Writes a distinct solid color to each of three attachments.
fn mrt_fragment(_input: &FragmentInput<'_>, outputs: &mut [Vec4]) -> bool {
    outputs[0] = Vec4::new(1.0, 0.0, 0.0, 1.0);
    outputs[1] = Vec4::new(0.0, 1.0, 0.0, 1.0);
    outputs[2] = Vec4::new(0.0, 0.0, 1.0, 1.0);
    true
}

/// Discards the left half of the target.
fn discard_left_fragment(input: &FragmentInput<'_>, outputs: &mut [Vec4]) -> bool {
    outputs[0] = input.ubo.get(0);
    input.coord.x >= 2
}

struct Rig {
    ctx: Context,
    vao: VertexArrayId,
}

impl Rig {
    /// A context with `vertices` uploaded as vec3 positions in a bound
    /// vertex array.
    fn new(vertices: &[[f32; 3]]) -> Self {
        let mut ctx = Context::with_threads(3);

        let vbo = ctx
            .create_vertex_buffer(std::mem::size_of_val(vertices))
            .unwrap();
        ctx.vertex_buffer_mut(vbo)
            .assign(bytemuck::cast_slice(vertices), 0)
            .unwrap();

        let vao = ctx.create_vertex_array();
        {
            let vao = ctx.vertex_array_mut(vao);
            vao.set_vertex_buffer(vbo);
            vao.set_num_bindings(1).unwrap();
            vao.set_binding(0, 0, 12, 3, AttribKind::F32).unwrap();
        }

        Self { ctx, vao }
    }

    fn color_target(&mut self, width: u16, height: u16) -> (FramebufferId, TextureId) {
        let texture = self
            .ctx
            .create_texture(ColorFormat::Rgba8Unorm, width, height, 1, TexelOrder::Linear)
            .unwrap();
        let fbo = self.ctx.create_framebuffer();
        self.ctx
            .framebuffer_mut(fbo)
            .reserve_color_buffers(1)
            .unwrap();
        self.ctx.attach_color_buffer(fbo, 0, texture).unwrap();
        self.ctx.clear_color_buffer(fbo, 0, CLEAR);
        (fbo, texture)
    }

    fn depth_target(&mut self, fbo: FramebufferId, width: u16, height: u16) -> TextureId {
        let depth = self
            .ctx
            .create_texture(ColorFormat::R32Float, width, height, 1, TexelOrder::Linear)
            .unwrap();
        self.ctx.attach_depth_buffer(fbo, depth).unwrap();
        self.ctx.clear_depth_buffer(fbo, 1.0);
        depth
    }

    /// A program with a passthrough vertex stage and a uniform-fed solid
    /// fragment stage.
    fn solid_shader(
        &mut self,
        color: Vec4,
        depth_test: DepthTest,
        blend: BlendMode,
    ) -> ShaderId {
        let ubo = self.ctx.create_uniform_buffer();
        self.ctx.uniform_buffer_mut(ubo).set(0, color);

        self.ctx
            .create_shader(
                VertexShader {
                    shader: passthrough_vertex,
                    num_varyings: 0,
                    cull_mode: Some(CullMode::Off),
                },
                FragmentShader {
                    shader: uniform_color_fragment,
                    num_varyings: 0,
                    num_outputs: 1,
                    blend_mode: Some(blend),
                    depth_test: Some(depth_test),
                    depth_mask: None,
                },
                Some(ubo),
            )
            .unwrap()
    }

    fn pixel(&self, texture: TextureId, x: u32, y: u32) -> ColorRgba<u8> {
        self.ctx.texture(texture).texel(x, y, 0)
    }
}

/// Independent half-open coverage test at a pixel center: a center
/// exactly on an edge counts only for top and left edges, so triangle
/// sets that merely share edges claim every center exactly once.
fn reference_coverage(triangle: [[f32; 2]; 3], x: u32, y: u32) -> bool {
    let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);

    let mut triangle = triangle;
    let orient = (triangle[1][0] - triangle[0][0]) * (triangle[2][1] - triangle[0][1])
        - (triangle[1][1] - triangle[0][1]) * (triangle[2][0] - triangle[0][0]);
    if orient < 0.0 {
        triangle.swap(1, 2);
    }

    let edges = [
        (triangle[1], triangle[2]),
        (triangle[2], triangle[0]),
        (triangle[0], triangle[1]),
    ];

    edges.into_iter().all(|(a, b)| {
        let w = (b[0] - a[0]) * (py - a[1]) - (b[1] - a[1]) * (px - a[0]);
        let top_left = b[1] < a[1] || (b[1] == a[1] && b[0] > a[0]);
        w > 0.0 || (w == 0.0 && top_left)
    })
}

#[test]
fn single_opaque_triangle() {
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [0.0, 1.0, 0.0]]);
    let (fbo, texture) = rig.color_target(4, 4);
    let shader = rig.solid_shader(
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        DepthTest::Off,
        BlendMode::Off,
    );

    let mesh = Mesh::new(rig.vao, 0..3, RenderMode::Triangles);
    rig.ctx.draw(&mesh, shader, fbo);

    // The triangle in window space, after viewport mapping.
    let screen = [[0.0f32, 0.0], [4.0, 0.0], [2.0, 4.0]];

    let mut covered = 0;
    for y in 0..4 {
        for x in 0..4 {
            let expected = if reference_coverage(screen, x, y) {
                covered += 1;
                Color([255, 0, 0, 255])
            } else {
                Color([0, 0, 0, 0])
            };
            assert_eq!(rig.pixel(texture, x, y), expected, "at ({}, {})", x, y);
        }
    }
    assert!(covered > 0);
}

#[test]
fn shared_edge_pixels_are_written_once() {
    // A quad split along its diagonal: the four pixel centers on the
    // diagonal lie exactly on both triangles' shared edge. Additive
    // blending doubles anywhere a pixel is shaded twice.
    let mut rig = Rig::new(&[
        [-1.0, -1.0, 0.0],
        [1.0, -1.0, 0.0],
        [1.0, 1.0, 0.0],
        [-1.0, -1.0, 0.0],
        [1.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0],
    ]);
    let (fbo, texture) = rig.color_target(4, 4);
    let shader = rig.solid_shader(
        Vec4::new(0.25, 0.25, 0.25, 1.0),
        DepthTest::Off,
        BlendMode::Additive,
    );

    let mesh = Mesh::new(rig.vao, 0..6, RenderMode::Triangles);
    rig.ctx.draw(&mesh, shader, fbo);

    // Every center is inside the quad, so every pixel holds exactly one
    // accumulation of the draw color; a doubled diagonal would read
    // ~128 instead.
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(
                rig.pixel(texture, x, y),
                Color([64, 64, 64, 255]),
                "at ({}, {})",
                x,
                y
            );
        }
    }
}

#[test]
fn depth_less_equal_keeps_the_nearer_triangle() {
    // Full-screen triangles at two depths; vertex order in the buffer is
    // green (z = 0.8) first, red (z = 0.2) second.
    let mut rig = Rig::new(&[
        [-1.0, -1.0, 0.8],
        [3.0, -1.0, 0.8],
        [-1.0, 3.0, 0.8],
        [-1.0, -1.0, 0.2],
        [3.0, -1.0, 0.2],
        [-1.0, 3.0, 0.2],
    ]);
    let (fbo, texture) = rig.color_target(4, 4);
    rig.depth_target(fbo, 4, 4);

    let green = rig.solid_shader(
        Vec4::new(0.0, 1.0, 0.0, 1.0),
        DepthTest::LessEqual,
        BlendMode::Off,
    );
    let red = rig.solid_shader(
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        DepthTest::LessEqual,
        BlendMode::Off,
    );

    // Far-then-near: the near draw wins the test.
    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), green, fbo);
    rig.ctx
        .draw(&Mesh::new(rig.vao, 3..6, RenderMode::Triangles), red, fbo);
    assert_eq!(rig.pixel(texture, 2, 2), Color([255, 0, 0, 255]));

    // Near-then-far: the far draw fails the test, red stays.
    let (fbo2, texture2) = rig.color_target(4, 4);
    rig.depth_target(fbo2, 4, 4);
    rig.ctx
        .draw(&Mesh::new(rig.vao, 3..6, RenderMode::Triangles), red, fbo2);
    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), green, fbo2);
    assert_eq!(rig.pixel(texture2, 2, 2), Color([255, 0, 0, 255]));
}

#[test]
fn depth_off_passes_every_fragment() {
    let mut rig = Rig::new(&[
        [-1.0, -1.0, 0.8],
        [3.0, -1.0, 0.8],
        [-1.0, 3.0, 0.8],
        [-1.0, -1.0, 0.2],
        [3.0, -1.0, 0.2],
        [-1.0, 3.0, 0.2],
    ]);
    let (fbo, texture) = rig.color_target(4, 4);
    rig.depth_target(fbo, 4, 4);

    let green = rig.solid_shader(
        Vec4::new(0.0, 1.0, 0.0, 1.0),
        DepthTest::Off,
        BlendMode::Off,
    );
    let red = rig.solid_shader(Vec4::new(1.0, 0.0, 0.0, 1.0), DepthTest::Off, BlendMode::Off);

    // With the test off the later draw always lands, even drawing the
    // far triangle over the near one.
    rig.ctx
        .draw(&Mesh::new(rig.vao, 3..6, RenderMode::Triangles), red, fbo);
    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), green, fbo);
    assert_eq!(rig.pixel(texture, 1, 1), Color([0, 255, 0, 255]));
}

#[test]
fn bilinear_sampling_through_the_context() {
    let mut ctx = Context::with_threads(2);
    let texture = ctx
        .create_texture(ColorFormat::Rgb8Unorm, 2, 2, 1, TexelOrder::Linear)
        .unwrap();

    {
        let texture = ctx.texture_mut(texture);
        texture.set_wrap_mode(WrapMode::Repeat);
        texture.set_texel(0, 0, 0, Color([255u8, 0, 0]));
        texture.set_texel(1, 0, 0, Color([0u8, 255, 0]));
        texture.set_texel(0, 1, 0, Color([0u8, 0, 255]));
        texture.set_texel(1, 1, 0, Color([255u8, 255, 255]));
    }

    // Halfway between all four texels every channel averages to one half.
    let sample: Color<u8, 3> = sampler::bilinear(ctx.texture(texture), 0.25, 0.25);
    for channel in 0..3 {
        assert!(
            sample[channel].abs_diff(128) <= 1,
            "channel {} of {:?}",
            channel,
            sample
        );
    }

    // REPEAT periodicity holds for the filtered path too.
    let wrapped: Color<u8, 3> = sampler::bilinear(ctx.texture(texture), 1.25, -0.75);
    assert_eq!(sample, wrapped);

    // The texel-boundary sample (0.5, 0.5) scales to texel coordinate
    // (1.0, 1.0): zero fractional weight, so every tap collapses onto
    // texel (1, 1).
    let boundary: Color<u8, 3> = sampler::bilinear(ctx.texture(texture), 0.5, 0.5);
    assert_eq!(boundary, Color([255, 255, 255]));
}

#[test]
fn blit_rescales_converts_and_flips() {
    let mut ctx = Context::with_threads(2);
    let texture = ctx
        .create_texture(ColorFormat::Rgba8Unorm, 2, 2, 1, TexelOrder::Linear)
        .unwrap();

    {
        let texture = ctx.texture_mut(texture);
        texture.set_texel(0, 0, 0, Color([255u8, 0, 0, 255]));
        texture.set_texel(1, 0, 0, Color([0u8, 255, 0, 255]));
        texture.set_texel(0, 1, 0, Color([0u8, 0, 255, 255]));
        texture.set_texel(1, 1, 0, Color([255u8, 255, 255, 255]));
    }

    let mut surface = TestSurface::new(4, 4);
    ctx.blit_surface(&mut surface, texture);
    surface.present();
    assert_eq!(surface.presented, 1);

    // BGRA bytes per source texel.
    let red = [0, 0, 255, 255];
    let green = [0, 255, 0, 255];
    let blue = [255, 0, 0, 255];
    let white = [255, 255, 255, 255];

    // Top-to-bottom after the vertical flip: bottom source row first.
    for x in 0..4u16 {
        for y in 0..2u16 {
            let expected = if x < 2 { blue } else { white };
            assert_eq!(surface.pixel(x, y), expected, "at ({}, {})", x, y);

            let expected = if x < 2 { red } else { green };
            assert_eq!(surface.pixel(x, y + 2), expected, "at ({}, {})", x, y + 2);
        }
    }
}

#[test]
fn texture_blit_does_not_flip() {
    let mut ctx = Context::with_threads(2);
    let src = ctx
        .create_texture(ColorFormat::Rgba8Unorm, 2, 2, 1, TexelOrder::Linear)
        .unwrap();
    let dst = ctx
        .create_texture(ColorFormat::Rgba8Unorm, 4, 4, 1, TexelOrder::Linear)
        .unwrap();

    ctx.texture_mut(src).set_texel(0, 0, 0, Color([10u8, 20, 30, 255]));
    ctx.texture_mut(src).set_texel(1, 1, 0, Color([40u8, 50, 60, 255]));

    ctx.blit_texture(dst, src);

    // Source (0, 0) stays in the top-left quadrant.
    assert_eq!(ctx.texture(dst).texel::<u8, 4>(0, 0, 0), Color([10, 20, 30, 255]));
    assert_eq!(ctx.texture(dst).texel::<u8, 4>(1, 1, 0), Color([10, 20, 30, 255]));
    assert_eq!(ctx.texture(dst).texel::<u8, 4>(3, 3, 0), Color([40, 50, 60, 255]));
}

#[test]
fn multi_attachment_clear_and_draw() {
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.5], [3.0, -1.0, 0.5], [-1.0, 3.0, 0.5]]);

    let mut attachments = Vec::new();
    let fbo = rig.ctx.create_framebuffer();
    rig.ctx.framebuffer_mut(fbo).reserve_color_buffers(3).unwrap();
    for slot in 0..3 {
        let texture = rig
            .ctx
            .create_texture(ColorFormat::Rgba8Unorm, 4, 4, 1, TexelOrder::Linear)
            .unwrap();
        rig.ctx.attach_color_buffer(fbo, slot, texture).unwrap();
        attachments.push(texture);
    }
    let depth = rig.depth_target(fbo, 4, 4);

    rig.ctx.clear_framebuffer(
        fbo,
        &[
            (0, DVec4::new(1.0, 0.0, 0.0, 1.0)),
            (1, DVec4::new(0.0, 1.0, 0.0, 1.0)),
            (2, DVec4::new(0.0, 0.0, 1.0, 1.0)),
        ],
        Some(1.0),
    );

    let expected = [
        Color([255u8, 0, 0, 255]),
        Color([0u8, 255, 0, 255]),
        Color([0u8, 0, 255, 255]),
    ];
    for (texture, expected) in attachments.iter().zip(expected) {
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(rig.pixel(*texture, x, y), expected);
            }
        }
    }
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(
                rig.ctx.texture(depth).texel::<f32, 1>(x, y, 0),
                Color([1.0]),
            );
        }
    }

    // A full-screen draw writes all three attachments at once.
    let shader = rig
        .ctx
        .create_shader(
            VertexShader {
                shader: passthrough_vertex,
                num_varyings: 0,
                cull_mode: Some(CullMode::Off),
            },
            FragmentShader {
                shader: mrt_fragment,
                num_varyings: 0,
                num_outputs: 3,
                blend_mode: Some(BlendMode::Off),
                depth_test: Some(DepthTest::Off),
                depth_mask: Some(DepthMask::On),
            },
            None,
        )
        .unwrap();

    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), shader, fbo);

    assert_eq!(rig.pixel(attachments[0], 2, 2), Color([255, 0, 0, 255]));
    assert_eq!(rig.pixel(attachments[1], 2, 2), Color([0, 255, 0, 255]));
    assert_eq!(rig.pixel(attachments[2], 2, 2), Color([0, 0, 255, 255]));
    assert_eq!(rig.ctx.texture(depth).texel::<f32, 1>(2, 2, 0), Color([0.5]));
}

#[test]
fn swizzled_and_linear_sampling_agree() {
    let mut ctx = Context::with_threads(2);

    let mut textures = Vec::new();
    for order in [TexelOrder::Linear, TexelOrder::Swizzled] {
        let id = ctx
            .create_texture(ColorFormat::Rgba8Unorm, 16, 16, 1, order)
            .unwrap();
        for y in 0..16u32 {
            for x in 0..16u32 {
                ctx.texture_mut(id)
                    .set_texel(x, y, 0, Color([x as u8, y as u8, 0, 255]));
            }
        }
        textures.push(id);
    }

    for y in 0..16u32 {
        for x in 0..16u32 {
            let u = (x as f32 + 0.5) / 16.0;
            let v = (y as f32 + 0.5) / 16.0;

            let linear: Color<u8, 4> = sampler::nearest(ctx.texture(textures[0]), u, v);
            let swizzled: Color<u8, 4> = sampler::nearest(ctx.texture(textures[1]), u, v);

            assert_eq!(linear, swizzled, "at ({}, {})", x, y);
            assert_eq!(linear, Color([x as u8, y as u8, 0, 255]));
        }
    }
}

#[test]
fn discard_suppresses_color_and_depth_writes() {
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.5], [3.0, -1.0, 0.5], [-1.0, 3.0, 0.5]]);
    let (fbo, texture) = rig.color_target(4, 4);
    let depth = rig.depth_target(fbo, 4, 4);

    let ubo = rig.ctx.create_uniform_buffer();
    rig.ctx
        .uniform_buffer_mut(ubo)
        .set(0, Vec4::new(1.0, 1.0, 0.0, 1.0));

    let shader = rig
        .ctx
        .create_shader(
            VertexShader {
                shader: passthrough_vertex,
                num_varyings: 0,
                cull_mode: Some(CullMode::Off),
            },
            FragmentShader {
                shader: discard_left_fragment,
                num_varyings: 0,
                num_outputs: 1,
                blend_mode: Some(BlendMode::Off),
                depth_test: Some(DepthTest::LessEqual),
                depth_mask: Some(DepthMask::On),
            },
            Some(ubo),
        )
        .unwrap();

    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), shader, fbo);

    for y in 0..4 {
        // Discarded fragments left color and depth untouched.
        assert_eq!(rig.pixel(texture, 0, y), Color([0, 0, 0, 0]));
        assert_eq!(rig.ctx.texture(depth).texel::<f32, 1>(0, y, 0), Color([1.0]));

        // Kept fragments wrote both.
        assert_eq!(rig.pixel(texture, 3, y), Color([255, 255, 0, 255]));
        assert_eq!(rig.ctx.texture(depth).texel::<f32, 1>(3, y, 0), Color([0.5]));
    }
}

#[test]
fn alpha_blending_composites_over_the_clear() {
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.0], [3.0, -1.0, 0.0], [-1.0, 3.0, 0.0]]);
    let (fbo, texture) = rig.color_target(4, 4);
    rig.ctx.clear_color_buffer(fbo, 0, DVec4::new(0.0, 0.0, 1.0, 1.0));

    let shader = rig.solid_shader(
        Vec4::new(1.0, 0.0, 0.0, 0.5),
        DepthTest::Off,
        BlendMode::Alpha,
    );
    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), shader, fbo);

    let pixel = rig.pixel(texture, 2, 2);
    assert!(pixel[0].abs_diff(128) <= 1, "{:?}", pixel);
    assert_eq!(pixel[1], 0);
    assert!(pixel[2].abs_diff(128) <= 1, "{:?}", pixel);
}

#[test]
fn scissor_limits_the_write_area() {
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.0], [3.0, -1.0, 0.0], [-1.0, 3.0, 0.0]]);
    let (fbo, texture) = rig.color_target(8, 8);
    let shader = rig.solid_shader(
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        DepthTest::Off,
        BlendMode::Off,
    );

    rig.ctx.set_scissor(2, 2, 3, 3);
    rig.ctx
        .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), shader, fbo);
    rig.ctx.set_scissor(0, 0, u16::MAX, u16::MAX);

    for y in 0..8 {
        for x in 0..8 {
            let inside = (2..5).contains(&x) && (2..5).contains(&y);
            let expected = if inside {
                Color([255, 0, 0, 255])
            } else {
                Color([0, 0, 0, 0])
            };
            assert_eq!(rig.pixel(texture, x, y), expected, "at ({}, {})", x, y);
        }
    }
}

#[test]
fn indexed_and_instanced_draws() {
    // A small triangle on the left half; instances shift it right.
    let mut rig = Rig::new(&[
        [-1.0, -1.0, 0.0],
        [-0.5, -1.0, 0.0],
        [-1.0, 1.0, 0.0],
    ]);
    let (fbo, texture) = rig.color_target(8, 4);

    let indices: [u16; 3] = [0, 1, 2];
    let ibo = rig
        .ctx
        .create_index_buffer(3, IndexFormat::U16, Some(bytemuck::cast_slice(&indices)))
        .unwrap();
    rig.ctx.vertex_array_mut(rig.vao).set_index_buffer(ibo);

    let ubo = rig.ctx.create_uniform_buffer();
    rig.ctx
        .uniform_buffer_mut(ubo)
        .set(0, Vec4::new(1.0, 1.0, 1.0, 1.0));

    let shader = rig
        .ctx
        .create_shader(
            VertexShader {
                shader: instanced_vertex,
                num_varyings: 0,
                cull_mode: Some(CullMode::Off),
            },
            FragmentShader {
                shader: uniform_color_fragment,
                num_varyings: 0,
                num_outputs: 1,
                blend_mode: Some(BlendMode::Off),
                depth_test: Some(DepthTest::Off),
                depth_mask: None,
            },
            Some(ubo),
        )
        .unwrap();

    let mesh = Mesh::new(rig.vao, 0..3, RenderMode::IndexedTriangles);
    rig.ctx.draw_instanced(&mesh, 4, shader, fbo);

    // Each instance lands two NDC-units-of-0.5 apart: one pixel column
    // pair per instance at this target size.
    let white = Color([255, 255, 255, 255]);
    assert_eq!(rig.pixel(texture, 0, 0), white);
    assert_eq!(rig.pixel(texture, 2, 0), white);
    assert_eq!(rig.pixel(texture, 4, 0), white);
    assert_eq!(rig.pixel(texture, 6, 0), white);
}

#[test]
fn wireframe_draws_edges_only() {
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, 1.0, 0.0]]);
    let (fbo, texture) = rig.color_target(8, 8);
    let shader = rig.solid_shader(
        Vec4::new(1.0, 1.0, 1.0, 1.0),
        DepthTest::Off,
        BlendMode::Off,
    );

    let mesh = Mesh::new(rig.vao, 0..3, RenderMode::TriangleWireframe);
    rig.ctx.draw(&mesh, shader, fbo);

    // Corner pixels along the two axis-aligned edges are covered.
    assert_eq!(rig.pixel(texture, 0, 0), Color([255, 255, 255, 255]));
    assert_eq!(rig.pixel(texture, 4, 0), Color([255, 255, 255, 255]));
    assert_eq!(rig.pixel(texture, 0, 4), Color([255, 255, 255, 255]));

    // The interior stays clear.
    assert_eq!(rig.pixel(texture, 2, 2), Color([0, 0, 0, 0]));
}

#[test]
fn points_render_single_pixels() {
    let mut rig = Rig::new(&[[-0.75, -0.75, 0.0], [0.25, 0.25, 0.0]]);
    let (fbo, texture) = rig.color_target(8, 8);
    let shader = rig.solid_shader(
        Vec4::new(0.0, 1.0, 1.0, 1.0),
        DepthTest::Off,
        BlendMode::Off,
    );

    let mesh = Mesh::new(rig.vao, 0..2, RenderMode::Points);
    rig.ctx.draw(&mesh, shader, fbo);

    let lit = Color([0u8, 255, 255, 255]);
    assert_eq!(rig.pixel(texture, 1, 1), lit);
    assert_eq!(rig.pixel(texture, 5, 5), lit);

    let mut total = 0;
    for y in 0..8 {
        for x in 0..8 {
            if rig.pixel(texture, x, y) == lit {
                total += 1;
            }
        }
    }
    assert_eq!(total, 2);
}

#[test]
fn cull_mode_rejects_by_winding() {
    // Counter-clockwise in NDC; positive area after viewport mapping.
    let mut rig = Rig::new(&[[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [0.0, 1.0, 0.0]]);
    let (fbo, texture) = rig.color_target(4, 4);

    for (cull, visible) in [
        (CullMode::Off, true),
        (CullMode::Back, true),
        (CullMode::Front, false),
    ] {
        rig.ctx.clear_color_buffer(fbo, 0, CLEAR);

        let ubo = rig.ctx.create_uniform_buffer();
        rig.ctx
            .uniform_buffer_mut(ubo)
            .set(0, Vec4::new(1.0, 0.0, 1.0, 1.0));
        let shader = rig
            .ctx
            .create_shader(
                VertexShader {
                    shader: passthrough_vertex,
                    num_varyings: 0,
                    cull_mode: Some(cull),
                },
                FragmentShader {
                    shader: uniform_color_fragment,
                    num_varyings: 0,
                    num_outputs: 1,
                    blend_mode: Some(BlendMode::Off),
                    depth_test: Some(DepthTest::Off),
                    depth_mask: None,
                },
                Some(ubo),
            )
            .unwrap();

        rig.ctx
            .draw(&Mesh::new(rig.vao, 0..3, RenderMode::Triangles), shader, fbo);

        let lit = rig.pixel(texture, 1, 1) == Color([255, 0, 255, 255]);
        assert_eq!(lit, visible, "cull mode {:?}", cull);
    }
}
