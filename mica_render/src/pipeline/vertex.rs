//! Vertex phase: shading, primitive assembly, clipping and binning.
//!
//! Primitives are distributed round-robin across workers. Each worker
//! shades its primitives' vertices, clips against the six clip-space
//! planes, applies back-face culling on the projected result and parks
//! the surviving primitives in its own bin for the fragment phase.

use std::ops::Range;

use glam::Vec4;
use mica_tasks::Invocation;

use crate::buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
use crate::mesh::RenderMode;
use crate::shader::{VertexInput, VertexShader, MAX_VARYINGS};
use crate::state::CullMode;
use crate::vertex_array::VertexArray;

use super::{BinnedPrimitive, ScreenVertex, WorkerBin};

/// A triangle clipped against six planes gains at most one vertex per
/// plane.
const MAX_CLIP_VERTICES: usize = 9;

/// Clip-space w below this is treated as degenerate and dropped.
const MIN_W: f32 = 1.0e-9;

/// A shaded vertex before the perspective divide.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ClipVertex {
    pub clip: Vec4,
    pub varyings: [Vec4; MAX_VARYINGS],
}

pub(crate) struct VertexJob<'a> {
    pub vao: &'a VertexArray,
    pub vbo: &'a VertexBuffer,
    pub ibo: Option<&'a IndexBuffer>,
    pub ubo: &'a UniformBuffer,
    pub shader: &'a VertexShader,
    pub mode: RenderMode,
    pub elements: Range<usize>,
    pub instances: u32,
    pub cull: CullMode,
    /// Window-space viewport as `(x, y, w, h)`, already clipped to the
    /// render target.
    pub viewport: (f32, f32, f32, f32),
    pub target_height: u32,
}

/// Runs one worker's share of the vertex phase into its bin.
pub(crate) fn process(job: &VertexJob<'_>, bin: &mut WorkerBin, invocation: Invocation) {
    let stride = job.mode.vertices_per_primitive();
    let primitives = job.elements.len() / stride;

    for instance in 0..job.instances {
        let mut primitive = invocation.worker;
        while primitive < primitives {
            let base = job.elements.start + primitive * stride;
            assemble(job, bin, base, instance);
            primitive += invocation.workers;
        }
    }
}

fn shade_vertex(job: &VertexJob<'_>, element: usize, instance_id: u32) -> ClipVertex {
    let vertex_id = match job.ibo {
        Some(ibo) => ibo.index(element),
        None => element as u32,
    };

    let input = VertexInput {
        vao: job.vao,
        vbo: job.vbo,
        ubo: job.ubo,
        vertex_id,
        instance_id,
    };

    let mut varyings = [Vec4::ZERO; MAX_VARYINGS];
    let clip = (job.shader.shader)(&input, &mut varyings[..job.shader.num_varyings]);

    ClipVertex { clip, varyings }
}

fn assemble(job: &VertexJob<'_>, bin: &mut WorkerBin, base: usize, instance_id: u32) {
    match job.mode {
        RenderMode::Points | RenderMode::IndexedPoints => {
            let vertex = shade_vertex(job, base, instance_id);
            emit_point(job, bin, vertex);
        }
        RenderMode::Lines | RenderMode::IndexedLines => {
            let a = shade_vertex(job, base, instance_id);
            let b = shade_vertex(job, base + 1, instance_id);
            emit_line(job, bin, a, b);
        }
        RenderMode::Triangles | RenderMode::IndexedTriangles => {
            let vertices = [
                shade_vertex(job, base, instance_id),
                shade_vertex(job, base + 1, instance_id),
                shade_vertex(job, base + 2, instance_id),
            ];
            emit_triangle(job, bin, vertices, false);
        }
        RenderMode::TriangleWireframe | RenderMode::IndexedTriangleWireframe => {
            let vertices = [
                shade_vertex(job, base, instance_id),
                shade_vertex(job, base + 1, instance_id),
                shade_vertex(job, base + 2, instance_id),
            ];
            emit_triangle(job, bin, vertices, true);
        }
    }
}

/// Signed distance of a clip-space point to one frustum plane; inside is
/// non-negative.
#[inline]
fn plane_distance(plane: usize, clip: Vec4) -> f32 {
    match plane {
        0 => clip.w + clip.x,
        1 => clip.w - clip.x,
        2 => clip.w + clip.y,
        3 => clip.w - clip.y,
        4 => clip.w + clip.z,
        _ => clip.w - clip.z,
    }
}

fn lerp_vertex(a: &ClipVertex, b: &ClipVertex, t: f32) -> ClipVertex {
    let mut varyings = [Vec4::ZERO; MAX_VARYINGS];
    for ((out, a), b) in varyings.iter_mut().zip(&a.varyings).zip(&b.varyings) {
        *out = a.lerp(*b, t);
    }

    ClipVertex {
        clip: a.clip.lerp(b.clip, t),
        varyings,
    }
}

#[derive(Copy, Clone)]
struct ClipPoly {
    vertices: [ClipVertex; MAX_CLIP_VERTICES],
    len: usize,
}

impl ClipPoly {
    fn push(&mut self, vertex: ClipVertex) {
        self.vertices[self.len] = vertex;
        self.len += 1;
    }
}

/// Sutherland–Hodgman clip of a triangle against the canonical cube.
///
/// A fully inside triangle comes back unchanged; a fully outside one
/// comes back empty.
fn clip_triangle(vertices: [ClipVertex; 3]) -> ClipPoly {
    let empty = ClipPoly {
        vertices: [vertices[0]; MAX_CLIP_VERTICES],
        len: 0,
    };

    let mut current = empty;
    for vertex in vertices {
        current.push(vertex);
    }

    for plane in 0..6 {
        if current.len == 0 {
            break;
        }

        let mut next = empty;
        for index in 0..current.len {
            let a = current.vertices[index];
            let b = current.vertices[(index + 1) % current.len];

            let da = plane_distance(plane, a.clip);
            let db = plane_distance(plane, b.clip);

            if da >= 0.0 {
                next.push(a);
            }
            if (da >= 0.0) != (db >= 0.0) {
                next.push(lerp_vertex(&a, &b, da / (da - db)));
            }
        }

        current = next;
    }

    current
}

/// Parametric clip of a line segment against the canonical cube.
fn clip_line(a: ClipVertex, b: ClipVertex) -> Option<(ClipVertex, ClipVertex)> {
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;

    for plane in 0..6 {
        let da = plane_distance(plane, a.clip);
        let db = plane_distance(plane, b.clip);

        if da < 0.0 && db < 0.0 {
            return None;
        }

        if da < 0.0 {
            t0 = t0.max(da / (da - db));
        } else if db < 0.0 {
            t1 = t1.min(da / (da - db));
        }
    }

    if t0 > t1 {
        return None;
    }

    Some((lerp_vertex(&a, &b, t0), lerp_vertex(&a, &b, t1)))
}

/// Perspective divide and viewport mapping. `None` for degenerate w.
fn to_screen(job: &VertexJob<'_>, vertex: &ClipVertex) -> Option<ScreenVertex> {
    if vertex.clip.w < MIN_W {
        return None;
    }

    let inv_w = 1.0 / vertex.clip.w;
    let ndc = vertex.clip.truncate() * inv_w;

    let (vx, vy, vw, vh) = job.viewport;
    let x = (ndc.x * 0.5 + 0.5) * vw + vx;
    let y = (ndc.y * 0.5 + 0.5) * vh + vy;

    Some(ScreenVertex {
        position: Vec4::new(x, y, ndc.z, inv_w),
        varyings: vertex.varyings,
    })
}

/// Twice the signed area of a screen-space triangle.
#[inline]
fn signed_area(a: &ScreenVertex, b: &ScreenVertex, c: &ScreenVertex) -> f32 {
    let ab = b.position.truncate().truncate() - a.position.truncate().truncate();
    let ac = c.position.truncate().truncate() - a.position.truncate().truncate();
    ab.x * ac.y - ab.y * ac.x
}

fn culled(cull: CullMode, area: f32) -> bool {
    match cull {
        CullMode::Front => area > 0.0,
        CullMode::Back => area < 0.0,
        CullMode::Off => false,
    }
}

/// Raster rows a y-range may touch, clamped to the target.
fn cover_rows(y_min: f32, y_max: f32, target_height: u32) -> Range<u32> {
    let begin = (y_min.floor().max(0.0) as u32).min(target_height);
    let end = (y_max.ceil().max(0.0) as u32).min(target_height);
    begin..end.max(begin)
}

fn emit_point(job: &VertexJob<'_>, bin: &mut WorkerBin, vertex: ClipVertex) {
    for plane in 0..6 {
        if plane_distance(plane, vertex.clip) < 0.0 {
            return;
        }
    }

    let Some(vertex) = to_screen(job, &vertex) else {
        return;
    };

    if vertex.position.y < 0.0 || vertex.position.y as u32 >= job.target_height {
        return;
    }

    bin.primitives.push(BinnedPrimitive::Point { vertex });
}

fn emit_line(job: &VertexJob<'_>, bin: &mut WorkerBin, a: ClipVertex, b: ClipVertex) {
    let Some((a, b)) = clip_line(a, b) else {
        return;
    };
    let (Some(a), Some(b)) = (to_screen(job, &a), to_screen(job, &b)) else {
        return;
    };

    let rows = cover_rows(
        a.position.y.min(b.position.y),
        a.position.y.max(b.position.y),
        job.target_height,
    );
    if rows.is_empty() {
        return;
    }

    bin.primitives.push(BinnedPrimitive::Line {
        vertices: [a, b],
        rows,
    });
}

fn emit_triangle(
    job: &VertexJob<'_>,
    bin: &mut WorkerBin,
    vertices: [ClipVertex; 3],
    wireframe: bool,
) {
    let poly = clip_triangle(vertices);
    if poly.len < 3 {
        return;
    }

    let mut screen = [ScreenVertex {
        position: Vec4::ZERO,
        varyings: [Vec4::ZERO; MAX_VARYINGS],
    }; MAX_CLIP_VERTICES];

    for index in 0..poly.len {
        match to_screen(job, &poly.vertices[index]) {
            Some(vertex) => screen[index] = vertex,
            None => return,
        }
    }

    let area = signed_area(&screen[0], &screen[1], &screen[2]);
    if culled(job.cull, area) {
        return;
    }

    if wireframe {
        // The border of the clipped polygon is the visible part of the
        // triangle's wireframe.
        for index in 0..poly.len {
            let a = screen[index];
            let b = screen[(index + 1) % poly.len];

            let rows = cover_rows(
                a.position.y.min(b.position.y),
                a.position.y.max(b.position.y),
                job.target_height,
            );
            if rows.is_empty() {
                continue;
            }

            bin.primitives.push(BinnedPrimitive::Line {
                vertices: [a, b],
                rows,
            });
        }
        return;
    }

    // Fan-triangulate the clipped polygon.
    for index in 1..poly.len - 1 {
        let triangle = [screen[0], screen[index], screen[index + 1]];

        let y_min = triangle
            .iter()
            .map(|vertex| vertex.position.y)
            .fold(f32::INFINITY, f32::min);
        let y_max = triangle
            .iter()
            .map(|vertex| vertex.position.y)
            .fold(f32::NEG_INFINITY, f32::max);

        let rows = cover_rows(y_min, y_max, job.target_height);
        if rows.is_empty() {
            continue;
        }

        bin.primitives.push(BinnedPrimitive::Triangle {
            vertices: triangle,
            rows,
        });
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use crate::shader::MAX_VARYINGS;

    use super::{clip_line, clip_triangle, ClipVertex};

    fn vertex(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
        ClipVertex {
            clip: Vec4::new(x, y, z, w),
            varyings: [Vec4::ZERO; MAX_VARYINGS],
        }
    }

    #[test]
    fn fully_inside_triangle_is_untouched() {
        let input = [
            vertex(-0.5, -0.5, 0.0, 1.0),
            vertex(0.5, -0.5, 0.0, 1.0),
            vertex(0.0, 0.5, 0.0, 1.0),
        ];

        let poly = clip_triangle(input);
        assert_eq!(poly.len, 3);
        for (clipped, original) in poly.vertices.iter().zip(&input) {
            assert_eq!(clipped.clip, original.clip);
        }
    }

    #[test]
    fn boundary_triangle_is_untouched() {
        // Touching the canonical cube exactly still counts as inside.
        let input = [
            vertex(-1.0, -1.0, -1.0, 1.0),
            vertex(1.0, -1.0, 0.0, 1.0),
            vertex(0.0, 1.0, 1.0, 1.0),
        ];

        let poly = clip_triangle(input);
        assert_eq!(poly.len, 3);
        for (clipped, original) in poly.vertices.iter().zip(&input) {
            assert_eq!(clipped.clip, original.clip);
        }
    }

    #[test]
    fn fully_outside_triangle_is_dropped() {
        let poly = clip_triangle([
            vertex(2.0, 0.0, 0.0, 1.0),
            vertex(3.0, 0.0, 0.0, 1.0),
            vertex(2.5, 1.0, 0.0, 1.0),
        ]);
        assert_eq!(poly.len, 0);
    }

    #[test]
    fn straddling_triangle_gains_vertices() {
        // One vertex pokes out the +x plane; the clip cuts the corner.
        let poly = clip_triangle([
            vertex(0.0, -0.5, 0.0, 1.0),
            vertex(2.0, 0.0, 0.0, 1.0),
            vertex(0.0, 0.5, 0.0, 1.0),
        ]);
        assert_eq!(poly.len, 4);

        for index in 0..poly.len {
            let clip = poly.vertices[index].clip;
            assert!(clip.x <= clip.w + 1.0e-6);
        }
    }

    #[test]
    fn clip_interpolates_varyings_along_the_edge() {
        let mut a = vertex(0.0, 0.0, 0.0, 1.0);
        let mut b = vertex(2.0, 0.0, 0.0, 1.0);
        a.varyings[0] = Vec4::splat(0.0);
        b.varyings[0] = Vec4::splat(1.0);

        let (_, exit) = clip_line(a, b).unwrap();
        // The segment leaves the cube at x = w, halfway along.
        assert!((exit.clip.x - 1.0).abs() < 1.0e-6);
        assert!((exit.varyings[0].x - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn line_outside_is_dropped() {
        assert!(clip_line(
            vertex(-3.0, 2.0, 0.0, 1.0),
            vertex(3.0, 2.0, 0.0, 1.0),
        )
        .is_none());
    }
}
