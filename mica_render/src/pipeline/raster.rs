//! Fragment phase: scan conversion, depth, shading, blending and
//! attachment writes.
//!
//! Triangles are rasterized with incremental edge functions evaluated at
//! pixel centers; barycentric weights fall out of the edge values.
//! Coverage is half-open: a center exactly on an edge counts only for
//! top and left edges, so triangles meeting along a shared edge never
//! shade the same pixel twice. Varyings interpolate
//! perspective-correctly via `1/w`; depth interpolates linearly in
//! screen space. The depth write is deferred until the fragment shader
//! has decided not to discard.

use glam::Vec4;
use mica_tasks::Invocation;

use crate::buffer::UniformBuffer;
use crate::shader::{FragCoord, FragmentInput, FragmentShader, MAX_FRAGMENT_OUTPUTS, MAX_VARYINGS};
use crate::state::{BlendMode, DepthTest};

use super::{partition, BinnedPrimitive, DrawBounds, FrameTargets, ScreenVertex, WorkerBin};

pub(crate) struct FragmentJob<'a> {
    pub targets: &'a FrameTargets,
    pub ubo: &'a UniformBuffer,
    pub shader: &'a FragmentShader,
    pub depth_test: DepthTest,
    pub depth_write: bool,
    pub blend: BlendMode,
    pub bounds: DrawBounds,
}

/// Rasterizes every binned primitive that overlaps this worker's row
/// band.
pub(crate) fn process(job: &FragmentJob<'_>, bins: &[&WorkerBin], invocation: Invocation) {
    let band = partition(
        job.targets.height as usize,
        invocation.workers,
        invocation.worker,
    );
    let band = band.start as u32..band.end as u32;

    for bin in bins {
        for primitive in &bin.primitives {
            match primitive {
                BinnedPrimitive::Triangle { vertices, rows } => {
                    if rows.start < band.end && band.start < rows.end {
                        raster_triangle(job, vertices, &band);
                    }
                }
                BinnedPrimitive::Line { vertices, rows } => {
                    if rows.start < band.end && band.start < rows.end {
                        raster_line(job, vertices, &band);
                    }
                }
                BinnedPrimitive::Point { vertex } => {
                    raster_point(job, vertex, &band);
                }
            }
        }
    }
}

/// Edge function: twice the signed area of `(a, b, p)`.
#[inline]
fn edge(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

/// Whether `a -> b` is a top or left edge of a positively wound
/// triangle (raster coordinates, y down).
///
/// Pixel centers that land exactly on an edge belong to the triangle
/// only when it is a top or left edge. Two triangles sharing an edge see
/// it with opposite classifications, so a shared-edge center is shaded
/// by exactly one of them.
#[inline]
fn is_top_left(a: Vec4, b: Vec4) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dy < 0.0 || (dy == 0.0 && dx > 0.0)
}

fn raster_triangle(job: &FragmentJob<'_>, vertices: &[ScreenVertex; 3], band: &std::ops::Range<u32>) {
    let mut v0 = vertices[0];
    let mut v1 = vertices[1];
    let mut v2 = vertices[2];

    let area = edge(
        v0.position.x,
        v0.position.y,
        v1.position.x,
        v1.position.y,
        v2.position.x,
        v2.position.y,
    );
    if area == 0.0 {
        return;
    }

    // Normalize to positive winding so interior edge values are positive
    // and the top-left classification below is well defined.
    if area < 0.0 {
        std::mem::swap(&mut v1, &mut v2);
    }
    let area = area.abs();
    let inv_area = 1.0 / area;

    let (p0, p1, p2) = (v0.position, v1.position, v2.position);

    // Bounding box, clipped to draw bounds and this worker's band.
    let x_min = p0.x.min(p1.x).min(p2.x).floor().max(job.bounds.x.start as f32) as u32;
    let x_max = (p0.x.max(p1.x).max(p2.x).ceil() as u32).min(job.bounds.x.end);
    let y_min = (p0.y.min(p1.y).min(p2.y).floor().max(job.bounds.y.start as f32) as u32)
        .max(band.start);
    let y_max = (p0.y.max(p1.y).max(p2.y).ceil() as u32)
        .min(job.bounds.y.end)
        .min(band.end);

    if x_min >= x_max || y_min >= y_max {
        return;
    }

    // Premultiplied varyings for perspective-correct interpolation.
    let num_varyings = job.shader.num_varyings;
    let mut vw0 = [Vec4::ZERO; MAX_VARYINGS];
    let mut vw1 = [Vec4::ZERO; MAX_VARYINGS];
    let mut vw2 = [Vec4::ZERO; MAX_VARYINGS];
    for slot in 0..num_varyings {
        vw0[slot] = v0.varyings[slot] * p0.w;
        vw1[slot] = v1.varyings[slot] * p1.w;
        vw2[slot] = v2.varyings[slot] * p2.w;
    }

    // Horizontal steps of the three edge functions. Rows restart from a
    // fresh evaluation so float error never accumulates across rows.
    let step0 = -(p2.y - p1.y);
    let step1 = -(p0.y - p2.y);
    let step2 = -(p1.y - p0.y);

    // Half-open fill rule: exact-zero edge values only count on top and
    // left edges.
    let top_left0 = is_top_left(p1, p2);
    let top_left1 = is_top_left(p2, p0);
    let top_left2 = is_top_left(p0, p1);

    let start_x = x_min as f32 + 0.5;
    let mut varyings = [Vec4::ZERO; MAX_VARYINGS];

    for y in y_min..y_max {
        let py = y as f32 + 0.5;

        let mut w0 = edge(p1.x, p1.y, p2.x, p2.y, start_x, py);
        let mut w1 = edge(p2.x, p2.y, p0.x, p0.y, start_x, py);
        let mut w2 = edge(p0.x, p0.y, p1.x, p1.y, start_x, py);

        for x in x_min..x_max {
            let inside = (w0 > 0.0 || (w0 == 0.0 && top_left0))
                && (w1 > 0.0 || (w1 == 0.0 && top_left1))
                && (w2 > 0.0 || (w2 == 0.0 && top_left2));

            if inside {
                let b0 = w0 * inv_area;
                let b1 = w1 * inv_area;
                let b2 = w2 * inv_area;

                let z = b0 * p0.z + b1 * p1.z + b2 * p2.z;
                let inv_w = b0 * p0.w + b1 * p1.w + b2 * p2.w;
                let w = 1.0 / inv_w;

                for slot in 0..num_varyings {
                    varyings[slot] = (vw0[slot] * b0 + vw1[slot] * b1 + vw2[slot] * b2) * w;
                }

                shade_fragment(job, x, y, z, w, &varyings[..num_varyings]);
            }

            w0 += step0;
            w1 += step1;
            w2 += step2;
        }
    }
}

fn raster_line(job: &FragmentJob<'_>, vertices: &[ScreenVertex; 2], band: &std::ops::Range<u32>) {
    let (a, b) = (&vertices[0], &vertices[1]);

    let dx = b.position.x - a.position.x;
    let dy = b.position.y - a.position.y;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0);

    let num_varyings = job.shader.num_varyings;
    let mut varyings = [Vec4::ZERO; MAX_VARYINGS];
    let mut last = (u32::MAX, u32::MAX);

    let mut step = 0.0f32;
    while step <= steps {
        let t = step / steps;
        step += 1.0;

        let x = a.position.x + dx * t;
        let y = a.position.y + dy * t;
        if x < 0.0 || y < 0.0 {
            continue;
        }

        let (px, py) = (x as u32, y as u32);
        if (px, py) == last {
            continue;
        }
        last = (px, py);

        if !job.bounds.x.contains(&px) || !job.bounds.y.contains(&py) {
            continue;
        }
        if !band.contains(&py) {
            continue;
        }

        let z = a.position.z + (b.position.z - a.position.z) * t;
        let inv_w = a.position.w + (b.position.w - a.position.w) * t;
        let w = 1.0 / inv_w;

        for slot in 0..num_varyings {
            let from = a.varyings[slot] * a.position.w;
            let to = b.varyings[slot] * b.position.w;
            varyings[slot] = from.lerp(to, t) * w;
        }

        shade_fragment(job, px, py, z, w, &varyings[..num_varyings]);
    }
}

fn raster_point(job: &FragmentJob<'_>, vertex: &ScreenVertex, band: &std::ops::Range<u32>) {
    if vertex.position.x < 0.0 || vertex.position.y < 0.0 {
        return;
    }

    let (px, py) = (vertex.position.x as u32, vertex.position.y as u32);
    if !job.bounds.x.contains(&px) || !job.bounds.y.contains(&py) || !band.contains(&py) {
        return;
    }

    let w = 1.0 / vertex.position.w;
    shade_fragment(
        job,
        px,
        py,
        vertex.position.z,
        w,
        &vertex.varyings[..job.shader.num_varyings],
    );
}

/// Depth test, fragment shading, deferred depth write, blend and store
/// for a single pixel.
fn shade_fragment(job: &FragmentJob<'_>, x: u32, y: u32, z: f32, w: f32, varyings: &[Vec4]) {
    if job.depth_test != DepthTest::Off {
        if let Some(depth) = &job.targets.depth {
            // SAFETY: (x, y) lies in this worker's row band.
            if !unsafe { depth.compare(x, y, z, job.depth_test) } {
                return;
            }
        }
    }

    let input = FragmentInput {
        coord: FragCoord {
            x: x as u16,
            y: y as u16,
            z,
            w,
        },
        ubo: job.ubo,
        varyings,
    };

    let mut outputs = [Vec4::ZERO; MAX_FRAGMENT_OUTPUTS];
    if !(job.shader.shader)(&input, &mut outputs[..job.shader.num_outputs]) {
        return;
    }

    // The write happens only after the shader kept the fragment, so a
    // discard leaves the depth buffer untouched.
    if job.depth_write {
        if let Some(depth) = &job.targets.depth {
            // SAFETY: (x, y) lies in this worker's row band.
            unsafe {
                depth.write(x, y, z);
            }
        }
    }

    for (slot, target) in job.targets.color.iter().take(job.shader.num_outputs).enumerate() {
        let src = outputs[slot];

        let color = if job.blend == BlendMode::Off {
            src
        } else {
            // SAFETY: (x, y) lies in this worker's row band.
            let dst = unsafe { (target.load)(&target.view, x, y) };
            blend(job.blend, src, dst)
        };

        // SAFETY: (x, y) lies in this worker's row band.
        unsafe {
            (target.store)(&target.view, x, y, color);
        }
    }
}

fn blend(mode: BlendMode, src: Vec4, dst: Vec4) -> Vec4 {
    match mode {
        BlendMode::Off => src,
        BlendMode::Alpha => src * src.w + dst * (1.0 - src.w),
        BlendMode::PremultipliedAlpha => src + dst * (1.0 - src.w),
        BlendMode::Additive => (src + dst).clamp(Vec4::ZERO, Vec4::ONE),
        BlendMode::Screen => Vec4::ONE - (Vec4::ONE - src) * (Vec4::ONE - dst),
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use crate::state::BlendMode;

    use super::{blend, edge, is_top_left};

    #[test]
    fn blend_alpha_weights_by_source_alpha() {
        let src = Vec4::new(1.0, 0.0, 0.0, 0.5);
        let dst = Vec4::new(0.0, 1.0, 0.0, 1.0);

        let out = blend(BlendMode::Alpha, src, dst);
        assert_eq!(out, Vec4::new(0.5, 0.5, 0.0, 0.75));
    }

    #[test]
    fn blend_premultiplied_adds_the_source() {
        let src = Vec4::new(0.25, 0.0, 0.0, 0.5);
        let dst = Vec4::new(0.5, 0.5, 0.5, 1.0);

        let out = blend(BlendMode::PremultipliedAlpha, src, dst);
        assert_eq!(out, Vec4::new(0.5, 0.25, 0.25, 1.0));
    }

    #[test]
    fn blend_additive_saturates() {
        let src = Vec4::new(0.75, 0.75, 0.0, 1.0);
        let dst = Vec4::new(0.75, 0.0, 0.0, 1.0);

        let out = blend(BlendMode::Additive, src, dst);
        assert_eq!(out, Vec4::new(1.0, 0.75, 0.0, 1.0));
    }

    #[test]
    fn blend_screen_inverts_multiplies_and_inverts() {
        let src = Vec4::new(0.5, 0.0, 1.0, 1.0);
        let dst = Vec4::new(0.5, 0.5, 0.0, 1.0);

        let out = blend(BlendMode::Screen, src, dst);
        assert_eq!(out, Vec4::new(0.75, 0.5, 1.0, 1.0));
    }

    #[test]
    fn edge_function_sign_splits_the_plane() {
        // Edge from (0, 0) to (4, 0): positive above, negative below (in
        // raster coordinates, "above" is +y).
        assert!(edge(0.0, 0.0, 4.0, 0.0, 2.0, 1.0) > 0.0);
        assert!(edge(0.0, 0.0, 4.0, 0.0, 2.0, -1.0) < 0.0);
        assert_eq!(edge(0.0, 0.0, 4.0, 0.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn shared_edges_classify_once() {
        let point = |x: f32, y: f32| Vec4::new(x, y, 0.0, 1.0);

        // Horizontal: rightward is a top edge, leftward a bottom edge.
        assert!(is_top_left(point(0.0, 0.0), point(4.0, 0.0)));
        assert!(!is_top_left(point(4.0, 4.0), point(0.0, 4.0)));

        // Upward edges are left edges, downward edges are right edges.
        assert!(is_top_left(point(0.0, 4.0), point(0.0, 0.0)));
        assert!(!is_top_left(point(4.0, 0.0), point(4.0, 4.0)));

        // A shared edge is top-left for exactly one of the two triangles
        // that traverse it in opposite directions.
        let a = point(0.0, 0.0);
        let b = point(4.0, 4.0);
        assert_ne!(is_top_left(a, b), is_top_left(b, a));
    }
}
