//! Region-of-interest in texture-fraction coordinates and the texel
//! coverage rule shared by the kernel and the host reference.

use serde::{Deserialize, Serialize};

/// `[min_u, max_u] × [min_v, max_v]` in normalized texture coordinates.
///
/// Bounds are not clamped to `[0, 1]`; parts of the region outside the
/// texture simply cover no texels. An inverted or NaN range is empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub min_u: f64,
    pub max_u: f64,
    pub min_v: f64,
    pub max_v: f64,
}

/// Sub-rectangle of texels the kernel is dispatched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelWindow {
    pub origin: [u32; 2],
    pub extent: [u32; 2],
}

impl TexelWindow {
    pub fn texel_count(&self) -> u64 {
        self.extent[0] as u64 * self.extent[1] as u64
    }
}

impl RegionOfInterest {
    pub fn new(min_u: f64, max_u: f64, min_v: f64, max_v: f64) -> Self {
        RegionOfInterest {
            min_u,
            max_u,
            min_v,
            max_v,
        }
    }

    /// The whole texture.
    pub fn full() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }

    /// Region from a selection centre and size, the way an axis selection
    /// describes it.
    pub fn from_center_size(center: [f64; 2], size: [f64; 2]) -> Self {
        let half_u = size[0] * 0.5;
        let half_v = size[1] * 0.5;
        Self::new(
            center[0] - half_u,
            center[0] + half_u,
            center[1] - half_v,
            center[1] + half_v,
        )
    }

    pub fn is_empty(&self) -> bool {
        !(self.min_u <= self.max_u && self.min_v <= self.max_v)
    }

    /// True when every point of `other` lies in `self`. An empty region is
    /// contained in anything.
    pub fn contains(&self, other: &RegionOfInterest) -> bool {
        other.is_empty()
            || (self.min_u <= other.min_u
                && other.max_u <= self.max_u
                && self.min_v <= other.min_v
                && other.max_v <= self.max_v)
    }

    /// Bounds as the kernel sees them.
    pub fn as_f32(&self) -> [f32; 4] {
        [
            self.min_u as f32,
            self.max_u as f32,
            self.min_v as f32,
            self.max_v as f32,
        ]
    }

    /// Whether texel `(x, y)` of a `width × height` texture counts.
    ///
    /// Mirrors the kernel's test exactly, in `f32`: the texel centre
    /// `(x + 0.5, y + 0.5) * (1/width, 1/height)` must lie inside the
    /// closed region.
    pub fn covers_texel(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        if self.is_empty() {
            return false;
        }
        let [min_u, max_u, min_v, max_v] = self.as_f32();
        let (step_x, step_y) = texel_step(width, height);
        let u = (x as f32 + 0.5) * step_x;
        let v = (y as f32 + 0.5) * step_y;
        !(u < min_u || u > max_u || v < min_v || v > max_v)
    }

    /// Bounding texel window of the region, clipped to the texture, or
    /// `None` when no texel can be covered.
    ///
    /// The window is padded by one texel on each side so that rounding
    /// differences never drop a covered texel; the kernel re-checks every
    /// texel with [`RegionOfInterest::covers_texel`]'s rule.
    pub fn texel_window(&self, width: u32, height: u32) -> Option<TexelWindow> {
        if self.is_empty() || width == 0 || height == 0 {
            return None;
        }
        let [min_u, max_u, min_v, max_v] = self.as_f32();
        let (x0, nx) = axis_window(min_u, max_u, width)?;
        let (y0, ny) = axis_window(min_v, max_v, height)?;
        Some(TexelWindow {
            origin: [x0, y0],
            extent: [nx, ny],
        })
    }
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self::full()
    }
}

pub fn texel_step(width: u32, height: u32) -> (f32, f32) {
    (1.0 / width as f32, 1.0 / height as f32)
}

fn axis_window(min: f32, max: f32, size: u32) -> Option<(u32, u32)> {
    let last = (size - 1) as f32;
    let lo = ((min * size as f32 - 0.5).floor() - 1.0).max(0.0);
    let hi = ((max * size as f32 - 0.5).ceil() + 1.0).min(last);
    if lo > hi {
        return None;
    }
    let lo = lo as u32;
    let hi = hi as u32;
    Some((lo, hi - lo + 1))
}
