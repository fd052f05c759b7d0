//! Host-side histogram with the kernel's exact coverage and binning rules.

use super::region::RegionOfInterest;
use super::result::HistogramResult;
use crate::config::HistogramSpec;

/// Histogram of `region` over row-major `values` of a `width × height`
/// image. Texels past the end of `values` are ignored.
pub fn cpu_histogram(
    values: &[f32],
    width: u32,
    height: u32,
    spec: &HistogramSpec,
    region: &RegionOfInterest,
) -> HistogramResult {
    let mut counts = vec![0u32; spec.num_bins() as usize];
    let Some(window) = region.texel_window(width, height) else {
        return counts.into();
    };

    let [x0, y0] = window.origin;
    for y in y0..y0 + window.extent[1] {
        for x in x0..x0 + window.extent[0] {
            if !region.covers_texel(x, y, width, height) {
                continue;
            }
            let index = y as usize * width as usize + x as usize;
            let Some(&value) = values.get(index) else {
                continue;
            };
            if let Some(bin) = spec.bin_index(value) {
                counts[bin as usize] += 1;
            }
        }
    }
    counts.into()
}
