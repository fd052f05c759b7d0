//! Property tests over the host reference histogram and the texel coverage
//! rule the kernel shares with it.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use texture_histogram::histogram::cpu_histogram;
use texture_histogram::{HistogramSpec, RegionOfInterest};

fn arb_image() -> impl Strategy<Value = (u32, u32, Vec<f32>)> {
    (1u32..24, 1u32..24).prop_flat_map(|(w, h)| {
        let values = prop_vec(-0.5f32..1.5, (w * h) as usize);
        (Just(w), Just(h), values)
    })
}

fn arb_region() -> impl Strategy<Value = RegionOfInterest> {
    (-0.25f64..1.25, 0.0f64..1.0, -0.25f64..1.25, 0.0f64..1.0)
        .prop_map(|(u, du, v, dv)| RegionOfInterest::new(u, u + du, v, v + dv))
}

/// A region together with one nested inside it.
fn arb_nested_regions() -> impl Strategy<Value = (RegionOfInterest, RegionOfInterest)> {
    (arb_region(), 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0).prop_map(
        |(outer, a, b, c, d)| {
            let lerp = |lo: f64, hi: f64, t: f64| lo + (hi - lo) * t;
            let min_u = lerp(outer.min_u, outer.max_u, a.min(b));
            let max_u = lerp(outer.min_u, outer.max_u, a.max(b));
            let min_v = lerp(outer.min_v, outer.max_v, c.min(d));
            let max_v = lerp(outer.min_v, outer.max_v, c.max(d));
            (outer, RegionOfInterest::new(min_u, max_u, min_v, max_v))
        },
    )
}

fn spec() -> HistogramSpec {
    HistogramSpec::new(16, 0.0, 1.0).expect("valid spec")
}

proptest! {
    #[test]
    fn full_region_counts_every_texel((w, h, values) in arb_image()) {
        let r = cpu_histogram(&values, w, h, &spec(), &RegionOfInterest::full());
        prop_assert_eq!(r.len(), 16);
        prop_assert_eq!(r.total(), (w * h) as u64);
    }

    #[test]
    fn nested_regions_never_count_more((w, h, values) in arb_image(), (outer, inner) in arb_nested_regions()) {
        prop_assume!(outer.contains(&inner));
        let spec = spec();
        let big = cpu_histogram(&values, w, h, &spec, &outer);
        let small = cpu_histogram(&values, w, h, &spec, &inner);
        prop_assert!(small.total() <= big.total());
        for (s, b) in small.counts().iter().zip(big.counts()) {
            prop_assert!(s <= b);
        }
    }

    #[test]
    fn texel_window_holds_every_covered_texel(w in 1u32..64, h in 1u32..64, region in arb_region()) {
        let window = region.texel_window(w, h);
        for y in 0..h {
            for x in 0..w {
                if !region.covers_texel(x, y, w, h) {
                    continue;
                }
                let win = window.expect("covered texel implies a window");
                prop_assert!(x >= win.origin[0] && x < win.origin[0] + win.extent[0]);
                prop_assert!(y >= win.origin[1] && y < win.origin[1] + win.extent[1]);
            }
        }
        if let Some(win) = window {
            prop_assert!(win.origin[0] + win.extent[0] <= w);
            prop_assert!(win.origin[1] + win.extent[1] <= h);
        }
    }

    #[test]
    fn bins_stay_in_range(value in prop::num::f32::ANY, bins in 1i64..512) {
        let spec = HistogramSpec::new(bins, -2.0, 3.0).expect("valid spec");
        match spec.bin_index(value) {
            None => prop_assert!(value.is_nan()),
            Some(bin) => prop_assert!(bin < spec.num_bins()),
        }
    }
}

#[test]
fn region_outside_texture_is_all_zero() {
    let values = vec![0.5f32; 64];
    let r = cpu_histogram(
        &values,
        8,
        8,
        &spec(),
        &RegionOfInterest::new(-1.0, -0.5, -1.0, -0.5),
    );
    assert_eq!(r.len(), 16);
    assert!(r.is_all_zero());
}
