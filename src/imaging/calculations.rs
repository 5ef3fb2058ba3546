//! Pure geometry for export sizing and crop extraction.
//!
//! All functions here are pure and testable without any I/O or images.
//! Rounding follows "round half up" (`floor(v + 0.5)`) everywhere so pixel
//! boundaries match the editing model exactly, including for negative
//! offsets where `f64::round` would round away from zero instead.

use crate::types::{PhotoWork, Size};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which side a custom export size constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomSizeSide {
    Width,
    Height,
    /// Both sides, i.e. a square bounding box.
    Size,
}

impl FromStr for CustomSizeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "width" => Ok(CustomSizeSide::Width),
            "height" => Ok(CustomSizeSide::Height),
            "size" => Ok(CustomSizeSide::Size),
            other => Err(other.to_string()),
        }
    }
}

/// Pixel region to extract from the rotated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Multiplier applied to the free side of a `width`/`height` custom size.
///
/// The result is a bound the aspect-preserving resize never reaches, which
/// leaves that side effectively unconstrained.
pub const UNCONSTRAINED_SIDE_FACTOR: u32 = 100;

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Shrink `width`×`height` so its pixel count fits `max_pixel_count`.
///
/// Preserves the aspect ratio and never upscales:
///
/// ```text
/// width'  = min(width, round(sqrt(max_pixel_count * aspect)))
/// height' = width' / aspect
/// ```
///
/// # Examples
/// ```
/// # use darkroom::imaging::reduce_to_pixel_budget;
/// # use darkroom::types::Size;
/// assert_eq!(reduce_to_pixel_budget(4000, 3000, 1_000_000), Size::new(1155, 866));
/// // Already within budget → unchanged
/// assert_eq!(reduce_to_pixel_budget(800, 600, 1_000_000), Size::new(800, 600));
/// ```
pub fn reduce_to_pixel_budget(width: u32, height: u32, max_pixel_count: u64) -> Size {
    if width == 0 || height == 0 {
        return Size::new(width, height);
    }

    let aspect = width as f64 / height as f64;
    let budget_width = round_half_up((max_pixel_count as f64 * aspect).sqrt()).max(1) as u32;
    let new_width = width.min(budget_width);
    let new_height = round_half_up(new_width as f64 / aspect).clamp(1, height as i64) as u32;

    Size::new(new_width, new_height)
}

/// Bounding box for a custom export size.
///
/// `Size` yields a square. `Width`/`Height` fix that side at `pixels` and set
/// the other to `100 * pixels` (see [`UNCONSTRAINED_SIDE_FACTOR`]).
pub fn resolve_custom_size(side: CustomSizeSide, pixels: u32) -> Size {
    let generous = pixels.saturating_mul(UNCONSTRAINED_SIDE_FACTOR);
    match side {
        CustomSizeSide::Size => Size::new(pixels, pixels),
        CustomSizeSide::Width => Size::new(pixels, generous),
        CustomSizeSide::Height => Size::new(generous, pixels),
    }
}

/// Dimensions of the canvas the crop rectangle lives in.
fn rotated_canvas(work: &PhotoWork, master_width: u32, master_height: u32) -> (u32, u32) {
    match work.rotation_turns {
        Some(turns) if turns.swaps_axes() => (master_height, master_width),
        _ => (master_width, master_height),
    }
}

/// Pixel region described by the work's crop rectangle, if any.
///
/// The rectangle's `x`/`y` are relative to the center of the rotated canvas.
/// Each component is rounded independently; regions starting left of or
/// above the canvas are clamped to its edge.
pub fn crop_region_from_work(
    work: &PhotoWork,
    master_width: u32,
    master_height: u32,
) -> Option<CropRegion> {
    let rect = work.crop_rect?;
    let (width, height) = rotated_canvas(work, master_width, master_height);

    let left = round_half_up(width as f64 / 2.0 + rect.x);
    let top = round_half_up(height as f64 / 2.0 + rect.y);
    let crop_width = round_half_up(rect.width);
    let crop_height = round_half_up(rect.height);

    Some(CropRegion {
        left: left.max(0) as u32,
        top: top.max(0) as u32,
        width: crop_width.max(0) as u32,
        height: crop_height.max(0) as u32,
    })
}

/// Dimensions of the photo after all edits in `work`.
///
/// Odd quarter turns swap the axes; a crop replaces the size with the
/// rounded crop dimensions.
pub fn edited_size(master_width: u32, master_height: u32, work: &PhotoWork) -> Size {
    match crop_region_from_work(work, master_width, master_height) {
        Some(region) => Size::new(region.width, region.height),
        None => {
            let (width, height) = rotated_canvas(work, master_width, master_height);
            Size::new(width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CropRect, QuarterTurns};

    fn work_with(turns: Option<QuarterTurns>, crop: Option<CropRect>) -> PhotoWork {
        PhotoWork {
            rotation_turns: turns,
            crop_rect: crop,
            ..Default::default()
        }
    }

    // =========================================================================
    // reduce_to_pixel_budget
    // =========================================================================

    #[test]
    fn budget_landscape() {
        // sqrt(1_000_000 * 4/3) = 1154.7 → 1155, 1155 * 3/4 = 866.25 → 866
        assert_eq!(
            reduce_to_pixel_budget(4000, 3000, 1_000_000),
            Size::new(1155, 866)
        );
    }

    #[test]
    fn budget_portrait() {
        // sqrt(200_000 * 0.75) = 387.3 → 387, 387 / 0.75 = 516
        assert_eq!(
            reduce_to_pixel_budget(3000, 4000, 200_000),
            Size::new(387, 516)
        );
    }

    #[test]
    fn budget_small_preset() {
        // sqrt(6000 * 1.5) = 94.87 → 95, 95 / 1.5 = 63.3 → 63
        assert_eq!(reduce_to_pixel_budget(6000, 4000, 6000), Size::new(95, 63));
    }

    #[test]
    fn budget_never_upscales() {
        assert_eq!(
            reduce_to_pixel_budget(640, 480, 1_000_000),
            Size::new(640, 480)
        );
    }

    #[test]
    fn budget_zero_dimension_passthrough() {
        assert_eq!(reduce_to_pixel_budget(0, 480, 1000), Size::new(0, 480));
    }

    #[test]
    fn budget_properties_hold_across_shapes() {
        let shapes = [
            (4000, 3000),
            (3000, 4000),
            (6000, 1000),
            (1000, 6000),
            (1, 1),
            (12345, 6789),
            (5000, 5000),
        ];
        let budgets = [6000u64, 200_000, 1_000_000, 10];

        for &(w, h) in &shapes {
            for &budget in &budgets {
                let out = reduce_to_pixel_budget(w, h, budget);
                assert!(out.width <= w, "{w}x{h} @ {budget}: width {}", out.width);
                assert!(out.height <= h, "{w}x{h} @ {budget}: height {}", out.height);
                // One pixel of rounding slack per side
                let trimmed = out.width.saturating_sub(1) as u64 * out.height.saturating_sub(1) as u64;
                assert!(
                    trimmed <= budget,
                    "{w}x{h} @ {budget}: {out:?} over budget beyond rounding"
                );
            }
        }
    }

    // =========================================================================
    // resolve_custom_size
    // =========================================================================

    #[test]
    fn custom_size_square() {
        assert_eq!(
            resolve_custom_size(CustomSizeSide::Size, 1024),
            Size::new(1024, 1024)
        );
    }

    // The free side is deliberately 100x the fixed side: downstream
    // aspect-fit resizing treats it as "unconstrained".
    #[test]
    fn custom_size_width_uses_oversized_height_bound() {
        assert_eq!(
            resolve_custom_size(CustomSizeSide::Width, 500),
            Size::new(500, 50_000)
        );
    }

    #[test]
    fn custom_size_height_uses_oversized_width_bound() {
        assert_eq!(
            resolve_custom_size(CustomSizeSide::Height, 300),
            Size::new(30_000, 300)
        );
    }

    #[test]
    fn custom_size_side_parses() {
        assert_eq!("width".parse(), Ok(CustomSizeSide::Width));
        assert_eq!("size".parse(), Ok(CustomSizeSide::Size));
        assert!("diagonal".parse::<CustomSizeSide>().is_err());
    }

    // =========================================================================
    // crop_region_from_work
    // =========================================================================

    #[test]
    fn crop_none_without_rect() {
        assert_eq!(crop_region_from_work(&PhotoWork::default(), 4000, 3000), None);
    }

    #[test]
    fn crop_after_quarter_turn_uses_swapped_canvas() {
        let work = work_with(
            Some(QuarterTurns::One),
            Some(CropRect {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 200.0,
            }),
        );
        assert_eq!(
            crop_region_from_work(&work, 4000, 3000),
            Some(CropRegion {
                left: 1500,
                top: 2000,
                width: 100,
                height: 200,
            })
        );
    }

    #[test]
    fn crop_half_turn_keeps_canvas() {
        let work = work_with(
            Some(QuarterTurns::Two),
            Some(CropRect {
                x: -2000.0,
                y: -1500.0,
                width: 4000.0,
                height: 3000.0,
            }),
        );
        assert_eq!(
            crop_region_from_work(&work, 4000, 3000),
            Some(CropRegion {
                left: 0,
                top: 0,
                width: 4000,
                height: 3000,
            })
        );
    }

    #[test]
    fn crop_rounds_half_up_for_negative_offsets() {
        // 101/2 - 10.0 = 40.5 → 41; 51/2 - 23.0 = 2.5 → 3; both round up
        let work = work_with(
            None,
            Some(CropRect {
                x: -10.0,
                y: -23.0,
                width: 10.5,
                height: 19.4,
            }),
        );
        let region = crop_region_from_work(&work, 101, 51).unwrap();
        assert_eq!(region.left, 41);
        assert_eq!(region.top, 3);
        assert_eq!(region.width, 11);
        assert_eq!(region.height, 19);
    }

    #[test]
    fn crop_clamps_negative_origin() {
        let work = work_with(
            None,
            Some(CropRect {
                x: -300.0,
                y: -300.0,
                width: 50.0,
                height: 50.0,
            }),
        );
        let region = crop_region_from_work(&work, 200, 200).unwrap();
        assert_eq!((region.left, region.top), (0, 0));
    }

    // =========================================================================
    // edited_size
    // =========================================================================

    #[test]
    fn edited_size_unedited_is_master() {
        assert_eq!(
            edited_size(4000, 3000, &PhotoWork::default()),
            Size::new(4000, 3000)
        );
    }

    #[test]
    fn edited_size_three_quarter_turn_swaps() {
        let work = work_with(Some(QuarterTurns::Three), None);
        assert_eq!(edited_size(4000, 3000, &work), Size::new(3000, 4000));
    }

    #[test]
    fn edited_size_crop_wins() {
        let work = work_with(
            Some(QuarterTurns::One),
            Some(CropRect {
                x: -100.0,
                y: -50.0,
                width: 200.4,
                height: 99.6,
            }),
        );
        assert_eq!(edited_size(4000, 3000, &work), Size::new(200, 100));
    }
}
