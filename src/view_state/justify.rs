//! Justification engine - paragraph-style line breaking for thumbnails
//!
//! Pure function from (ordered aspect ratios, container width) to justified
//! subrows and the realized row height.
//!
//! # Algorithm
//!
//! Every item is first scaled to a provisional uniform height
//! `min(container_width / 2, max_subrow_height)`. A dynamic program over break
//! points then minimizes total badness, where one line's badness is its unused
//! width squared:
//!
//! ```text
//! min_badness[0] = 0
//! min_badness[i] = min over j < i of
//!     min_badness[j] + (W - Σ w[j..i) - 2 * padding * (i - j))²
//! ```
//!
//! Only lines that fit the width budget are candidates. The closing line of a
//! row costs nothing, as in paragraph setting, since the next row is laid out
//! independently. An item too wide for any line is forced onto a line of its
//! own with its overflow squared as badness. Ties resolve to the earliest
//! break, so output is deterministic.
//!
//! Each subrow is then rescaled to fill the container exactly; the last item
//! absorbs the rounding remainder. The final subrow of the collection's final
//! row is exempt from fill correction.
//!
//! # Complexity
//!
//! O(n * k) where k is the longest run of items that fits one line.

use crate::model::geometry::{DisplayElement, RowLayout, SubRow};
use crate::model::identifiers::ItemIndex;
use crate::view_state::types::{AspectRatio, ContainerWidth};
use std::ops::Range;

/// Slack allowed when comparing a line's width against the budget.
const FIT_EPSILON: f64 = 1e-9;

/// Parameters that determine a row's layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JustifyParams {
    /// Width to fill.
    pub container_width: ContainerWidth,
    /// Padding on each side of every item.
    pub padding: f64,
    /// Cap on the provisional subrow height.
    pub max_subrow_height: f64,
}

impl JustifyParams {
    /// Create layout parameters.
    pub fn new(container_width: ContainerWidth, padding: f64, max_subrow_height: f64) -> Self {
        Self {
            container_width,
            padding,
            max_subrow_height,
        }
    }

    /// Provisional uniform subrow height: `min(container_width / 2, max_subrow_height)`.
    pub fn provisional_height(&self) -> f64 {
        (self.container_width.as_f64() / 2.0).min(self.max_subrow_height)
    }
}

/// Lay out one row.
///
/// `is_final_row` marks the collection's last row, whose last subrow keeps its
/// provisional size instead of stretching.
pub fn justify(
    items: &[(ItemIndex, AspectRatio)],
    params: &JustifyParams,
    is_final_row: bool,
) -> RowLayout {
    let height = params.provisional_height();
    let widths: Vec<f64> = items.iter().map(|(_, ratio)| ratio.get() * height).collect();
    justify_scaled(items, &widths, height, params, is_final_row)
}

/// Lay out one row from widths already scaled to `height`.
pub fn justify_scaled(
    items: &[(ItemIndex, AspectRatio)],
    widths: &[f64],
    height: f64,
    params: &JustifyParams,
    is_final_row: bool,
) -> RowLayout {
    debug_assert_eq!(items.len(), widths.len());

    let container = params.container_width.as_f64();
    let padding = params.padding;
    let lines = optimal_breaks(widths, container, padding);
    let last_line = lines.len().saturating_sub(1);

    let mut subrows = Vec::with_capacity(lines.len());
    let mut top = 0.0;

    for (line_no, line) in lines.into_iter().enumerate() {
        let exempt = is_final_row && line_no == last_line;
        let count = line.len() as f64;
        let width_sum: f64 = widths[line.clone()].iter().sum();
        let available = container - 2.0 * padding * count;
        let ratio = if exempt {
            (available / width_sum).min(1.0)
        } else {
            available / width_sum
        };
        let line_height = height * ratio;

        let mut running = 0.0;
        let last = line.end - 1;
        let mut elements = Vec::with_capacity(line.len());
        for i in line {
            let width = if i == last && !exempt {
                container - running - 2.0 * padding
            } else {
                widths[i] * ratio
            };
            running += width + 2.0 * padding;
            elements.push(DisplayElement {
                item: items[i].0,
                display_width: width,
                display_height: line_height,
                display_top_pixel_accumulated: top,
            });
        }

        top += line_height + 2.0 * padding;
        subrows.push(SubRow {
            display_elements: elements,
        });
    }

    RowLayout {
        subrows,
        realized_height: top,
    }
}

/// Optimal partition of `widths` into lines, as half-open index ranges.
pub fn optimal_breaks(widths: &[f64], container: f64, padding: f64) -> Vec<Range<usize>> {
    let n = widths.len();
    if n == 0 {
        return Vec::new();
    }

    let mut min_badness = vec![f64::INFINITY; n + 1];
    let mut back = vec![0usize; n + 1];
    min_badness[0] = 0.0;

    for i in 1..=n {
        let mut line_width = 0.0;
        let mut fitted = false;

        // Walk j downward so longer lines are tried last; `<=` keeps the
        // earliest break among equal totals.
        for j in (0..i).rev() {
            line_width += widths[j] + 2.0 * padding;
            if line_width > container + FIT_EPSILON {
                break;
            }
            fitted = true;
            let cost = if i == n {
                0.0
            } else {
                let slack = container - line_width;
                slack * slack
            };
            let total = min_badness[j] + cost;
            if total <= min_badness[i] {
                min_badness[i] = total;
                back[i] = j;
            }
        }

        if !fitted {
            let overflow = widths[i - 1] + 2.0 * padding - container;
            min_badness[i] = min_badness[i - 1] + overflow * overflow;
            back[i] = i - 1;
        }
    }

    let mut lines = Vec::new();
    let mut end = n;
    while end > 0 {
        let start = back[end];
        lines.push(start..end);
        end = start;
    }
    lines.reverse();
    lines
}

/// Total badness of a partition under the same rules as [`optimal_breaks`].
///
/// Returns `None` when a multi-item line overflows the container.
pub fn partition_badness(
    widths: &[f64],
    lines: &[Range<usize>],
    container: f64,
    padding: f64,
) -> Option<f64> {
    let mut total = 0.0;
    for (line_no, line) in lines.iter().enumerate() {
        let used: f64 = widths[line.clone()].iter().sum::<f64>() + 2.0 * padding * line.len() as f64;
        if used > container + FIT_EPSILON {
            if line.len() > 1 {
                return None;
            }
            let overflow = used - container;
            total += overflow * overflow;
        } else if line_no + 1 < lines.len() {
            let slack = container - used;
            total += slack * slack;
        }
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: u32, padding: f64) -> JustifyParams {
        JustifyParams::new(ContainerWidth::new(width).unwrap(), padding, 250.0)
    }

    fn items_from_widths(widths: &[f64], height: f64) -> Vec<(ItemIndex, AspectRatio)> {
        widths
            .iter()
            .enumerate()
            .map(|(i, w)| (ItemIndex::new(i), AspectRatio::new(w / height).unwrap()))
            .collect()
    }

    fn subrow_fill(subrow: &SubRow, padding: f64) -> f64 {
        subrow.width_sum() + 2.0 * padding * subrow.len() as f64
    }

    #[test]
    fn provisional_height_caps_at_max() {
        assert_eq!(params(1000, 4.0).provisional_height(), 250.0);
        assert_eq!(params(300, 4.0).provisional_height(), 150.0);
    }

    #[test]
    fn empty_input_yields_empty_layout() {
        let layout = justify(&[], &params(1000, 4.0), false);
        assert!(layout.subrows.is_empty());
        assert_eq!(layout.realized_height, 0.0);
    }

    #[test]
    fn scenario_a_breaks_into_two_filled_subrows() {
        let widths = [400.0, 300.0, 250.0, 200.0, 150.0];
        let items = items_from_widths(&widths, 250.0);
        let layout = justify(&items, &params(1000, 4.0), false);

        assert_eq!(layout.subrows.len(), 2);
        assert_eq!(layout.subrows[0].len(), 3);
        assert_eq!(layout.subrows[1].len(), 2);
        for subrow in &layout.subrows {
            assert!((subrow_fill(subrow, 4.0) - 1000.0).abs() < 1e-6);
        }

        let h1 = 250.0 * 976.0 / 950.0;
        let h2 = 250.0 * 984.0 / 350.0;
        assert!((layout.subrows[0].height() - h1).abs() < 1e-9);
        assert!((layout.subrows[1].height() - h2).abs() < 1e-9);
        assert!((layout.realized_height - (h1 + h2 + 16.0)).abs() < 1e-9);
    }

    #[test]
    fn second_subrow_top_accumulates_first_height_and_padding() {
        let widths = [400.0, 300.0, 250.0, 200.0, 150.0];
        let items = items_from_widths(&widths, 250.0);
        let layout = justify(&items, &params(1000, 4.0), false);

        let first = &layout.subrows[0];
        let second = &layout.subrows[1];
        assert_eq!(first.display_elements[0].display_top_pixel_accumulated, 0.0);
        let expected = first.height() + 8.0;
        assert!((second.display_elements[0].display_top_pixel_accumulated - expected).abs() < 1e-9);
    }

    #[test]
    fn final_row_last_subrow_keeps_provisional_size() {
        let widths = [400.0, 300.0, 250.0, 200.0, 150.0];
        let items = items_from_widths(&widths, 250.0);
        let layout = justify(&items, &params(1000, 4.0), true);

        let last = &layout.subrows[1];
        assert_eq!(last.height(), 250.0);
        assert!((last.display_elements[0].display_width - 200.0).abs() < 1e-9);
        assert!((last.display_elements[1].display_width - 150.0).abs() < 1e-9);
        // Non-final subrows still fill
        assert!((subrow_fill(&layout.subrows[0], 4.0) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn oversized_item_is_forced_onto_its_own_line() {
        let widths = [300.0, 1500.0, 300.0];
        let lines = optimal_breaks(&widths, 1000.0, 4.0);
        assert_eq!(lines, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn oversized_item_is_shrunk_to_fill() {
        let items = items_from_widths(&[1500.0], 250.0);
        let layout = justify(&items, &params(1000, 4.0), false);
        let element = layout.subrows[0].display_elements[0];
        assert!((element.display_width - 992.0).abs() < 1e-9);
        assert!(element.display_height < 250.0);
    }

    #[test]
    fn everything_fitting_one_line_stays_one_line() {
        let lines = optimal_breaks(&[100.0, 100.0, 100.0], 1000.0, 4.0);
        assert_eq!(lines, vec![0..3]);
    }

    #[test]
    fn partition_badness_matches_dp_choice() {
        let widths = [400.0, 300.0, 250.0, 200.0, 150.0];
        let lines = optimal_breaks(&widths, 1000.0, 4.0);
        let chosen = partition_badness(&widths, &lines, 1000.0, 4.0).unwrap();
        assert!((chosen - 26.0 * 26.0).abs() < 1e-9);
    }

    #[test]
    fn partition_badness_rejects_overflowing_multi_item_line() {
        let widths = [600.0, 600.0];
        assert_eq!(partition_badness(&widths, &[0..2], 1000.0, 4.0), None);
    }

    #[test]
    fn justify_is_deterministic() {
        let widths = [123.4, 321.0, 99.9, 410.2, 250.0, 88.0, 301.5];
        let items = items_from_widths(&widths, 250.0);
        let a = justify(&items, &params(1000, 4.0), false);
        let b = justify(&items, &params(1000, 4.0), false);
        assert_eq!(a, b);
    }
}
