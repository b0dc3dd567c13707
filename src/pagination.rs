use serde::Serialize;

use crate::constraints::PageConstraints;

/// The two covers are always part of the bound total.
pub const COVER_PAGES: u32 = 2;

/// The outcome of fitting the interior page count into the binder's constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub final_interior_pages: u32,
    /// Blank pages appended after the content, `final - content` when positive.
    pub padding_needed: u32,
    pub was_truncated: bool,
    /// Content pages dropped from the end, `content - final` when positive.
    pub truncated_count: u32,
    pub warnings: Vec<String>,
}

fn is_aligned(interior_pages: u32, blank_pages: u32, page_multiple: u32) -> bool {
    (COVER_PAGES + blank_pages + interior_pages) % page_multiple == 0
}

/// Pads the interior up to the minimum, aligns the bound total on the page multiple, truncates
/// down to the maximum and finally walks back down until the total is aligned again. The maximum
/// wins over the minimum when both cannot hold.
pub fn adjust(content_pages: u32, blank_pages: u32, constraints: &PageConstraints) -> Adjustment {
    let page_multiple = constraints.page_multiple.max(1);
    let mut warnings = Vec::new();
    let mut interior_pages = content_pages;

    if constraints.min_pages > 0 && interior_pages < constraints.min_pages {
        warnings.push(format!(
            "Padded {} pages to reach the minimum of {} interior pages",
            constraints.min_pages - interior_pages,
            constraints.min_pages
        ));
        interior_pages = constraints.min_pages;
    }

    let remainder = (COVER_PAGES + blank_pages + interior_pages) % page_multiple;
    if remainder != 0 {
        let shortfall = page_multiple - remainder;
        warnings.push(format!(
            "Padded {} pages to align the page count on a multiple of {}",
            shortfall, page_multiple
        ));
        interior_pages += shortfall;
    }

    let mut was_truncated = false;
    if constraints.max_pages > 0 && interior_pages > constraints.max_pages {
        was_truncated = true;
        interior_pages = constraints.max_pages;

        match (0..=interior_pages)
            .rev()
            .find(|pages| is_aligned(*pages, blank_pages, page_multiple))
        {
            Some(aligned_pages) if aligned_pages != interior_pages => {
                warnings.push(format!(
                    "Removed {} more pages to keep the page count a multiple of {} under the maximum",
                    interior_pages - aligned_pages,
                    page_multiple
                ));
                interior_pages = aligned_pages;
            }
            Some(_) => {}
            // The maximum is kept, the total stays unaligned
            None => warnings.push(format!(
                "No interior of at most {} pages keeps the page count a multiple of {}: the constraints cannot be satisfied",
                interior_pages, page_multiple
            )),
        }

        let dropped = content_pages.saturating_sub(interior_pages);
        if dropped > 0 {
            warnings.insert(
                0,
                format!(
                    "Truncated {} pages to respect the maximum of {} interior pages",
                    dropped, constraints.max_pages
                ),
            );
        }
    }

    if constraints.min_pages > 0 && interior_pages < constraints.min_pages {
        warnings.push(format!(
            "The interior has {} pages, below the minimum of {}: the maximum of {} and the multiple of {} cannot both hold",
            interior_pages, constraints.min_pages, constraints.max_pages, page_multiple
        ));
    }

    for warning in &warnings {
        log::warn!("{}", warning);
    }

    Adjustment {
        final_interior_pages: interior_pages,
        padding_needed: interior_pages.saturating_sub(content_pages),
        was_truncated,
        truncated_count: content_pages.saturating_sub(interior_pages),
        warnings,
    }
}

/// Given the number of leaves each logical page takes, in order, keeps the longest prefix of
/// pages that fits into `interior_leaves` and returns how many pages are kept together with the
/// number of blank leaves needed to fill the rest.
pub fn keep_within(leaves_per_page: &[u32], interior_leaves: u32) -> (usize, u32) {
    let mut used_leaves = 0;
    let mut kept_pages = 0;
    for leaves in leaves_per_page {
        if used_leaves + leaves > interior_leaves {
            break;
        }
        used_leaves += leaves;
        kept_pages += 1;
    }

    (kept_pages, interior_leaves - used_leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn constraints(min_pages: u32, max_pages: u32, page_multiple: u32) -> PageConstraints {
        PageConstraints {
            min_pages,
            max_pages,
            page_multiple,
        }
    }

    #[test]
    fn pads_to_the_minimum_then_aligns() {
        let adjustment = adjust(10, 0, &constraints(12, 0, 4));
        assert_eq!(adjustment.final_interior_pages, 16);
        assert_eq!(adjustment.padding_needed, 6);
        assert!(!adjustment.was_truncated);
        assert_eq!(adjustment.warnings.len(), 2);
    }

    #[test]
    fn truncates_to_an_aligned_maximum() {
        let adjustment = adjust(40, 2, &constraints(0, 32, 4));
        assert_eq!(adjustment.final_interior_pages, 32);
        assert_eq!(adjustment.padding_needed, 0);
        assert!(adjustment.was_truncated);
        assert_eq!(adjustment.truncated_count, 8);
        assert!(adjustment.warnings[0].contains("Truncated 8 pages"));
    }

    #[test]
    fn truncation_walks_back_to_alignment() {
        // 2 + 29 is not a multiple of 4, the closest aligned count below is 26
        let adjustment = adjust(42, 0, &constraints(0, 29, 4));
        assert_eq!(adjustment.final_interior_pages, 26);
        assert_eq!(adjustment.truncated_count, 16);
        assert_eq!(adjustment.warnings.len(), 2);
    }

    #[test]
    fn already_aligned_content_is_left_alone() {
        let adjustment = adjust(14, 0, &constraints(0, 0, 4));
        assert_eq!(adjustment.final_interior_pages, 14);
        assert!(adjustment.warnings.is_empty());
    }

    #[test]
    fn the_maximum_wins_over_the_minimum() {
        let adjustment = adjust(5, 0, &constraints(11, 11, 4));
        assert_eq!(adjustment.final_interior_pages, 10);
        assert!(adjustment.was_truncated);
        assert_eq!(adjustment.truncated_count, 0);
        assert!(adjustment
            .warnings
            .iter()
            .any(|warning| warning.contains("below the minimum")));
    }

    #[test]
    fn an_unalignable_maximum_is_reported() {
        // 2 + 0 and 2 + 1 are both off a multiple of 4
        let adjustment = adjust(5, 0, &constraints(0, 1, 4));
        assert_eq!(adjustment.final_interior_pages, 1);
        assert!(adjustment.was_truncated);
        assert_eq!(adjustment.truncated_count, 4);
        assert!(adjustment
            .warnings
            .iter()
            .any(|warning| warning.contains("cannot be satisfied")));
    }

    #[test]
    fn random_constraints_are_honoured() {
        let mut rng = rand::thread_rng();
        for _ in 0..2_000 {
            let page_multiple = [1, 2, 4][rng.gen_range(0..3)];
            let content_pages = rng.gen_range(0..80);
            let blank_pages = rng.gen_range(0..4);
            let min_pages = if rng.gen_bool(0.5) { rng.gen_range(1..40) } else { 0 };
            // Leave room for at least one aligned count between the minimum and the maximum
            let max_pages = if rng.gen_bool(0.5) {
                min_pages + page_multiple - 1 + rng.gen_range(0..40)
            } else {
                0
            };
            let page_constraints = constraints(min_pages, max_pages, page_multiple);

            let adjustment = adjust(content_pages, blank_pages, &page_constraints);
            let context =
                format!("{content_pages} {blank_pages} {page_constraints:?} {adjustment:?}");
            let final_pages = adjustment.final_interior_pages;
            assert!(min_pages == 0 || final_pages >= min_pages, "{context}");
            assert!(max_pages == 0 || final_pages <= max_pages, "{context}");
            assert_eq!((2 + blank_pages + final_pages) % page_multiple, 0, "{context}");
            assert_eq!(
                adjustment.padding_needed,
                final_pages.saturating_sub(content_pages),
                "{context}"
            );
        }
    }

    #[test]
    fn keeps_whole_pages_and_pads_the_rest() {
        assert_eq!(keep_within(&[1, 2, 2, 2], 6), (3, 1));
        assert_eq!(keep_within(&[1, 1], 4), (2, 2));
        assert_eq!(keep_within(&[2, 2], 0), (0, 0));
    }
}
