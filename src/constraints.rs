use serde::{Deserialize, Serialize};

use crate::layout::{LayoutSpec, ProductSpec};

/// The multiple used when nothing else says otherwise: signatures of four leaves.
pub const DEFAULT_PAGE_MULTIPLE: u32 = 4;

/// The effective page-count rules of a run. A zero minimum or maximum means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConstraints {
    pub min_pages: u32,
    pub max_pages: u32,
    pub page_multiple: u32,
}

impl Default for PageConstraints {
    fn default() -> Self {
        PageConstraints {
            min_pages: 0,
            max_pages: 0,
            page_multiple: DEFAULT_PAGE_MULTIPLE,
        }
    }
}

type ConstraintSource = fn(&LayoutSpec, Option<&ProductSpec>) -> Option<PageConstraints>;

/// The sources tried in order, the first one to answer wins.
const CONSTRAINT_SOURCES: [(&str, ConstraintSource); 3] = [
    ("layout", from_layout),
    ("product", from_product),
    ("default", |_, _| Some(PageConstraints::default())),
];

fn from_layout(layout: &LayoutSpec, _: Option<&ProductSpec>) -> Option<PageConstraints> {
    let declared = layout.page_constraints?;
    if declared.min_pages.is_none()
        && declared.max_pages.is_none()
        && declared.page_multiple.is_none()
    {
        return None;
    }

    Some(PageConstraints {
        min_pages: declared.min_pages.unwrap_or(0),
        max_pages: declared.max_pages.unwrap_or(0),
        page_multiple: declared.page_multiple.unwrap_or(DEFAULT_PAGE_MULTIPLE),
    })
}

fn from_product(_: &LayoutSpec, product: Option<&ProductSpec>) -> Option<PageConstraints> {
    product.map(|product| PageConstraints {
        min_pages: product.min_page_count,
        max_pages: product.max_page_count,
        page_multiple: product.page_count_increment,
    })
}

/// Resolves the constraints from the layout, then the linked product, then the defaults.
/// A multiple of zero cannot be aligned to and is replaced by the default one.
pub fn resolve(layout: &LayoutSpec, product: Option<&ProductSpec>) -> PageConstraints {
    let (source, mut constraints) = CONSTRAINT_SOURCES
        .iter()
        .find_map(|(source, resolver)| resolver(layout, product).map(|found| (*source, found)))
        .unwrap_or(("default", PageConstraints::default()));

    if constraints.page_multiple == 0 {
        log::warn!(
            "The {} of layout {:?} declares a page multiple of 0, using {}",
            source,
            layout.id,
            DEFAULT_PAGE_MULTIPLE
        );
        constraints.page_multiple = DEFAULT_PAGE_MULTIPLE;
    }
    log::debug!(
        "Page constraints of layout {:?} resolved from the {}: {:?}",
        layout.id,
        source,
        constraints
    );

    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutPageConstraints;
    use std::collections::HashMap;

    fn layout(page_constraints: Option<LayoutPageConstraints>) -> LayoutSpec {
        LayoutSpec {
            id: "layout".into(),
            width: 576.0,
            height: 576.0,
            bleed: 0.0,
            leaves_per_spread: 1,
            font_family: "Helvetica".into(),
            max_font_size: 24.0,
            page_type_layouts: HashMap::new(),
            page_constraints,
            product_id: Some("hardcover".into()),
        }
    }

    fn product() -> ProductSpec {
        ProductSpec {
            id: "hardcover".into(),
            min_page_count: 24,
            max_page_count: 48,
            page_count_increment: 2,
            blank_pages: 2,
            has_spine: true,
        }
    }

    #[test]
    fn layout_constraints_win_and_unset_fields_are_filled() {
        let declared = LayoutPageConstraints {
            min_pages: None,
            max_pages: Some(32),
            page_multiple: None,
        };
        assert_eq!(
            resolve(&layout(Some(declared)), Some(&product())),
            PageConstraints {
                min_pages: 0,
                max_pages: 32,
                page_multiple: 4
            }
        );
    }

    #[test]
    fn empty_layout_constraints_defer_to_the_product() {
        let resolved = resolve(
            &layout(Some(LayoutPageConstraints::default())),
            Some(&product()),
        );
        assert_eq!(
            resolved,
            PageConstraints {
                min_pages: 24,
                max_pages: 48,
                page_multiple: 2
            }
        );
    }

    #[test]
    fn without_layout_nor_product_the_default_applies() {
        assert_eq!(resolve(&layout(None), None), PageConstraints::default());
    }

    #[test]
    fn a_zero_multiple_from_the_product_is_replaced() {
        let mut product = product();
        product.page_count_increment = 0;
        assert_eq!(resolve(&layout(None), Some(&product)).page_multiple, 4);
    }
}
