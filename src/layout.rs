use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::story::PageKind;

/// The leaf of a two-leaf spread a box is drawn onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Leaf {
    First,
    Second,
}

impl TryFrom<u8> for Leaf {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Leaf::First),
            2 => Ok(Leaf::Second),
            other => Err(format!("A box leaf must be 1 or 2, found {}", other)),
        }
    }
}

impl From<Leaf> for u8 {
    fn from(leaf: Leaf) -> Self {
        match leaf {
            Leaf::First => 1,
            Leaf::Second => 2,
        }
    }
}

/// A rectangle in points, with a top-left origin relative to the trim area of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBox {
    #[serde(flatten)]
    pub rect: Rect,
    /// `None` means the box is drawn on every leaf of a spread.
    #[serde(default)]
    pub leaf: Option<Leaf>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBox {
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub corner_radius: f32,
    #[serde(default)]
    pub leaf: Option<Leaf>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// The boxes of one page kind. A missing box falls back to the full-page default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTypeLayout {
    #[serde(default)]
    pub image_box: Option<ImageBox>,
    #[serde(default)]
    pub text_box: Option<TextBox>,
}

/// Page-count constraints declared directly on a layout; unset fields are filled in by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPageConstraints {
    #[serde(default)]
    pub min_pages: Option<u32>,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub page_multiple: Option<u32>,
}

/// The physical geometry of a book and the boxes of each page kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSpec {
    pub id: String,
    /// Trim width of one leaf in points.
    pub width: f32,
    /// Trim height of one leaf in points.
    pub height: f32,
    #[serde(default)]
    pub bleed: f32,
    #[serde(default = "one_leaf_per_spread")]
    pub leaves_per_spread: u8,
    pub font_family: String,
    pub max_font_size: f32,
    #[serde(default)]
    pub page_type_layouts: HashMap<PageCategory, PageTypeLayout>,
    #[serde(default)]
    pub page_constraints: Option<LayoutPageConstraints>,
    /// Identifier of the linked product, resolved through the configuration provider.
    #[serde(default)]
    pub product_id: Option<String>,
}

fn one_leaf_per_spread() -> u8 {
    1
}

/// The binder's product, linked from a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpec {
    pub id: String,
    #[serde(default)]
    pub min_page_count: u32,
    #[serde(default)]
    pub max_page_count: u32,
    #[serde(default)]
    pub page_count_increment: u32,
    /// Endpapers added by the binder outside of the rendered interior.
    #[serde(default)]
    pub blank_pages: u32,
    #[serde(default)]
    pub has_spine: bool,
}

/// The canonical layout category a page kind maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    FrontCover,
    BackCover,
    Title,
    Content,
    Blank,
}

impl From<PageKind> for PageCategory {
    fn from(kind: PageKind) -> Self {
        match kind {
            PageKind::CoverFront => PageCategory::FrontCover,
            PageKind::CoverBack => PageCategory::BackCover,
            PageKind::TitlePage => PageCategory::Title,
            PageKind::Content => PageCategory::Content,
            PageKind::Blank => PageCategory::Blank,
        }
    }
}

/// The boxes a page is drawn with once defaults have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub category: PageCategory,
    pub image_box: Option<ImageBox>,
    pub text_box: Option<TextBox>,
}

impl LayoutSpec {
    /// Maps the page kind to its category and returns the boxes of that category, falling back
    /// to a full-bleed image and a text box inset by `text_margin` on every side.
    pub fn resolve(&self, kind: PageKind, text_margin: f32) -> ResolvedLayout {
        let category = PageCategory::from(kind);
        if category == PageCategory::Blank {
            return ResolvedLayout {
                category,
                image_box: None,
                text_box: None,
            };
        }

        let explicit = self.page_type_layouts.get(&category);
        let image_box = explicit
            .and_then(|layout| layout.image_box.clone())
            .unwrap_or_else(|| self.default_image_box());
        let text_box = explicit
            .and_then(|layout| layout.text_box.clone())
            .unwrap_or_else(|| self.default_text_box(text_margin));

        ResolvedLayout {
            category,
            image_box: Some(image_box),
            text_box: Some(text_box),
        }
    }

    /// How many physical leaves a page of the given kind occupies.
    pub fn leaves_for(&self, kind: PageKind) -> usize {
        match PageCategory::from(kind) {
            PageCategory::Content if self.leaves_per_spread == 2 => 2,
            PageCategory::Content
            | PageCategory::FrontCover
            | PageCategory::BackCover
            | PageCategory::Title
            | PageCategory::Blank => 1,
        }
    }

    pub fn default_image_box(&self) -> ImageBox {
        ImageBox {
            rect: Rect::new(
                -self.bleed,
                -self.bleed,
                self.width + 2.0 * self.bleed,
                self.height + 2.0 * self.bleed,
            ),
            leaf: None,
            enabled: true,
        }
    }

    pub fn default_text_box(&self, text_margin: f32) -> TextBox {
        let horizontal_margin = text_margin.min(self.width / 4.0);
        let vertical_margin = text_margin.min(self.height / 4.0);
        TextBox {
            rect: Rect::new(
                horizontal_margin,
                vertical_margin,
                self.width - 2.0 * horizontal_margin,
                self.height - 2.0 * vertical_margin,
            ),
            background_color: None,
            text_color: None,
            corner_radius: 0.0,
            leaf: None,
            enabled: true,
        }
    }

    /// Rejects geometry the renderer cannot work with.
    pub fn validate(&self, minimum_font_size: f32) -> Result<(), GenerationError> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(GenerationError::Validation(format!(
                "Layout {:?} has a non-positive size {}x{}",
                self.id, self.width, self.height
            )));
        }
        if self.bleed < 0.0 {
            return Err(GenerationError::Validation(format!(
                "Layout {:?} has a negative bleed",
                self.id
            )));
        }
        if !matches!(self.leaves_per_spread, 1 | 2) {
            return Err(GenerationError::Validation(format!(
                "Layout {:?} has {} leaves per spread, only 1 or 2 are supported",
                self.id, self.leaves_per_spread
            )));
        }
        if self.max_font_size < minimum_font_size {
            return Err(GenerationError::Validation(format!(
                "Layout {:?} has a maximum font size {} below the minimum {}",
                self.id, self.max_font_size, minimum_font_size
            )));
        }

        Ok(())
    }
}

/// Parses `#RRGGBB` or `#RGB` into RGB components between 0 and 1.
pub fn parse_hex_color(color: &str) -> Option<[f32; 3]> {
    let hex = color.trim().strip_prefix('#')?;
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|digit| [digit, digit]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |index: usize| {
        expanded
            .get(index..index + 2)
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .map(|value| value as f32 / 255.0)
    };

    Some([channel(0)?, channel(2)?, channel(4)?])
}
