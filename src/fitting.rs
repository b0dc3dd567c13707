use crate::config::EngineConfiguration;
use crate::font::TextMeasure;
use crate::layout::{LayoutSpec, PageCategory};
use crate::story::StoryPage;
use crate::text::{block_height, sanitize, wrap};

/// The knobs of the font fitting loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSettings {
    /// The size the loop never goes below, even if the text still overflows.
    pub minimum_font_size: f32,
    pub line_height_factor: f32,
    /// Inner padding of the box, applied on every side.
    pub padding: f32,
    /// Margin of the default text box, for page kinds without an explicit one.
    pub default_text_margin: f32,
}

impl From<&EngineConfiguration> for FitSettings {
    fn from(configuration: &EngineConfiguration) -> Self {
        FitSettings {
            minimum_font_size: configuration.minimum_font_size,
            line_height_factor: configuration.line_height_factor,
            padding: configuration.text_box_padding,
            default_text_margin: configuration.default_text_margin,
        }
    }
}

/// The largest size, stepping down by one point from `maximum_font_size`, at which the wrapped
/// text fits into the padded box. Falls back to the minimum size if nothing fits.
pub fn fit_single(
    text: &str,
    font: &dyn TextMeasure,
    maximum_font_size: f32,
    box_width: f32,
    box_height: f32,
    settings: &FitSettings,
) -> f32 {
    let available_width = box_width - 2.0 * settings.padding;
    let available_height = box_height - 2.0 * settings.padding;

    let mut font_size = maximum_font_size;
    while font_size > settings.minimum_font_size {
        let lines = wrap(text, font, font_size, available_width);
        let height = block_height(&lines, font_size * settings.line_height_factor);
        if height <= available_height {
            return font_size;
        }
        font_size -= 1.0;
    }

    settings.minimum_font_size
}

/// One size for the whole book: the smallest of the sizes fitted for every page that carries
/// text in a box. Title and blank pages are laid out centered on the full page and do not vote.
pub fn fit_unified(
    pages: &[StoryPage],
    layout: &LayoutSpec,
    font: &dyn TextMeasure,
    maximum_font_size: f32,
    settings: &FitSettings,
) -> f32 {
    let maximum_font_size = maximum_font_size.max(settings.minimum_font_size);
    let mut unified_font_size = maximum_font_size;

    for page in pages {
        let Some(text) = page.display_text() else {
            continue;
        };
        let resolved = layout.resolve(page.kind, settings.default_text_margin);
        if matches!(resolved.category, PageCategory::Title | PageCategory::Blank) {
            continue;
        }
        let Some(text_box) = resolved.text_box.filter(|text_box| text_box.enabled) else {
            continue;
        };

        let page_font_size = fit_single(
            &sanitize(text),
            font,
            maximum_font_size,
            text_box.rect.width,
            text_box.rect.height,
            settings,
        );
        if page_font_size < unified_font_size {
            log::debug!(
                "Page {} lowers the unified font size from {} to {}",
                page.sequence,
                unified_font_size,
                page_font_size
            );
            unified_font_size = page_font_size;
        }
    }

    unified_font_size
}
