use std::collections::HashMap;

use crate::fitting::FitSettings;
use crate::font::TextMeasure;
use crate::layout::{parse_hex_color, Leaf, LayoutSpec, PageCategory, Rect, TextBox};
use crate::pdf::ImageXObject;
use crate::placement::place;
use crate::story::StoryPage;
use crate::text::{block_height, sanitize, wrap};

/// Distance from the top of a line box to its baseline, as a fraction of the font size.
const BASELINE_RATIO: f32 = 0.8;

pub const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Something to draw on a leaf. Coordinates are PDF points with a bottom-left origin at the
/// corner of the trim box.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafElement {
    Image {
        /// The illustration URI, resolved against the prefetched images by the assembler.
        source: String,
        rectangle: [f32; 4],
    },
    Rectangle {
        color: [f32; 3],
        rectangle: [f32; 4],
        corner_radius: f32,
    },
    Text {
        line: String,
        baseline: [f32; 2],
        font_size: f32,
        color: [f32; 3],
    },
}

/// One physical page, ready to be written into any of the documents.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLeaf {
    pub width: f32,
    pub height: f32,
    pub bleed: f32,
    pub elements: Vec<LeafElement>,
}

impl RenderedLeaf {
    pub fn blank(width: f32, height: f32, bleed: f32) -> Self {
        RenderedLeaf {
            width,
            height,
            bleed,
            elements: Vec::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Picks the text color of a box: its explicit color, else black or white depending on the
/// luma of its background, else black.
pub fn text_color(text_box: &TextBox) -> [f32; 3] {
    if let Some(color) = text_box.text_color.as_deref() {
        match parse_hex_color(color) {
            Some(color) => return color,
            None => log::warn!("Ignoring the unparsable text color {:?}", color),
        }
    }

    match text_box.background_color.as_deref().and_then(parse_hex_color) {
        Some([r, g, b]) if 0.299 * r + 0.587 * g + 0.114 * b > 0.5 => BLACK,
        Some(_) => WHITE,
        None => BLACK,
    }
}

/// Draws logical pages onto leaves with one font size for the whole book.
pub struct PageRenderer<'a> {
    pub layout: &'a LayoutSpec,
    pub font: &'a dyn TextMeasure,
    pub font_size: f32,
    /// Decoded illustrations keyed by URI; a page whose image is missing here is drawn without it.
    pub images: &'a HashMap<String, ImageXObject>,
    pub settings: FitSettings,
    pub distortion_threshold_percent: f32,
}

impl<'a> PageRenderer<'a> {
    fn line_height(&self) -> f32 {
        self.font_size * self.settings.line_height_factor
    }

    fn blank_leaf(&self) -> RenderedLeaf {
        RenderedLeaf::blank(self.layout.width, self.layout.height, self.layout.bleed)
    }

    /// Converts a top-left rectangle into the `[x, y, width, height]` form of the PDF layer.
    fn to_pdf_rectangle(&self, rect: &Rect) -> [f32; 4] {
        [
            rect.x,
            self.layout.height - rect.y - rect.height,
            rect.width,
            rect.height,
        ]
    }

    /// Renders one logical page onto one leaf, or two for content pages of a spread layout.
    pub fn render(&self, page: &StoryPage) -> Vec<RenderedLeaf> {
        let resolved = self
            .layout
            .resolve(page.kind, self.settings.default_text_margin);

        match resolved.category {
            PageCategory::Blank => vec![self.blank_leaf()],
            PageCategory::Title => vec![self.render_title(page, resolved.text_box.as_ref())],
            PageCategory::FrontCover | PageCategory::BackCover | PageCategory::Content => {
                let leaves = self.layout.leaves_for(page.kind);
                let targets: Vec<Option<Leaf>> = if leaves == 2 {
                    vec![Some(Leaf::First), Some(Leaf::Second)]
                } else {
                    vec![None]
                };

                targets
                    .into_iter()
                    .map(|target| {
                        let mut leaf = self.blank_leaf();
                        let on_target = |leaf: Option<Leaf>| {
                            target.is_none() || leaf.is_none() || leaf == target
                        };
                        if let Some(image_box) = resolved
                            .image_box
                            .as_ref()
                            .filter(|image_box| image_box.enabled && on_target(image_box.leaf))
                        {
                            self.draw_image(&mut leaf, page, &image_box.rect);
                        }
                        if let Some(text_box) = resolved
                            .text_box
                            .as_ref()
                            .filter(|text_box| text_box.enabled && on_target(text_box.leaf))
                        {
                            self.draw_text_box(&mut leaf, page, text_box);
                        }
                        leaf
                    })
                    .collect()
            }
        }
    }

    fn draw_image(&self, leaf: &mut RenderedLeaf, page: &StoryPage, image_box: &Rect) {
        let Some(source) = page.image.as_deref() else {
            return;
        };
        let Some(image) = self.images.get(source) else {
            log::debug!(
                "Page {} is drawn without its image {:?}",
                page.sequence,
                source
            );
            return;
        };

        let placement = place(
            image.width as f32,
            image.height as f32,
            image_box,
            self.distortion_threshold_percent,
        );
        let drawn = Rect::new(
            image_box.x + placement.offset_x,
            image_box.y + placement.offset_y,
            placement.draw_width,
            placement.draw_height,
        );
        leaf.elements.push(LeafElement::Image {
            source: source.to_string(),
            rectangle: self.to_pdf_rectangle(&drawn),
        });
    }

    fn draw_text_box(&self, leaf: &mut RenderedLeaf, page: &StoryPage, text_box: &TextBox) {
        let Some(text) = page.display_text() else {
            return;
        };

        if let Some(background) = text_box.background_color.as_deref() {
            match parse_hex_color(background) {
                Some(color) => leaf.elements.push(LeafElement::Rectangle {
                    color,
                    rectangle: self.to_pdf_rectangle(&text_box.rect),
                    corner_radius: text_box.corner_radius,
                }),
                None => log::warn!("Ignoring the unparsable background color {:?}", background),
            }
        }

        let padding = self.settings.padding;
        let available_width = text_box.rect.width - 2.0 * padding;
        let lines = wrap(&sanitize(text), self.font, self.font_size, available_width);
        let color = text_color(text_box);

        let mut line_top = text_box.rect.y + padding;
        for line in lines {
            if line.is_empty() {
                line_top += self.line_height() / 2.0;
                continue;
            }
            match self.font.text_width(&line, self.font_size) {
                Ok(line_width) => {
                    let centering = (available_width - line_width).max(0.0) / 2.0;
                    let x = text_box.rect.x + padding + centering;
                    self.push_line(leaf, line, x, line_top, color);
                }
                Err(error) => log::warn!(
                    "Skipping a line of page {} which cannot be measured: {}",
                    page.sequence,
                    error
                ),
            }
            line_top += self.line_height();
        }
    }

    /// The title block is centered on the whole leaf, each line on its own.
    fn render_title(&self, page: &StoryPage, text_box: Option<&TextBox>) -> RenderedLeaf {
        let mut leaf = self.blank_leaf();
        let Some(text) = page.display_text() else {
            return leaf;
        };

        let margin = self
            .settings
            .default_text_margin
            .min(self.layout.width / 4.0);
        let lines = wrap(
            &sanitize(text),
            self.font,
            self.font_size,
            self.layout.width - 2.0 * margin,
        );
        let color = text_box
            .filter(|text_box| text_box.text_color.is_some())
            .map(text_color)
            .unwrap_or(BLACK);

        let mut line_top = (self.layout.height - block_height(&lines, self.line_height())) / 2.0;
        for line in lines {
            if line.is_empty() {
                line_top += self.line_height() / 2.0;
                continue;
            }
            match self.font.text_width(&line, self.font_size) {
                Ok(line_width) => {
                    let x = (self.layout.width - line_width) / 2.0;
                    self.push_line(&mut leaf, line, x, line_top, color);
                }
                Err(error) => log::warn!(
                    "Skipping a title line of page {} which cannot be measured: {}",
                    page.sequence,
                    error
                ),
            }
            line_top += self.line_height();
        }

        leaf
    }

    fn push_line(
        &self,
        leaf: &mut RenderedLeaf,
        line: String,
        x: f32,
        line_top: f32,
        color: [f32; 3],
    ) {
        let baseline = line_top + self.font_size * BASELINE_RATIO;
        leaf.elements.push(LeafElement::Text {
            line,
            baseline: [x, self.layout.height - baseline],
            font_size: self.font_size,
            color,
        });
    }
}
