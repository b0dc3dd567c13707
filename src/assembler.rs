use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::font::FontFace;
use crate::pdf::{ImageXObject, PdfDocument, XObjectReference};
use crate::renderer::{LeafElement, RenderedLeaf};

/// The three documents produced for every generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Every page in reading order, for previewing only.
    Combined,
    /// Front cover, optional spine and back cover, for the binder.
    Cover,
    /// The interior leaves and their padding, for the printer.
    Interior,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Combined,
        ArtifactKind::Cover,
        ArtifactKind::Interior,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::Combined => "combined",
            ArtifactKind::Cover => "cover",
            ArtifactKind::Interior => "interior",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Every leaf of a book once rendered, shared by the three document builds.
#[derive(Debug, Clone)]
pub struct RenderedBook {
    pub title: String,
    pub width: f32,
    pub height: f32,
    pub bleed: f32,
    pub front_cover: RenderedLeaf,
    pub back_cover: RenderedLeaf,
    /// The interior leaves of the kept pages, in reading order.
    pub interior: Vec<RenderedLeaf>,
    /// Blank leaves appended after the interior.
    pub padding_leaves: u32,
    /// The interior leaf count decided by the page-count adjuster.
    pub expected_interior_leaves: u32,
    /// Width of the spine leaf in points, `None` for products without a spine.
    pub spine_width: Option<f32>,
}

impl RenderedBook {
    fn blank_leaf(&self) -> RenderedLeaf {
        RenderedLeaf::blank(self.width, self.height, self.bleed)
    }

    fn interior_with_padding(&self) -> impl Iterator<Item = RenderedLeaf> + '_ {
        let padding = (0..self.padding_leaves).map(|_| self.blank_leaf());
        self.interior.iter().cloned().chain(padding)
    }

    /// The leaves of one document, in order.
    pub fn leaves(&self, kind: ArtifactKind) -> Vec<RenderedLeaf> {
        match kind {
            ArtifactKind::Cover => {
                let mut leaves = vec![self.front_cover.clone()];
                if let Some(spine_width) = self.spine_width {
                    leaves.push(RenderedLeaf::blank(spine_width, self.height, self.bleed));
                }
                leaves.push(self.back_cover.clone());
                leaves
            }
            ArtifactKind::Interior => {
                let leaves: Vec<RenderedLeaf> = self.interior_with_padding().collect();
                if leaves.len() != self.expected_interior_leaves as usize {
                    log::warn!(
                        "The interior has {} leaves but {} were planned",
                        leaves.len(),
                        self.expected_interior_leaves
                    );
                }
                leaves
            }
            ArtifactKind::Combined => std::iter::once(self.front_cover.clone())
                .chain(self.interior_with_padding())
                .chain(std::iter::once(self.back_cover.clone()))
                .collect(),
        }
    }
}

/// Writes the leaves of one artifact into a PDF document and returns its bytes. Images are
/// embedded once per document however many leaves draw them; an element which cannot be written
/// is skipped with a warning.
pub fn assemble(
    book: &RenderedBook,
    kind: ArtifactKind,
    font: &FontFace,
    images: &HashMap<String, ImageXObject>,
    session_identifier: &str,
) -> Result<Vec<u8>, ContextError> {
    let mut pdf_document = PdfDocument::new(format!("{}-{}", session_identifier, kind));
    let font_index = pdf_document.add_font(font);
    let mut image_references: HashMap<String, XObjectReference> = HashMap::new();

    for leaf in book.leaves(kind) {
        let page_index = pdf_document.add_page(leaf.width, leaf.height, leaf.bleed);
        for element in &leaf.elements {
            let written = match element {
                LeafElement::Image { source, rectangle } => {
                    let reference = match image_references.get(source.as_str()) {
                        Some(reference) => reference.clone(),
                        None => {
                            let Some(image) = images.get(source) else {
                                log::warn!("The image {:?} was not prefetched", source);
                                continue;
                            };
                            let reference = pdf_document.add_image(image);
                            image_references.insert(source.clone(), reference.clone());
                            reference
                        }
                    };
                    pdf_document.draw_image_to_page(page_index, &reference, *rectangle)
                }
                LeafElement::Rectangle {
                    color,
                    rectangle,
                    corner_radius,
                } => pdf_document.fill_rounded_rectangle(
                    page_index,
                    *color,
                    *rectangle,
                    *corner_radius,
                ),
                LeafElement::Text {
                    line,
                    baseline,
                    font_size,
                    color,
                } => pdf_document.write_text_to_page(
                    page_index,
                    *color,
                    line,
                    font_index,
                    *font_size,
                    *baseline,
                ),
            };
            if let Err(error) = written {
                log::warn!(
                    "Skipping an element of leaf {} of the {} document: {}",
                    page_index + 1,
                    kind,
                    error
                );
            }
        }
    }

    log::debug!(
        "Assembled the {} document with {} leaves",
        kind,
        pdf_document.page_count()
    );
    pdf_document.write_all(session_identifier, &format!("{} ({})", book.title, kind))?;
    pdf_document.optimize();
    pdf_document.save_to_bytes()
}
