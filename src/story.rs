use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// The semantic role of a story page inside the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    CoverFront,
    CoverBack,
    TitlePage,
    Content,
    Blank,
}

/// One logical unit of the book, as produced by the upstream story pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    /// 1-based, unique and contiguous across the book.
    pub sequence: u32,
    pub kind: PageKind,
    #[serde(default)]
    pub text: Option<String>,
    /// URI of the illustration, either `http(s)://`, `file://` or a bare path.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl StoryPage {
    pub fn new(sequence: u32, kind: PageKind) -> Self {
        StoryPage {
            sequence,
            kind,
            text: None,
            image: None,
            label: None,
        }
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// The display text, if there is any which is not only whitespace.
    pub fn display_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.trim().is_empty())
    }
}

/// A book as returned by the page-content provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Only finalized books can be turned into print artifacts.
    #[serde(default)]
    pub finalized: bool,
    pub pages: Vec<StoryPage>,
}

/// The pages of a validated book, split into the two covers and the interior in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedPages {
    pub front_cover: StoryPage,
    pub back_cover: StoryPage,
    pub interior: Vec<StoryPage>,
}

/// Checks the sequence and cover invariants of the pages and splits them.
pub fn order_pages(pages: &[StoryPage]) -> Result<OrderedPages, GenerationError> {
    let mut sorted = pages.to_vec();
    sorted.sort_by_key(|page| page.sequence);

    for (index, page) in sorted.iter().enumerate() {
        let expected = index as u32 + 1;
        if page.sequence != expected {
            return Err(GenerationError::Validation(format!(
                "Page sequence numbers must be contiguous from 1, expected {} but found {}",
                expected, page.sequence
            )));
        }
    }

    let mut front_cover = None;
    let mut back_cover = None;
    let mut interior = Vec::new();
    for page in sorted {
        let slot = match page.kind {
            PageKind::CoverFront => &mut front_cover,
            PageKind::CoverBack => &mut back_cover,
            PageKind::TitlePage | PageKind::Content | PageKind::Blank => {
                interior.push(page);
                continue;
            }
        };
        if slot.is_some() {
            return Err(GenerationError::Validation(format!(
                "The book has more than one {:?} page",
                page.kind
            )));
        }
        *slot = Some(page);
    }

    match (front_cover, back_cover) {
        (Some(front_cover), Some(back_cover)) => Ok(OrderedPages {
            front_cover,
            back_cover,
            interior,
        }),
        (None, _) => Err(GenerationError::Validation(
            "The book has no front cover".into(),
        )),
        (_, None) => Err(GenerationError::Validation(
            "The book has no back cover".into(),
        )),
    }
}
