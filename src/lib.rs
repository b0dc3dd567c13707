//! Storybook Press turns the ordered pages of an illustrated children's story into the three
//! print-ready PDF documents a binder expects: a combined preview, a cover document (front cover,
//! spine and back cover) and an interior document whose page count satisfies the binder's
//! minimum, maximum and page multiple.
//!
//! The entry point is the `Generator` of the `generator` module, whose `generate` method runs a
//! whole generation: the pages are loaded and validated, the page constraints are resolved and
//! applied to the interior, one font size is fitted for the whole book, every page is rendered
//! onto its leaves, the three documents are built concurrently and finally published atomically.
//! All the services the engine depends on (page content, layouts, object storage, status
//! records and the audit log) are traits of the `collaborators` module.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

/// This module contains the `ContextError` type which is the low-level error type used throughout this library,
/// the `GenerationError` taxonomy returned by a generation and the `BestEffort` outcome of work which may degrade.
pub mod error;

/// The tunables of the engine, loaded from a JSON file in which every field is optional.
pub mod config;

/// Story pages, their kinds and the validation of their sequence.
pub mod story;

/// The geometry of a book: trim size, bleed, spreads and the boxes of every page kind.
///
/// Every length is expressed in points and every box has its origin at the top-left corner of the trim area
/// of its leaf. The `LayoutSpec::resolve` method maps a page kind to the boxes it is drawn with.
pub mod layout;

/// Sanitization of the story text into characters the print fonts can encode, and its greedy wrapping into lines.
pub mod text;

/// The search for the largest font size at which a text fits its box, and the unified size of a whole book.
pub mod fitting;

/// Resolution of the page constraints from the layout, its linked product or the defaults.
pub mod constraints;

/// Padding and truncation of the interior page count so that it satisfies the page constraints.
///
/// The order in which the constraints are applied matters: first the minimum, then the alignment of the
/// bound total on the page multiple, then the maximum, and finally the alignment again under the maximum.
pub mod pagination;

/// The choice between stretching an illustration over its box and letterboxing it.
pub mod placement;

/// The fonts a book can be typeset in: the built-in Helvetica and the TrueType fonts embedded as
/// `Type0` fonts, both measured through the `TextMeasure` trait.
pub mod font;

/// The module were the `PdfDocument` interface for working with PDF documents is presented.
///
/// # Disclaimer
///
/// This work was partially adapted from the one of [fschutt](https://github.com/fschutt) for the crate [printpdf](https://github.com/fschutt/printpdf).
/// The [specification for the PDF format](https://opensource.adobe.com/dc-acrobat-sdk-docs/pdfstandards/PDF32000_2008.pdf)
/// was also briefly studied. The identifiers of the documents are given by the caller, so that the
/// output only depends on its inputs and the creation date.
///
/// # Introduction
///
/// The main component of this module is the struct `PdfDocument`. For it, convenience functions such as `add_page`,
/// `add_font`, `add_image`, `write_text_to_page`, `fill_rounded_rectangle`, `draw_image_to_page`, `write_all` and
/// `save_to_bytes` allow the caller to build a print document leaf by leaf, while the complexity of the PDF objects
/// stays hidden below a curtain of private methods. Every page carries a trim box and a bleed box.
pub mod pdf;

/// Drawing of one logical page onto one leaf, or two for the content pages of a spread layout.
pub mod renderer;

/// Assembly of the rendered leaves into the combined, cover and interior documents.
pub mod assembler;

/// The layouts and products bundled with the engine, and the provider falling back to them.
pub mod catalog;

/// The traits of the services the engine consumes.
pub mod collaborators;

/// In-memory implementations of the collaborators, and the file-system ones used by the command line.
pub mod memory;

/// Time-bounded fetching and decoding of the illustrations.
pub mod fetcher;

/// The all-or-nothing upload of the three documents.
pub mod publisher;

/// The orchestration of a generation run.
pub mod generator;
