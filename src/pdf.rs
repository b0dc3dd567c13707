use lopdf::content::Operation;
use lopdf::Object;
use nalgebra_glm as glm;
use std::{collections::BTreeMap, io::BufWriter, mem};
use time::OffsetDateTime;

use crate::error::ContextError;
use crate::font::FontFace;

/// Control point distance of a cubic Bézier approximating a quarter circle of unit radius.
const QUARTER_CIRCLE_KAPPA: f32 = 0.552_284_8;

/// The low-level image representation for a PDF document.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// Width of the image in pixels.
    pub width: u32,
    /// Height of the image in pixels.
    pub height: u32,
    /// Bits per color component, 8 for everything decoded through the `image` crate.
    pub bits_per_component: u16,
    /// Should the image be interpolated when scaled?
    pub interpolate: bool,
    /// Interleaved RGB samples.
    pub image_data: Vec<u8>,
    /// Alpha samples, embedded as a soft mask. `None` means the image is opaque.
    pub soft_mask: Option<Vec<u8>>,
}

impl ImageXObject {
    /// Splits a decoded image into its color samples and, if it has one, its alpha channel.
    pub fn from_dynamic_image(image: &image::DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (image_data, soft_mask) = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            let mut color = Vec::with_capacity((width * height * 3) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            for pixel in rgba.pixels() {
                color.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
            }
            // A fully opaque alpha channel is not worth a soft mask
            let soft_mask = alpha.iter().any(|value| *value < u8::MAX).then_some(alpha);
            (color, soft_mask)
        } else {
            (image.to_rgb8().into_raw(), None)
        };

        ImageXObject {
            width,
            height,
            bits_per_component: 8,
            interpolate: true,
            image_data,
            soft_mask,
        }
    }

    /// Inserts the image (and its soft mask) into the document, returning the image object.
    fn insert_into_document(&self, inner_document: &mut lopdf::Document) -> lopdf::ObjectId {
        use lopdf::Object::*;

        let mut image_dictionary = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("XObject".into())),
            ("Subtype", Name("Image".into())),
            ("Width", Integer(self.width as i64)),
            ("Height", Integer(self.height as i64)),
            ("ColorSpace", Name("DeviceRGB".into())),
            ("BitsPerComponent", Integer(self.bits_per_component as i64)),
            ("Interpolate", Boolean(self.interpolate)),
        ]);

        if let Some(alpha) = &self.soft_mask {
            let soft_mask_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", Name("XObject".into())),
                ("Subtype", Name("Image".into())),
                ("Width", Integer(self.width as i64)),
                ("Height", Integer(self.height as i64)),
                ("ColorSpace", Name("DeviceGray".into())),
                ("BitsPerComponent", Integer(self.bits_per_component as i64)),
            ]);
            let soft_mask_id =
                inner_document.add_object(lopdf::Stream::new(soft_mask_dictionary, alpha.clone()));
            image_dictionary.set("SMask", Reference(soft_mask_id));
        }

        inner_document.add_object(lopdf::Stream::new(
            image_dictionary,
            self.image_data.clone(),
        ))
    }
}

/// Named reference to an image `XObject` of a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct XObjectReference(String);

impl XObjectReference {
    /// Creates a new reference for an `XObject` from a number.
    pub fn new(index: usize) -> Self {
        Self(format!("X{index}"))
    }
}

/// One leaf of a PDF document. Coordinates of its operations are in points relative to the
/// bottom-left corner of the trim box.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// The number of the page in the document, starting from 1.
    pub(crate) number: usize,
    /// Trim width in points.
    pub width: f32,
    /// Trim height in points.
    pub height: f32,
    /// Bleed added on every side of the trim box, in points.
    pub bleed: f32,
    pub(crate) operations: Vec<Operation>,
}

impl PdfPage {
    /// The content stream of the page, shifted so that the trim box starts at the bleed.
    fn content_stream(&self) -> Result<lopdf::Stream, ContextError> {
        let mut operations = Vec::with_capacity(self.operations.len() + 3);
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                self.bleed.into(),
                self.bleed.into(),
            ],
        ));
        operations.extend(self.operations.iter().cloned());
        operations.push(Operation::new("Q", vec![]));

        let content = lopdf::content::Content { operations }.encode().map_err(|error| {
            ContextError::with_error(
                format!("Failed to encode the content of page {}", self.number),
                &error,
            )
        })?;

        Ok(lopdf::Stream::new(lopdf::Dictionary::new(), content))
    }
}

/// Converts millimeters to points, the unit the PDF specification works with.
pub fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * 2.834646
}

/// This struct represents the actual PDF document on a high-level. It is an interface to the actual underlying
/// `lopdf::Document` with the addition of the pages, the fonts and the images used in the document.
pub struct PdfDocument {
    /// The association between the fonts ID, the object it is represented by and its face.
    fonts: BTreeMap<String, (lopdf::ObjectId, FontFace)>,
    /// The image `XObject`s already inserted into the underlying document.
    images: BTreeMap<XObjectReference, lopdf::ObjectId>,
    /// The underlying PDF document.
    pub inner_document: lopdf::Document,
    /// The identifier of the document, it is used to in order to set the PDF `ID` tag.
    pub identifier: String,
    pub(crate) pages: Vec<PdfPage>,
}

impl PdfDocument {
    /// Create a new `PdfDocument` by defaulting the underlying PDF document to version 1.5
    /// of the PDF specification and customly specifying the PDF identifier.
    pub fn new(pdf_document_identifier: String) -> Self {
        PdfDocument {
            fonts: BTreeMap::default(),
            images: BTreeMap::default(),
            inner_document: lopdf::Document::with_version("1.5"),
            identifier: pdf_document_identifier,
            pages: Vec::new(),
        }
    }

    /// Adds an empty page with the given trim size and bleed, all in points, and returns its index.
    pub fn add_page(&mut self, page_width: f32, page_height: f32, bleed: f32) -> usize {
        self.pages.push(PdfPage {
            number: self.pages.len() + 1,
            width: page_width,
            height: page_height,
            bleed,
            operations: Vec::new(),
        });

        self.pages.len() - 1
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Registers a font with the document and returns the index to write text with.
    pub fn add_font(&mut self, font: &FontFace) -> usize {
        let face_identifier = format!("F{}", self.fonts.len());
        let font_object_id = self.inner_document.new_object_id();
        self.fonts
            .insert(face_identifier, (font_object_id, font.clone()));

        self.fonts.len() - 1
    }

    /// Inserts an image into the document once; the reference can then be drawn on any page.
    pub fn add_image(&mut self, image: &ImageXObject) -> XObjectReference {
        let reference = XObjectReference::new(self.images.len());
        let image_id = image.insert_into_document(&mut self.inner_document);
        self.images.insert(reference.clone(), image_id);

        reference
    }

    /// Writes one line of text with its baseline starting at `caret_position`.
    #[allow(clippy::too_many_arguments)]
    pub fn write_text_to_page(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        text: &str,
        font_index: usize,
        font_size: f32,
        caret_position: [f32; 2],
    ) -> Result<(), ContextError> {
        let face_identifier = format!("F{font_index}");
        let (_, font) = self.fonts.get(&face_identifier).ok_or_else(|| {
            ContextError::with_context(format!(
                "Failed to find font {} into the fonts map",
                font_index
            ))
        })?;
        // Encode before touching the page so that a failing line leaves nothing behind
        let (text_bytes, string_format) = font.encode(text)?;

        let [x, y] = caret_position;
        let [r, g, b] = color;
        self.add_operations_to_page(
            page_index,
            vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(face_identifier.into_bytes()), font_size.into()],
                ),
                Operation::new("Td", vec![x.into(), y.into()]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("Tj", vec![Object::String(text_bytes, string_format)]),
                Operation::new("ET", vec![]),
            ],
        )
    }

    /// Fills an axis-aligned rectangle given as `[x, y, width, height]`.
    pub fn fill_rectangle(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        rectangle: [f32; 4],
    ) -> Result<(), ContextError> {
        let [x, y, width, height] = rectangle;
        let [r, g, b] = color;
        self.add_operations_to_page(
            page_index,
            vec![
                Operation::new("q", vec![]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new(
                    "re",
                    vec![x.into(), y.into(), width.into(), height.into()],
                ),
                Operation::new("f", vec![]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    /// Fills a rectangle whose four corners are rounded by `radius`. Each corner is the quadrant
    /// of a circle joined to its neighbours by the straight edges; the radius is clamped to half
    /// of the shorter side.
    pub fn fill_rounded_rectangle(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        rectangle: [f32; 4],
        radius: f32,
    ) -> Result<(), ContextError> {
        let [x, y, width, height] = rectangle;
        let radius = radius.min(width / 2.0).min(height / 2.0);
        if radius <= 0.0 {
            return self.fill_rectangle(page_index, color, rectangle);
        }

        let control = radius * (1.0 - QUARTER_CIRCLE_KAPPA);
        let (left, bottom, right, top) = (x, y, x + width, y + height);
        let point = |px: f32, py: f32| -> Vec<Object> { vec![px.into(), py.into()] };
        let curve = |points: [f32; 6]| -> Operation {
            Operation::new("c", points.iter().map(|value| (*value).into()).collect())
        };

        let [r, g, b] = color;
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("m", point(left + radius, bottom)),
            Operation::new("l", point(right - radius, bottom)),
            // Bottom-right quadrant
            curve([
                right - control,
                bottom,
                right,
                bottom + control,
                right,
                bottom + radius,
            ]),
            Operation::new("l", point(right, top - radius)),
            // Top-right quadrant
            curve([right, top - control, right - control, top, right - radius, top]),
            Operation::new("l", point(left + radius, top)),
            // Top-left quadrant
            curve([left + control, top, left, top - control, left, top - radius]),
            Operation::new("l", point(left, bottom + radius)),
            // Bottom-left quadrant
            curve([
                left,
                bottom + control,
                left + control,
                bottom,
                left + radius,
                bottom,
            ]),
            Operation::new("h", vec![]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ];

        self.add_operations_to_page(page_index, operations)
    }

    /// Draws an image previously added to the document into `[x, y, width, height]`.
    pub fn draw_image_to_page(
        &mut self,
        page_index: usize,
        image: &XObjectReference,
        rectangle: [f32; 4],
    ) -> Result<(), ContextError> {
        if !self.images.contains_key(image) {
            return Err(ContextError::with_context(format!(
                "Failed to find the image {:?} in the document",
                image.0
            )));
        }

        // Images are drawn into the unit square, so the matrix maps it onto the target rectangle
        let [x, y, width, height] = rectangle;
        let transformation =
            glm::translation2d(&glm::vec2(x, y)) * glm::scaling2d(&glm::vec2(width, height));
        let matrix_operands = [
            transformation[(0, 0)],
            transformation[(1, 0)],
            transformation[(0, 1)],
            transformation[(1, 1)],
            transformation[(0, 2)],
            transformation[(1, 2)],
        ]
        .into_iter()
        .map(Object::from)
        .collect();

        self.add_operations_to_page(
            page_index,
            vec![
                Operation::new("q", vec![]),
                Operation::new("cm", matrix_operands),
                Operation::new("Do", vec![Object::Name(image.0.clone().into_bytes())]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    /// Write the pages, fonts and images so far specified to the underlying document and finalize it.
    pub fn write_all(&mut self, instance_id: &str, title: &str) -> Result<(), ContextError> {
        use lopdf::Object::*;
        use lopdf::StringFormat::*;

        let now = OffsetDateTime::now_utc();
        let producer = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let document_info = lopdf::Dictionary::from_iter(vec![
            ("Trapped", "False".into()),
            (
                "CreationDate",
                String(to_pdf_timestamp_format(&now).into_bytes(), Literal),
            ),
            (
                "ModDate",
                String(to_pdf_timestamp_format(&now).into_bytes(), Literal),
            ),
            ("Title", String(pdf_text_string(title), Literal)),
            ("Creator", String(producer.clone().into_bytes(), Literal)),
            ("Producer", String(producer.into_bytes(), Literal)),
            (
                "Identifier",
                String(self.identifier.clone().into_bytes(), Literal),
            ),
        ]);
        let document_info_id = self.inner_document.add_object(Dictionary(document_info));

        let pages_id = self.inner_document.new_object_id();
        let catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", "Catalog".into()),
            ("PageLayout", "OneColumn".into()),
            ("PageMode", "UseNone".into()),
            ("Pages", Reference(pages_id)),
        ]);
        let catalog_id = self.inner_document.add_object(catalog);

        self.inner_document
            .trailer
            .set("Root", Reference(catalog_id));
        self.inner_document
            .trailer
            .set("Info", Reference(document_info_id));
        self.inner_document.trailer.set(
            "ID",
            Array(vec![
                String(self.identifier.clone().into_bytes(), Literal),
                String(instance_id.as_bytes().to_vec(), Literal),
            ]),
        );

        let fonts_dictionary = self.insert_fonts_into_document();
        let fonts_dictionary_id = self.inner_document.add_object(fonts_dictionary);
        let xobjects_dictionary: lopdf::Dictionary = self
            .images
            .iter()
            .map(|(reference, image_id)| (reference.0.clone(), Reference(*image_id)))
            .collect();
        let xobjects_dictionary_id = self.inner_document.add_object(xobjects_dictionary);
        let resources_id = self
            .inner_document
            .add_object(lopdf::Dictionary::from_iter(vec![
                ("Font", Reference(fonts_dictionary_id)),
                ("XObject", Reference(xobjects_dictionary_id)),
            ]));

        let mut page_ids = Vec::<lopdf::Object>::with_capacity(self.pages.len());
        for page in self.pages.iter() {
            let media_width = page.width + 2.0 * page.bleed;
            let media_height = page.height + 2.0 * page.bleed;
            let media_box: Object =
                vec![0.into(), 0.into(), media_width.into(), media_height.into()].into();
            let trim_box: Object = vec![
                page.bleed.into(),
                page.bleed.into(),
                (page.bleed + page.width).into(),
                (page.bleed + page.height).into(),
            ]
            .into();

            let page_content_id = self.inner_document.add_object(page.content_stream()?);
            let page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", "Page".into()),
                ("Rotate", Integer(0)),
                ("MediaBox", media_box.clone()),
                ("BleedBox", media_box),
                ("TrimBox", trim_box),
                ("Parent", Reference(pages_id)),
                ("Resources", Reference(resources_id)),
                ("Contents", Reference(page_content_id)),
            ]);
            page_ids.push(Reference(self.inner_document.add_object(page_dictionary)));
        }

        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", "Pages".into()),
            ("Count", Integer(page_ids.len() as i64)),
            ("Kids", Array(page_ids)),
        ]);
        self.inner_document
            .objects
            .insert(pages_id, Dictionary(pages));

        Ok(())
    }

    /// Optimize the PDF document (only superficially).
    pub fn optimize(&mut self) {
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
    }

    /// Save the `PdfDocument` to bytes in order for it to be written to a file or further processed.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error("Error while saving the PDF document to bytes", &error)
        })?;
        mem::drop(writer);

        Ok(pdf_document_bytes)
    }

    /// Converts the fonts into a dictionary and inserts them into the document.
    fn insert_fonts_into_document(&mut self) -> lopdf::Dictionary {
        let mut font_dictionary = lopdf::Dictionary::new();

        for (face_identifier, (font_object_id, font)) in self.fonts.iter() {
            let collected_font_dictionary =
                font.insert_into_document(&mut self.inner_document, face_identifier);
            self.inner_document.objects.insert(
                *font_object_id,
                lopdf::Object::Dictionary(collected_font_dictionary),
            );
            font_dictionary.set(
                face_identifier.clone(),
                lopdf::Object::Reference(*font_object_id),
            );
        }

        font_dictionary
    }

    fn add_operations_to_page(
        &mut self,
        page_index: usize,
        operations: Vec<Operation>,
    ) -> Result<(), ContextError> {
        let pdf_page = self.pages.get_mut(page_index).ok_or_else(|| {
            ContextError::with_context(format!("Failed to find the page with index {}", page_index))
        })?;
        pdf_page.operations.extend(operations);

        Ok(())
    }
}

/// Encodes a text string for the document information dictionary. PDFDocEncoding agrees with
/// Latin-1 on the printable range, everything else is replaced.
fn pdf_text_string(text: &str) -> Vec<u8> {
    text.chars()
        .map(|character| match character as u32 {
            0x20..=0x7E | 0xA0..=0xFF => character as u8,
            _ => b'?',
        })
        .collect()
}

/// Formats the given time so that it matches what the PDF specification expects.
/// An example of it is the following: D:20170505150224+02'00'.
fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}
