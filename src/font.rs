use lopdf::{Object, StringFormat};
use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use unicode_normalization::UnicodeNormalization as _;

use crate::config::EngineConfiguration;
use crate::error::ContextError;

/// Anything able to tell how wide a string is when set at a given size, in points.
pub trait TextMeasure {
    /// Fails when the text contains a character the font cannot draw.
    fn text_width(&self, text: &str, font_size: f32) -> Result<f32, ContextError>;
}

/// The family name under which the built-in standard font is known.
pub const HELVETICA: &str = "Helvetica";

/// Advance widths of Helvetica for the printable ASCII range 0x20..=0x7E, in 1/1000 em.
const HELVETICA_ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // 'A'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // 'a'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Advance widths of Helvetica for the Latin-1 range 0xA0..=0xFF, which WinAnsi encodes verbatim.
const HELVETICA_LATIN1_WIDTHS: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // 0xF0
];

/// The standard PDF fonts which are bundled with every viewer and need no embedding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
}

impl StandardFont {
    fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
        }
    }

    /// The WinAnsi code and the width of a character, if the font can draw it.
    fn encode_character(self, character: char) -> Option<(u8, u16)> {
        let codepoint = character as u32;
        match codepoint {
            0x20..=0x7E => Some((
                codepoint as u8,
                HELVETICA_ASCII_WIDTHS[(codepoint - 0x20) as usize],
            )),
            0xA0..=0xFF => Some((
                codepoint as u8,
                HELVETICA_LATIN1_WIDTHS[(codepoint - 0xA0) as usize],
            )),
            _ => None,
        }
    }
}

/// The (insofar) relevant vertical metrics of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct FontMetrics {
    pub ascent: i16,
    pub descent: i16,
    pub units_per_em: u16,
}

/// The (insofar) relevant metrics associated to a single glyph of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlyphMetrics {
    pub width: u32,
    pub height: u32,
}

/// A font face parsed from TTF data, shared between the documents of a run.
#[derive(Clone, Debug)]
pub struct TrueTypeFont {
    family: String,
    bytes: Arc<Vec<u8>>,
    face: Arc<OwnedFace>,
    units_per_em: u16,
}

impl TrueTypeFont {
    pub fn from_bytes(family: &str, data: Vec<u8>) -> Result<Self, ContextError> {
        let face = OwnedFace::from_vec(data.clone(), 0)
            .map_err(|error| ContextError::with_error("Failed to parse font", &error))?;
        let units_per_em = face.as_face_ref().units_per_em();

        Ok(TrueTypeFont {
            family: family.to_string(),
            bytes: Arc::new(data),
            face: Arc::new(face),
            units_per_em,
        })
    }

    fn face(&self) -> &Face<'_> {
        self.face.as_face_ref()
    }

    fn font_metrics(&self) -> FontMetrics {
        FontMetrics {
            ascent: self.face().ascender(),
            descent: self.face().descender(),
            units_per_em: self.units_per_em,
        }
    }

    fn glyph_id(&self, character: char) -> Option<u16> {
        self.face().glyph_index(character).map(|glyph_id| glyph_id.0)
    }

    /// The association between the glyph IDs and the first codepoint mapped onto each of them.
    fn glyph_ids(&self) -> HashMap<u16, char> {
        let Some(unicode_subtables) = self.face().tables().cmap.map(|cmap| {
            cmap.subtables
                .into_iter()
                .filter(|subtable| subtable.is_unicode())
        }) else {
            return HashMap::new();
        };

        let mut glyph_id_to_character =
            HashMap::with_capacity(self.face().number_of_glyphs().into());
        for subtable in unicode_subtables {
            subtable.codepoints(|codepoint| {
                if let Ok(character) = char::try_from(codepoint) {
                    if let Some(glyph_index) = subtable
                        .glyph_index(codepoint)
                        .filter(|index| index.0 > 0)
                    {
                        glyph_id_to_character
                            .entry(glyph_index.0)
                            .or_insert(character);
                    }
                }
            })
        }

        glyph_id_to_character
    }

    fn glyph_metrics(&self, glyph_id: u16) -> Option<GlyphMetrics> {
        let glyph_id = owned_ttf_parser::GlyphId(glyph_id);
        let width = self.face().glyph_hor_advance(glyph_id)? as u32;
        // Fonts without a bounding box for the glyph get a full em as height
        let height = self
            .face()
            .glyph_bounding_box(glyph_id)
            .map(|bounding_box| bounding_box.y_max - bounding_box.y_min - self.face().descender())
            .unwrap_or(1000) as u32;

        Some(GlyphMetrics { width, height })
    }

    fn glyph_ids_for(&self, text: &str) -> Result<Vec<u16>, ContextError> {
        text.nfc()
            .map(|character| {
                self.glyph_id(character).ok_or_else(|| {
                    ContextError::with_context(format!(
                        "The font {:?} has no glyph for the character {:?}",
                        self.family, character
                    ))
                })
            })
            .collect()
    }

    /// Builds the Type0 font dictionary, embedding the font program and its ToUnicode map.
    fn insert_into_document(
        &self,
        inner_document: &mut lopdf::Document,
        face_identifier: &str,
    ) -> lopdf::Dictionary {
        use lopdf::Object::*;
        let face_metrics = self.font_metrics();

        let font_stream = lopdf::Stream::new(
            lopdf::Dictionary::from_iter(vec![("Length1", Integer(self.bytes.len() as i64))]),
            self.bytes.to_vec(),
        )
        .with_compression(false);

        let mut font_descriptor: Vec<(std::string::String, Object)> = vec![
            ("Type".into(), Name("FontDescriptor".into())),
            ("FontName".into(), Name(face_identifier.as_bytes().to_vec())),
            ("Ascent".into(), Integer(i64::from(face_metrics.ascent))),
            ("Descent".into(), Integer(i64::from(face_metrics.descent))),
            ("CapHeight".into(), Integer(i64::from(face_metrics.ascent))),
            ("ItalicAngle".into(), Integer(0)),
            // Nonsymbolic, Adobe standard Latin character set
            ("Flags".into(), Integer(32)),
            ("StemV".into(), Integer(80)),
        ];

        let mut maximum_character_height = 0;
        let mut total_width = 0;
        // Glyph ID -> (codepoint, width), the notdef glyph first
        let mut glyph_properties = BTreeMap::<u32, (u32, u32)>::new();
        glyph_properties.insert(0, (0, 1000));
        for (glyph_id, character) in self.glyph_ids() {
            if let Some(glyph_metrics) = self.glyph_metrics(glyph_id) {
                maximum_character_height = maximum_character_height.max(glyph_metrics.height);
                total_width += glyph_metrics.width;
                glyph_properties.insert(glyph_id as u32, (character as u32, glyph_metrics.width));
            }
        }

        // A bfchar block must share the high byte of its glyph IDs and hold at most 100 entries
        let mut current_high_byte: u32 = 0;
        let mut cmap_blocks = Vec::new();
        let mut current_block = Vec::new();
        for (glyph_id, (character, _)) in glyph_properties.iter() {
            if (*glyph_id >> 8) != current_high_byte || current_block.len() >= 100 {
                cmap_blocks.push(std::mem::take(&mut current_block));
                current_high_byte = *glyph_id >> 8;
            }
            current_block.push((*glyph_id, *character));
        }
        cmap_blocks.push(current_block);

        let to_unicode_map = generate_cid_to_unicode_map(face_identifier, cmap_blocks);
        let to_unicode_stream_id = inner_document.add_object(lopdf::Stream::new(
            lopdf::Dictionary::new(),
            to_unicode_map.into_bytes(),
        ));

        // Widths are written as runs: `first_gid [w w w ...]`, scaled to a 1000 unit em
        let scaling = 1000.0 / (face_metrics.units_per_em as f32);
        let mut width_objects = Vec::<Object>::new();
        let mut run_start = 0;
        let mut run_end = 0;
        let mut run_widths = Vec::<Object>::new();
        for glyph_id in 0..self.face().number_of_glyphs() {
            let Some(GlyphMetrics { width, .. }) = self.glyph_metrics(glyph_id) else {
                log::debug!(
                    "Glyph ID {} of the font {:?} has no width, leaving it out of the widths",
                    glyph_id,
                    self.family
                );
                continue;
            };
            let scaled_width = Integer((width as f32 * scaling) as i64);
            if glyph_id == run_end {
                run_widths.push(scaled_width);
                run_end += 1;
            } else {
                width_objects.push(Integer(run_start as i64));
                width_objects.push(Array(std::mem::take(&mut run_widths)));
                run_widths.push(scaled_width);
                run_start = glyph_id;
                run_end = glyph_id + 1;
            }
        }
        width_objects.push(Integer(run_start as i64));
        width_objects.push(Array(run_widths));

        let mut descendant_font = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Font".into())),
            ("Subtype", Name("CIDFontType2".into())),
            ("BaseFont", Name(face_identifier.as_bytes().to_vec())),
            (
                "CIDSystemInfo",
                Dictionary(lopdf::Dictionary::from_iter(vec![
                    ("Registry", String("Adobe".into(), StringFormat::Literal)),
                    ("Ordering", String("Identity".into(), StringFormat::Literal)),
                    ("Supplement", Integer(0)),
                ])),
            ),
            ("W", Array(width_objects)),
            ("DW", Integer(1000)),
        ]);

        font_descriptor.push((
            "FontFile2".into(),
            Reference(inner_document.add_object(font_stream)),
        ));
        // Not required, but Adobe Reader refuses the font without it
        font_descriptor.push((
            "FontBBox".into(),
            Array(vec![
                Integer(0),
                Integer(maximum_character_height as i64),
                Integer(total_width as i64),
                Integer(maximum_character_height as i64),
            ]),
        ));
        let font_descriptor_id =
            inner_document.add_object(lopdf::Dictionary::from_iter(font_descriptor));
        descendant_font.set("FontDescriptor", Reference(font_descriptor_id));

        lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Font".into())),
            ("Subtype", Name("Type0".into())),
            ("BaseFont", Name(face_identifier.as_bytes().to_vec())),
            // Horizontal writing
            ("Encoding", Name("Identity-H".into())),
            ("DescendantFonts", Array(vec![Dictionary(descendant_font)])),
            ("ToUnicode", Reference(to_unicode_stream_id)),
        ])
    }
}

impl TextMeasure for TrueTypeFont {
    fn text_width(&self, text: &str, font_size: f32) -> Result<f32, ContextError> {
        let mut advance_sum = 0u32;
        for glyph_id in self.glyph_ids_for(text)? {
            let advance = self
                .face()
                .glyph_hor_advance(owned_ttf_parser::GlyphId(glyph_id))
                .ok_or_else(|| {
                    ContextError::with_context(format!(
                        "The glyph {} of the font {:?} has no horizontal advance",
                        glyph_id, self.family
                    ))
                })?;
            advance_sum += advance as u32;
        }

        Ok(advance_sum as f32 * font_size / self.units_per_em as f32)
    }
}

/// The font a book is typeset in.
#[derive(Clone, Debug)]
pub enum FontFace {
    Standard(StandardFont),
    TrueType(TrueTypeFont),
}

impl FontFace {
    /// Resolves a layout's font family: the built-in Helvetica, a TrueType file associated in the
    /// configuration, or Helvetica again when the family is unknown (the warning is returned).
    pub fn for_family(
        font_family: &str,
        configuration: &EngineConfiguration,
    ) -> Result<(FontFace, Option<String>), ContextError> {
        if font_family.eq_ignore_ascii_case(HELVETICA) {
            return Ok((FontFace::Standard(StandardFont::Helvetica), None));
        }

        match configuration.get_font_path(font_family) {
            Some(font_path) => {
                let font_bytes = std::fs::read(&font_path).map_err(|error| {
                    ContextError::with_error(
                        format!("Failed to read the font file {:?}", font_path),
                        &error,
                    )
                })?;
                let font = TrueTypeFont::from_bytes(font_family, font_bytes)?;
                Ok((FontFace::TrueType(font), None))
            }
            None => Ok((
                FontFace::Standard(StandardFont::Helvetica),
                Some(format!(
                    "The font family {:?} is not associated to any font file, falling back to {}",
                    font_family, HELVETICA
                )),
            )),
        }
    }

    /// Encodes the text into the string operand of a `Tj` operator for this font.
    pub fn encode(&self, text: &str) -> Result<(Vec<u8>, StringFormat), ContextError> {
        match self {
            FontFace::Standard(standard_font) => {
                let bytes = text
                    .chars()
                    .map(|character| {
                        standard_font
                            .encode_character(character)
                            .map(|(code, _)| code)
                            .ok_or_else(|| unencodable(character, standard_font.base_font()))
                    })
                    .collect::<Result<Vec<u8>, ContextError>>()?;
                Ok((bytes, StringFormat::Literal))
            }
            FontFace::TrueType(true_type_font) => {
                let bytes = true_type_font
                    .glyph_ids_for(text)?
                    .into_iter()
                    .flat_map(|glyph_id| glyph_id.to_be_bytes())
                    .collect();
                Ok((bytes, StringFormat::Hexadecimal))
            }
        }
    }

    /// Builds the font dictionary which is referenced from the page resources.
    pub(crate) fn insert_into_document(
        &self,
        inner_document: &mut lopdf::Document,
        face_identifier: &str,
    ) -> lopdf::Dictionary {
        match self {
            FontFace::Standard(standard_font) => lopdf::Dictionary::from_iter(vec![
                ("Type", Object::Name("Font".into())),
                ("Subtype", Object::Name("Type1".into())),
                (
                    "BaseFont",
                    Object::Name(standard_font.base_font().as_bytes().to_vec()),
                ),
                ("Encoding", Object::Name("WinAnsiEncoding".into())),
            ]),
            FontFace::TrueType(true_type_font) => {
                true_type_font.insert_into_document(inner_document, face_identifier)
            }
        }
    }
}

impl TextMeasure for FontFace {
    fn text_width(&self, text: &str, font_size: f32) -> Result<f32, ContextError> {
        match self {
            FontFace::Standard(standard_font) => {
                let mut width_sum = 0u32;
                for character in text.chars() {
                    let (_, width) = standard_font
                        .encode_character(character)
                        .ok_or_else(|| unencodable(character, standard_font.base_font()))?;
                    width_sum += width as u32;
                }
                Ok(width_sum as f32 * font_size / 1000.0)
            }
            FontFace::TrueType(true_type_font) => true_type_font.text_width(text, font_size),
        }
    }
}

fn unencodable(character: char, base_font: &str) -> ContextError {
    ContextError::with_context(format!(
        "The character {:?} cannot be encoded with the font {}",
        character, base_font
    ))
}

type GlyphId = u32;
type UnicodeCodePoint = u32;
type CmapBlock = Vec<(GlyphId, UnicodeCodePoint)>;

/// Generates the ToUnicode CMap of an embedded font from its bfchar blocks.
fn generate_cid_to_unicode_map(face_name: &str, all_cmap_blocks: Vec<CmapBlock>) -> String {
    let mut cid_to_unicode_map =
        format!(include_str!("../assets/gid_to_unicode_beg.txt"), face_name);

    for cmap_block in all_cmap_blocks
        .into_iter()
        .filter(|block| !block.is_empty())
    {
        cid_to_unicode_map.push_str(format!("{} beginbfchar\r\n", cmap_block.len()).as_str());
        for (glyph_id, unicode) in cmap_block {
            cid_to_unicode_map.push_str(format!("<{glyph_id:04x}> <{unicode:04x}>\n").as_str());
        }
        cid_to_unicode_map.push_str("endbfchar\r\n");
    }

    cid_to_unicode_map.push_str(include_str!("../assets/gid_to_unicode_end.txt"));

    cid_to_unicode_map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_widths_follow_the_font_metrics() {
        let font = FontFace::Standard(StandardFont::Helvetica);
        // H (722) + i (222) at 10 points
        assert!((font.text_width("Hi", 10.0).unwrap() - 9.44).abs() < 1e-4);
        // Latin-1 characters are measurable as well
        assert!((font.text_width("é", 1000.0).unwrap() - 556.0).abs() < 1e-3);
    }

    #[test]
    fn characters_outside_win_ansi_cannot_be_measured_nor_encoded() {
        let font = FontFace::Standard(StandardFont::Helvetica);
        assert!(font.text_width("dragon \u{1F409}", 12.0).is_err());
        assert!(font.encode("\u{4E2D}").is_err());
        let (bytes, format) = font.encode("Café").unwrap();
        assert_eq!(bytes, vec![b'C', b'a', b'f', 0xE9]);
        assert_eq!(format, StringFormat::Literal);
    }

    #[test]
    fn unknown_families_fall_back_to_helvetica_with_a_warning() {
        let configuration = EngineConfiguration::default();
        let (font, warning) = FontFace::for_family("Comic Neue", &configuration).unwrap();
        assert!(matches!(font, FontFace::Standard(StandardFont::Helvetica)));
        assert!(warning.unwrap().contains("Comic Neue"));

        let (_, warning) = FontFace::for_family("helvetica", &configuration).unwrap();
        assert_eq!(warning, None);
    }

    #[test]
    fn unreadable_associated_font_is_an_error() {
        let mut configuration = EngineConfiguration::default();
        configuration
            .font_associations
            .push(crate::config::FontAssociation {
                font_family: "Andika".into(),
                font_file_path: "fonts/missing.ttf".into(),
            });
        assert!(FontFace::for_family("Andika", &configuration).is_err());
    }

    fn blocks() -> FontFace {
        let bytes = include_bytes!("../tests/fixtures/blocks.ttf").to_vec();
        FontFace::TrueType(TrueTypeFont::from_bytes("Blocks", bytes).unwrap())
    }

    #[test]
    fn true_type_fonts_measure_and_encode_through_their_glyphs() {
        let font = blocks();
        // A (600) + space (250) + b (500) on a 1000 unit em
        assert!((font.text_width("A b", 10.0).unwrap() - 13.5).abs() < 1e-4);
        assert!(font.text_width("A.", 10.0).is_err());

        let (bytes, format) = font.encode("Ab").unwrap();
        assert_eq!(bytes, vec![0, 2, 0, 29]);
        assert_eq!(format, StringFormat::Hexadecimal);
    }

    #[test]
    fn associated_font_files_are_loaded() {
        let mut configuration = EngineConfiguration::default();
        configuration
            .font_associations
            .push(crate::config::FontAssociation {
                font_family: "Blocks".into(),
                font_file_path: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/blocks.ttf")
                    .into(),
            });
        let (font, warning) = FontFace::for_family("Blocks", &configuration).unwrap();
        assert!(matches!(font, FontFace::TrueType(_)));
        assert_eq!(warning, None);
    }

    #[test]
    fn cid_map_is_framed_by_the_cmap_preamble() {
        let map = generate_cid_to_unicode_map("F0", vec![vec![(3, 0x41)], vec![]]);
        assert!(map.contains("/CMapName /F0 def"));
        assert!(map.contains("1 beginbfchar\r\n<0003> <0041>\nendbfchar"));
        assert!(map.trim_end().ends_with("%%EOF"));
    }
}
