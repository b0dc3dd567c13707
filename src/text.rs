use unicode_normalization::UnicodeNormalization as _;

use crate::font::TextMeasure;

/// Replaces the typographic characters which the print fonts cannot encode with their plain
/// equivalents, drops control characters (keeping line breaks) and normalizes to NFC. What remains
/// is printable Latin-1: letters outside of it lose their diacritics, anything else is dropped.
pub fn sanitize(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.nfc() {
        match character {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => sanitized.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => sanitized.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => sanitized.push('-'),
            '\u{2026}' => sanitized.push_str("..."),
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => {
                sanitized.push(' ')
            }
            '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}' => {}
            '\u{2022}' | '\u{2023}' | '\u{2043}' | '\u{2219}' | '\u{25E6}' => sanitized.push('-'),
            '\u{2122}' => sanitized.push_str("TM"),
            '\u{00A9}' => sanitized.push_str("(c)"),
            '\u{00AE}' => sanitized.push_str("(R)"),
            '\u{20AC}' => sanitized.push_str("EUR"),
            '\u{0152}' => sanitized.push_str("OE"),
            '\u{0153}' => sanitized.push_str("oe"),
            '\u{0141}' => sanitized.push('L'),
            '\u{0142}' => sanitized.push('l'),
            '\u{0131}' => sanitized.push('i'),
            '\t' => sanitized.push(' '),
            '\n' | '\r' => sanitized.push(character),
            character if character.is_control() => {}
            character if is_latin1(character) => sanitized.push(character),
            // Keeps the base letter of a decomposable character, e.g. "ő" becomes "o"
            character => sanitized.extend(
                std::iter::once(character)
                    .nfd()
                    .filter(|decomposed| is_latin1(*decomposed) && !decomposed.is_control()),
            ),
        }
    }

    sanitized
}

fn is_latin1(character: char) -> bool {
    matches!(character as u32, 0x20..=0x7E | 0xA1..=0xFF)
}

/// Splits the text on its explicit line breaks and greedily packs the words of every paragraph
/// into lines no wider than `maximum_width`. Blank paragraphs become empty lines. A word wider
/// than the box is left alone on an overflowing line. A word which cannot be measured is
/// skipped with a warning, the rest of its paragraph is still wrapped.
pub fn wrap(
    text: &str,
    font: &dyn TextMeasure,
    font_size: f32,
    maximum_width: f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        if paragraph.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        lines.extend(wrap_paragraph(paragraph, font, font_size, maximum_width));
    }

    lines
}

fn wrap_paragraph(
    paragraph: &str,
    font: &dyn TextMeasure,
    font_size: f32,
    maximum_width: f32,
) -> Vec<String> {
    if let Ok(width) = font.text_width(paragraph, font_size) {
        if width <= maximum_width {
            return vec![paragraph.to_string()];
        }
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    for word in paragraph.split_whitespace() {
        if let Err(error) = font.text_width(word, font_size) {
            log::warn!("Skipping the word {:?}: {}", word, error);
            continue;
        }
        if current_line.is_empty() {
            current_line.push_str(word);
            continue;
        }

        let candidate = format!("{} {}", current_line, word);
        match font.text_width(&candidate, font_size) {
            Ok(width) if width <= maximum_width => current_line = candidate,
            _ => {
                lines.push(std::mem::take(&mut current_line));
                current_line.push_str(word);
            }
        }
    }
    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}

/// The height of a block of lines, where an empty line only takes half of a line height.
pub fn block_height(lines: &[String], line_height: f32) -> f32 {
    lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                line_height / 2.0
            } else {
                line_height
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;
    use crate::font::{FontFace, StandardFont};

    /// Every character is exactly one point wide per point of font size.
    struct Monospace;

    impl TextMeasure for Monospace {
        fn text_width(&self, text: &str, font_size: f32) -> Result<f32, ContextError> {
            if text.contains('#') {
                return Err(ContextError::with_context("No glyph for #"));
            }
            Ok(text.chars().count() as f32 * font_size)
        }
    }

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn typographic_characters_are_replaced() {
        assert_eq!(
            sanitize("\u{201C}Wait\u{2026}\u{201D} she said \u{2014} it\u{2019}s\u{00A0}late\u{2122}"),
            "\"Wait...\" she said - it's lateTM"
        );
        assert_eq!(sanitize("\u{2022} one\u{00A9}"), "- one(c)");
    }

    #[test]
    fn control_characters_are_stripped_but_line_breaks_kept() {
        assert_eq!(sanitize("a\u{0000}b\u{0007}\r\nc\td"), "ab\r\nc d");
    }

    #[test]
    fn decomposed_accents_are_composed() {
        assert_eq!(sanitize("Cafe\u{0301}"), "Caf\u{00E9}");
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let text = rand_utf8::rand_utf8(&mut rng, 64).to_string();
            let once = sanitize(&text);
            assert_eq!(sanitize(&once), once, "input {:?}", text);
        }
        let typographic = "\u{2018}\u{2000}\u{2026}\u{00AE}\u{200B}e\u{0301}";
        assert_eq!(sanitize(&sanitize(typographic)), sanitize(typographic));
    }

    #[test]
    fn short_lines_are_returned_unchanged() {
        let line = "The  fox   jumped";
        assert_eq!(wrap(line, &Monospace, 1.0, 100.0), vec![line.to_string()]);
    }

    #[test]
    fn words_are_packed_greedily() {
        similar_asserts::assert_eq!(
            wrap("the quick brown fox jumps", &Monospace, 1.0, 10.0),
            owned(&["the quick", "brown fox", "jumps"])
        );
    }

    #[test]
    fn blank_paragraphs_become_empty_lines() {
        similar_asserts::assert_eq!(
            wrap("Line1\n\nLine2", &Monospace, 1.0, 100.0),
            owned(&["Line1", "", "Line2"])
        );
        similar_asserts::assert_eq!(
            wrap("Line1\r\n\r\nLine2\r\n", &Monospace, 1.0, 100.0),
            owned(&["Line1", "", "Line2", ""])
        );
    }

    #[test]
    fn an_unbreakable_word_overflows_on_its_own_line() {
        similar_asserts::assert_eq!(
            wrap("a supercalifragilistic b", &Monospace, 1.0, 5.0),
            owned(&["a", "supercalifragilistic", "b"])
        );
    }

    #[test]
    fn unmeasurable_words_are_skipped_alone() {
        similar_asserts::assert_eq!(
            wrap("first\nbad # line\nlast", &Monospace, 1.0, 100.0),
            owned(&["first", "bad line", "last"])
        );
        similar_asserts::assert_eq!(
            wrap("one two #three four", &Monospace, 1.0, 7.0),
            owned(&["one two", "four"])
        );
    }

    #[test]
    fn characters_outside_latin1_are_folded_or_dropped() {
        assert_eq!(sanitize("10\u{20AC} for \u{0150}d\u{00F6}n"), "10EUR for Od\u{00F6}n");
        assert_eq!(sanitize("a \u{1F409} and \u{9F8D}!"), "a  and !");
        assert_eq!(sanitize("\u{0153}uf \u{0142}\u{00F3}d\u{017A}"), "oeuf l\u{00F3}dz");
    }

    #[test]
    fn an_emoji_does_not_cost_the_rest_of_its_paragraph() {
        let font = FontFace::Standard(StandardFont::Helvetica);
        let paragraph = "Every night the little dragon \u{1F409} counted the stars above the \
            hill until he fell asleep in the warm grass";
        assert!(font.text_width(paragraph, 12.0).is_err());

        for text in [paragraph.to_string(), sanitize(paragraph)] {
            let lines = wrap(&text, &font, 12.0, 150.0);
            assert!(lines.len() > 1, "{:?}", lines);
            assert!(lines[0].starts_with("Every night"));
            assert!(lines.iter().any(|line| line.contains("asleep")));
            for line in &lines {
                assert!(font.text_width(line, 12.0).unwrap() <= 150.0);
            }
        }
    }

    #[test]
    fn wrapping_works_with_real_font_metrics() {
        let font = FontFace::Standard(StandardFont::Helvetica);
        let lines = wrap(
            "Once upon a time a little dragon lived under the hill",
            &font,
            12.0,
            120.0,
        );
        assert!(lines.len() > 1);
        for line in lines {
            assert!(font.text_width(&line, 12.0).unwrap() <= 120.0);
        }
    }

    #[test]
    fn empty_lines_count_half() {
        let lines = vec!["Line1".to_string(), String::new(), "Line2".to_string()];
        assert_eq!(block_height(&lines, 12.0), 30.0);
    }
}
