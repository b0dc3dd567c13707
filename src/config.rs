use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// The tunables of the engine. Every field has a default so that a configuration file
/// only needs to mention what it changes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfiguration {
    /// Resolution reported in the result metadata for the print vendor.
    pub dpi: u32,
    /// Upper bound on a single illustration fetch.
    pub image_fetch_timeout_seconds: u64,
    /// Aspect mismatch (in percent) below which an image is stretched instead of letterboxed.
    pub distortion_threshold_percent: f32,
    /// The floor of the font fitting loop.
    pub minimum_font_size: f32,
    /// Line height as a multiple of the font size.
    pub line_height_factor: f32,
    /// Inner padding of a text box, in points.
    pub text_box_padding: f32,
    /// Margin of the default text box used when a page kind has no explicit text box, in points.
    pub default_text_margin: f32,
    pub spine_width_millimeters: f32,
    /// Root under which the artifacts are stored.
    pub storage_prefix: String,
    pub font_associations: Vec<FontAssociation>,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        EngineConfiguration {
            dpi: 300,
            image_fetch_timeout_seconds: 30,
            distortion_threshold_percent: 10.0,
            minimum_font_size: 10.0,
            line_height_factor: 1.2,
            text_box_padding: 12.0,
            default_text_margin: 72.0,
            spine_width_millimeters: 9.0,
            storage_prefix: "books".into(),
            font_associations: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontAssociation {
    pub font_family: String,
    pub font_file_path: PathBuf,
}

impl EngineConfiguration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        let configuration_file_contents = std::fs::read_to_string(configuration_file_path)
            .map_err(|error| {
                ContextError::with_error(
                    format!(
                        "Failed to read the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        let configuration: EngineConfiguration =
            serde_json::from_str(&configuration_file_contents).map_err(|error| {
                ContextError::with_error(
                    format!(
                        "Failed to parse the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;

        Ok(configuration)
    }

    pub fn get_font_path(&self, font_family: &str) -> Option<PathBuf> {
        self.font_associations
            .iter()
            .find(|font_association| font_association.font_family == font_family)
            .map(|font_association| font_association.font_file_path.clone())
    }

    pub fn image_fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.image_fetch_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_configuration_keeps_the_defaults() {
        let configuration: EngineConfiguration = serde_json::from_str(
            r#"{ "dpi": 600, "fontAssociations": [{ "fontFamily": "Andika", "fontFilePath": "fonts/andika.ttf" }] }"#,
        )
        .unwrap();
        assert_eq!(configuration.dpi, 600);
        assert_eq!(configuration.image_fetch_timeout_seconds, 30);
        assert_eq!(configuration.spine_width_millimeters, 9.0);
        assert_eq!(
            configuration.get_font_path("Andika"),
            Some(PathBuf::from("fonts/andika.ttf"))
        );
        assert_eq!(configuration.get_font_path("Comic"), None);
    }

    #[test]
    fn missing_configuration_file_is_reported_with_its_path() {
        let error = EngineConfiguration::from_path(Path::new("does/not/exist.json")).unwrap_err();
        assert!(error.context.contains("does/not/exist.json"));
    }
}
