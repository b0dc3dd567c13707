use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::LayoutProvider;
use crate::error::{ContextError, GenerationError};
use crate::layout::{LayoutSpec, ProductSpec};

const BUNDLED_LAYOUTS: &str = include_str!("../assets/layouts.json");

/// A set of layouts and the products they link to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutCatalog {
    #[serde(default)]
    pub layouts: Vec<LayoutSpec>,
    #[serde(default)]
    pub products: Vec<ProductSpec>,
}

impl LayoutCatalog {
    /// The catalog shipped with the engine.
    pub fn bundled() -> Result<Self, ContextError> {
        Self::from_json(BUNDLED_LAYOUTS)
    }

    pub fn from_json(contents: &str) -> Result<Self, ContextError> {
        serde_json::from_str(contents).map_err(|error| {
            ContextError::with_error("Failed to parse the layout catalog", &error)
        })
    }

    pub fn from_path(catalog_file_path: &Path) -> Result<Self, ContextError> {
        let contents = std::fs::read_to_string(catalog_file_path).map_err(|error| {
            ContextError::with_error(
                format!("Failed to read the layout catalog {:?}", catalog_file_path),
                &error,
            )
        })?;

        Self::from_json(&contents)
    }

    pub fn get_layout(&self, layout_id: &str) -> Option<&LayoutSpec> {
        self.layouts.iter().find(|layout| layout.id == layout_id)
    }

    pub fn get_product(&self, product_id: &str) -> Option<&ProductSpec> {
        self.products.iter().find(|product| product.id == product_id)
    }
}

#[async_trait]
impl LayoutProvider for LayoutCatalog {
    async fn layout(&self, layout_id: &str) -> Result<Option<LayoutSpec>, GenerationError> {
        Ok(self.get_layout(layout_id).cloned())
    }

    async fn product(&self, product_id: &str) -> Result<Option<ProductSpec>, GenerationError> {
        Ok(self.get_product(product_id).cloned())
    }
}

/// Asks the primary provider first and falls back to a catalog for identifiers it does not know.
pub struct FallbackLayoutProvider {
    primary: Arc<dyn LayoutProvider>,
    fallback: LayoutCatalog,
}

impl FallbackLayoutProvider {
    pub fn new(primary: Arc<dyn LayoutProvider>, fallback: LayoutCatalog) -> Self {
        FallbackLayoutProvider { primary, fallback }
    }

    /// Falls back to the catalog shipped with the engine.
    pub fn with_bundled(primary: Arc<dyn LayoutProvider>) -> Result<Self, ContextError> {
        Ok(Self::new(primary, LayoutCatalog::bundled()?))
    }
}

#[async_trait]
impl LayoutProvider for FallbackLayoutProvider {
    async fn layout(&self, layout_id: &str) -> Result<Option<LayoutSpec>, GenerationError> {
        if let Some(layout) = self.primary.layout(layout_id).await? {
            return Ok(Some(layout));
        }
        log::debug!("Layout {:?} comes from the fallback catalog", layout_id);
        Ok(self.fallback.get_layout(layout_id).cloned())
    }

    async fn product(&self, product_id: &str) -> Result<Option<ProductSpec>, GenerationError> {
        if let Some(product) = self.primary.product(product_id).await? {
            return Ok(Some(product));
        }
        Ok(self.fallback.get_product(product_id).cloned())
    }
}
