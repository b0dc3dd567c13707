use std::collections::HashMap;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::assembler::{assemble, ArtifactKind, RenderedBook};
use crate::collaborators::{
    BookStatusStore, EventLog, GenerationEvent, GenerationStage, ImageFetcher, LayoutProvider,
    ObjectStore, PageContentProvider,
};
use crate::config::EngineConfiguration;
use crate::constraints;
use crate::error::{BestEffort, GenerationError};
use crate::fetcher::prefetch_images;
use crate::fitting::{fit_unified, FitSettings};
use crate::font::FontFace;
use crate::layout::{LayoutSpec, ProductSpec};
use crate::pagination::{adjust, keep_within, COVER_PAGES};
use crate::pdf::{millimeters_to_points, ImageXObject};
use crate::publisher::{publish, Artifact, PublishTarget, PublishedArtifact};
use crate::renderer::{PageRenderer, RenderedLeaf};
use crate::story::{order_pages, Book, OrderedPages, StoryPage};

const SESSION_IDENTIFIER_LENGTH: usize = 32;

/// A random alphanumeric identifier tying together the events, objects and documents of a run.
pub fn new_session_identifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_IDENTIFIER_LENGTH)
        .map(char::from)
        .collect()
}

/// The services a generator depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn PageContentProvider>,
    pub layouts: Arc<dyn LayoutProvider>,
    pub status: Arc<dyn BookStatusStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub events: Arc<dyn EventLog>,
    pub images: Arc<dyn ImageFetcher>,
}

/// Trim size of one leaf, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrimSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub dpi: u32,
    pub trim_size: TrimSize,
    /// Covers plus interior leaves.
    pub page_count: u32,
    /// Leaves of the cover document, spine included.
    pub cover_page_count: u32,
    pub interior_page_count: u32,
    pub padding_page_count: u32,
    /// Interior leaves carrying story pages.
    pub content_page_count: u32,
    pub font_size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub book_id: String,
    pub version: u32,
    pub session_id: String,
    pub artifacts: Vec<PublishedArtifact>,
    /// The bytes of the published documents, in the order of `artifacts`.
    #[serde(skip)]
    pub documents: Vec<Artifact>,
    pub metadata: GenerationMetadata,
    /// Everything that was recovered from: padding, truncation, skipped images.
    pub warnings: Vec<String>,
    /// Sequence numbers of the story pages dropped to respect the maximum page count.
    pub truncated_page_numbers: Vec<u32>,
}

/// What the run works on once the inputs have been validated.
struct ValidatedRequest {
    book: Book,
    pages: OrderedPages,
    layout: LayoutSpec,
    product: Option<ProductSpec>,
}

/// Turns books into their three print artifacts and publishes them.
pub struct Generator {
    collaborators: Collaborators,
    configuration: EngineConfiguration,
}

impl Generator {
    pub fn new(collaborators: Collaborators, configuration: EngineConfiguration) -> Self {
        Generator {
            collaborators,
            configuration,
        }
    }

    /// Produces a new version of the book's artifacts with the given layout. The status of the
    /// book is moved to generating, then to ready once every artifact is published, or to failed
    /// with the reason of the error.
    pub async fn generate(
        &self,
        book_id: &str,
        layout_id: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let request = self.validate(book_id, layout_id).await?;
        let session_id = new_session_identifier();
        log::info!(
            "Generating book {:?} with layout {:?} in session {}",
            book_id,
            layout_id,
            session_id
        );

        self.collaborators
            .status
            .mark_generating(book_id, &session_id)
            .await?;
        let mut warnings = Vec::new();
        self.record(
            GenerationEvent::new(&session_id, book_id, GenerationStage::Started, layout_id),
            &mut warnings,
        )
        .await;

        match self.run(request, &session_id, &mut warnings).await {
            Ok(result) => Ok(result),
            Err(error) => {
                log::error!("Generation of book {:?} failed: {}", book_id, error);
                if let Err(status_error) = self
                    .collaborators
                    .status
                    .mark_failed(book_id, &error.to_string())
                    .await
                {
                    log::warn!("Failed to mark book {:?} as failed: {}", book_id, status_error);
                }
                self.record(
                    GenerationEvent::new(
                        &session_id,
                        book_id,
                        GenerationStage::Failed,
                        error.to_string(),
                    ),
                    &mut warnings,
                )
                .await;
                Err(error)
            }
        }
    }

    async fn validate(
        &self,
        book_id: &str,
        layout_id: &str,
    ) -> Result<ValidatedRequest, GenerationError> {
        if book_id.trim().is_empty() {
            return Err(GenerationError::Validation("The book identifier is empty".into()));
        }
        if layout_id.trim().is_empty() {
            return Err(GenerationError::Validation("The layout identifier is empty".into()));
        }

        let book = self
            .collaborators
            .content
            .load_book(book_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("Book {:?}", book_id)))?;
        if !book.finalized {
            return Err(GenerationError::Validation(format!(
                "Book {:?} is not finalized",
                book_id
            )));
        }
        let pages = order_pages(&book.pages)?;

        let layout = self
            .collaborators
            .layouts
            .layout(layout_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("Layout {:?}", layout_id)))?;
        layout.validate(self.configuration.minimum_font_size)?;

        let product = match layout.product_id.as_deref() {
            Some(product_id) => Some(
                self.collaborators
                    .layouts
                    .product(product_id)
                    .await?
                    .ok_or_else(|| {
                        GenerationError::NotFound(format!(
                            "Product {:?} linked from layout {:?}",
                            product_id, layout_id
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(ValidatedRequest {
            book,
            pages,
            layout,
            product,
        })
    }

    async fn run(
        &self,
        request: ValidatedRequest,
        session_id: &str,
        warnings: &mut Vec<String>,
    ) -> Result<GenerationResult, GenerationError> {
        let ValidatedRequest {
            book,
            pages,
            layout,
            product,
        } = request;
        let version = self.collaborators.content.next_version(&book.id).await?;

        let page_constraints = constraints::resolve(&layout, product.as_ref());
        let blank_pages = product.as_ref().map_or(0, |product| product.blank_pages);
        let leaves_per_page: Vec<u32> = pages
            .interior
            .iter()
            .map(|page| layout.leaves_for(page.kind) as u32)
            .collect();
        let content_leaves: u32 = leaves_per_page.iter().sum();
        let adjustment = adjust(content_leaves, blank_pages, &page_constraints);
        warnings.extend(adjustment.warnings.iter().cloned());

        let (kept_pages, padding_leaves) =
            keep_within(&leaves_per_page, adjustment.final_interior_pages);
        let truncated_page_numbers: Vec<u32> = pages.interior[kept_pages..]
            .iter()
            .map(|page| page.sequence)
            .collect();
        let interior: Vec<StoryPage> = pages.interior[..kept_pages].to_vec();
        self.record(
            GenerationEvent::new(
                session_id,
                &book.id,
                GenerationStage::PagesAdjusted,
                format!(
                    "{} interior leaves, {} of padding",
                    adjustment.final_interior_pages, padding_leaves
                ),
            ),
            warnings,
        )
        .await;

        let (font, font_warning) = FontFace::for_family(&layout.font_family, &self.configuration)?;
        if let Some(font_warning) = font_warning {
            log::warn!("{}", font_warning);
            warnings.push(font_warning);
        }

        let all_pages: Vec<&StoryPage> = std::iter::once(&pages.front_cover)
            .chain(interior.iter())
            .chain(std::iter::once(&pages.back_cover))
            .collect();
        let images = prefetch_images(
            self.collaborators.images.clone(),
            all_pages.iter().filter_map(|page| page.image.as_deref()),
            self.configuration.image_fetch_timeout(),
            warnings,
        )
        .await;

        let settings = FitSettings::from(&self.configuration);
        let fitted_pages: Vec<StoryPage> = all_pages.iter().map(|page| (*page).clone()).collect();
        let font_size = fit_unified(
            &fitted_pages,
            &layout,
            &font,
            layout.max_font_size,
            &settings,
        );
        self.record(
            GenerationEvent::new(
                session_id,
                &book.id,
                GenerationStage::FontFitted,
                format!("{} pt", font_size),
            ),
            warnings,
        )
        .await;

        let spine_width = product
            .as_ref()
            .filter(|product| product.has_spine)
            .map(|_| millimeters_to_points(self.configuration.spine_width_millimeters));
        let title = if book.title.trim().is_empty() {
            book.id.clone()
        } else {
            book.title.clone()
        };
        let rendered_book = self.render_book(RenderRequest {
            title,
            layout: &layout,
            font: &font,
            font_size,
            images: &images,
            front_cover: &pages.front_cover,
            back_cover: &pages.back_cover,
            interior: &interior,
            padding_leaves,
            expected_interior_leaves: adjustment.final_interior_pages,
            spine_width,
        });

        let documents = build_documents(
            Arc::new(rendered_book),
            Arc::new(font),
            Arc::new(images),
            session_id,
        )
        .await?;
        self.record(
            GenerationEvent::new(
                session_id,
                &book.id,
                GenerationStage::DocumentsBuilt,
                documents
                    .iter()
                    .map(|document| format!("{} {} bytes", document.kind, document.bytes.len()))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            warnings,
        )
        .await;

        // Once uploads start they run to completion or roll back, even if the caller gives up
        let target = PublishTarget {
            storage_prefix: self.configuration.storage_prefix.clone(),
            book_id: book.id.clone(),
            version,
            session_id: session_id.to_string(),
        };
        let artifacts = tokio::spawn(publish(
            self.collaborators.objects.clone(),
            self.collaborators.status.clone(),
            target,
            documents.clone(),
        ))
        .await
        .map_err(|error| GenerationError::Publish(format!("The publish task failed: {}", error)))??;
        self.record(
            GenerationEvent::new(
                session_id,
                &book.id,
                GenerationStage::Published,
                format!("version {}", version),
            ),
            warnings,
        )
        .await;

        let cover_page_count = COVER_PAGES + u32::from(spine_width.is_some());
        let interior_page_count = adjustment.final_interior_pages;
        Ok(GenerationResult {
            book_id: book.id,
            version,
            session_id: session_id.to_string(),
            artifacts,
            documents,
            metadata: GenerationMetadata {
                dpi: self.configuration.dpi,
                trim_size: TrimSize {
                    width: layout.width,
                    height: layout.height,
                },
                page_count: COVER_PAGES + interior_page_count,
                cover_page_count,
                interior_page_count,
                padding_page_count: padding_leaves,
                content_page_count: interior_page_count.saturating_sub(padding_leaves),
                font_size,
            },
            warnings: std::mem::take(warnings),
            truncated_page_numbers,
        })
    }

    fn render_book(&self, request: RenderRequest<'_>) -> RenderedBook {
        let renderer = PageRenderer {
            layout: request.layout,
            font: request.font,
            font_size: request.font_size,
            images: request.images,
            settings: FitSettings::from(&self.configuration),
            distortion_threshold_percent: self.configuration.distortion_threshold_percent,
        };
        let single_leaf = |page: &StoryPage| -> RenderedLeaf {
            renderer.render(page).into_iter().next().unwrap_or_else(|| {
                RenderedLeaf::blank(
                    request.layout.width,
                    request.layout.height,
                    request.layout.bleed,
                )
            })
        };

        RenderedBook {
            title: request.title,
            width: request.layout.width,
            height: request.layout.height,
            bleed: request.layout.bleed,
            front_cover: single_leaf(request.front_cover),
            back_cover: single_leaf(request.back_cover),
            interior: request
                .interior
                .iter()
                .flat_map(|page| renderer.render(page))
                .collect(),
            padding_leaves: request.padding_leaves,
            expected_interior_leaves: request.expected_interior_leaves,
            spine_width: request.spine_width,
        }
    }

    /// Audit events never fail the run.
    async fn record(&self, event: GenerationEvent, warnings: &mut Vec<String>) {
        let appended = self.collaborators.events.append(event).await.map_err(|error| {
            format!("Failed to record a generation event: {}", error)
        });
        BestEffort::from(appended).into_option(warnings);
    }
}

struct RenderRequest<'a> {
    title: String,
    layout: &'a LayoutSpec,
    font: &'a FontFace,
    font_size: f32,
    images: &'a HashMap<String, ImageXObject>,
    front_cover: &'a StoryPage,
    back_cover: &'a StoryPage,
    interior: &'a [StoryPage],
    padding_leaves: u32,
    expected_interior_leaves: u32,
    spine_width: Option<f32>,
}

/// Builds the three documents concurrently on the blocking pool.
async fn build_documents(
    book: Arc<RenderedBook>,
    font: Arc<FontFace>,
    images: Arc<HashMap<String, ImageXObject>>,
    session_id: &str,
) -> Result<Vec<Artifact>, GenerationError> {
    let build = |kind: ArtifactKind| {
        let (book, font, images) = (book.clone(), font.clone(), images.clone());
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let bytes = assemble(&book, kind, &font, &images, &session_id)?;
            Ok::<_, GenerationError>(Artifact { kind, bytes })
        })
    };

    let (combined, cover, interior) = tokio::try_join!(
        build(ArtifactKind::Combined),
        build(ArtifactKind::Cover),
        build(ArtifactKind::Interior)
    )
    .map_err(|error| GenerationError::Render(format!("A document build failed: {}", error)))?;

    Ok(vec![combined?, cover?, interior?])
}
