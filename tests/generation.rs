use std::io::Cursor;
use std::sync::Arc;

use storybook_press::{
    assembler::ArtifactKind,
    catalog::{FallbackLayoutProvider, LayoutCatalog},
    config::{EngineConfiguration, FontAssociation},
    error::GenerationError,
    generator::{Collaborators, GenerationResult, Generator},
    layout::LayoutSpec,
    memory::{
        BookStatus, MemoryContentProvider, MemoryEventLog, MemoryImageFetcher, MemoryObjectStore,
        MemoryStatusStore,
    },
    story::{Book, PageKind, StoryPage},
};

const SENTENCE: &str = "The little dragon curled up under the old oak tree and dreamt of the sea.";

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// A finalized book with a title page followed by `content_pages` illustrated pages.
fn book(content_pages: u32) -> Book {
    let mut pages = vec![
        StoryPage::new(1, PageKind::CoverFront)
            .with_text("The Sleepy Dragon")
            .with_image("cover.png"),
        StoryPage::new(2, PageKind::TitlePage).with_text("The Sleepy Dragon\n\nA bedtime story"),
    ];
    for index in 0..content_pages {
        pages.push(
            StoryPage::new(3 + index, PageKind::Content)
                .with_text(SENTENCE)
                .with_image("dragon.png"),
        );
    }
    pages.push(StoryPage::new(3 + content_pages, PageKind::CoverBack).with_text("The end."));

    Book {
        id: "book-1".into(),
        title: "The Sleepy Dragon".into(),
        finalized: true,
        pages,
    }
}

fn custom_layout(value: serde_json::Value) -> LayoutCatalog {
    let layout: LayoutSpec = serde_json::from_value(value).unwrap();
    LayoutCatalog {
        layouts: vec![layout],
        products: Vec::new(),
    }
}

struct Harness {
    generator: Generator,
    objects: Arc<MemoryObjectStore>,
    status: Arc<MemoryStatusStore>,
    events: Arc<MemoryEventLog>,
}

fn harness_with(
    book: Book,
    catalog: LayoutCatalog,
    objects: MemoryObjectStore,
    events: MemoryEventLog,
) -> Harness {
    let objects = Arc::new(objects);
    let status = Arc::new(MemoryStatusStore::default());
    let events = Arc::new(events);
    let images = MemoryImageFetcher::default()
        .with_image("cover.png", png(60, 60))
        .with_image("dragon.png", png(80, 60));
    let collaborators = Collaborators {
        content: Arc::new(MemoryContentProvider::with_book(book)),
        layouts: Arc::new(FallbackLayoutProvider::with_bundled(Arc::new(catalog)).unwrap()),
        status: status.clone(),
        objects: objects.clone(),
        events: events.clone(),
        images: Arc::new(images),
    };

    Harness {
        generator: Generator::new(collaborators, EngineConfiguration::default()),
        objects,
        status,
        events,
    }
}

fn harness(book: Book) -> Harness {
    harness_with(
        book,
        LayoutCatalog::default(),
        MemoryObjectStore::default(),
        MemoryEventLog::default(),
    )
}

fn page_count(result: &GenerationResult, kind: ArtifactKind) -> usize {
    let document = result
        .documents
        .iter()
        .find(|document| document.kind == kind)
        .unwrap();
    lopdf::Document::load_mem(&document.bytes)
        .unwrap()
        .get_pages()
        .len()
}

#[tokio::test]
async fn hardcover_book_is_padded_to_the_product_minimum() {
    let harness = harness(book(10));
    let result = harness.generator.generate("book-1", "square-8x8").await.unwrap();

    // 11 interior pages padded to the minimum of 24, and 2 + 2 + 24 is already aligned on 4
    assert_eq!(result.metadata.interior_page_count, 24);
    assert_eq!(result.metadata.padding_page_count, 13);
    assert_eq!(result.metadata.content_page_count, 11);
    assert_eq!(result.metadata.cover_page_count, 3);
    assert_eq!(result.metadata.page_count, 26);
    assert_eq!(result.metadata.dpi, 300);
    assert!(result.truncated_page_numbers.is_empty());
    assert!(result.warnings.iter().any(|warning| warning.contains("Padded 13 pages")));

    assert_eq!(page_count(&result, ArtifactKind::Cover), 3);
    assert_eq!(page_count(&result, ArtifactKind::Interior), 24);
    assert_eq!(page_count(&result, ArtifactKind::Combined), 26);
    assert!(result.metadata.font_size >= 10.0 && result.metadata.font_size <= 24.0);
}

#[tokio::test]
async fn artifacts_are_published_under_a_new_version() {
    let harness = harness(book(2));
    let first = harness.generator.generate("book-1", "square-8x8").await.unwrap();
    let second = harness.generator.generate("book-1", "square-8x8").await.unwrap();

    assert_eq!((first.version, second.version), (1, 2));
    assert_ne!(first.session_id, second.session_id);
    let paths = harness.objects.paths();
    assert_eq!(paths.len(), 6);
    assert!(paths.contains(&"books/book-1/v2/interior.pdf".to_string()));

    let metadata = harness.objects.metadata("books/book-1/v1/cover.pdf").unwrap();
    assert_eq!(metadata["book-id"], "book-1");
    assert_eq!(metadata["artifact-type"], "cover");
    assert_eq!(metadata["version"], "1");
    assert_eq!(metadata["session-id"], first.session_id);

    let history = harness.status.history("book-1");
    assert!(matches!(history[0], BookStatus::Generating { .. }));
    assert!(matches!(
        harness.status.status("book-1"),
        Some(BookStatus::Ready { version: 2, ref artifacts }) if artifacts.len() == 3
    ));
    assert!(harness
        .events
        .events()
        .iter()
        .all(|event| !event.session_id.is_empty()));
}

#[tokio::test]
async fn softcover_has_no_spine() {
    let harness = harness(book(6));
    let result = harness.generator.generate("book-1", "softcover-8x8").await.unwrap();

    assert_eq!(result.metadata.cover_page_count, 2);
    assert_eq!(page_count(&result, ArtifactKind::Cover), 2);
    // 7 interior pages padded to the minimum of 8, 2 + 8 is a multiple of 2
    assert_eq!(page_count(&result, ArtifactKind::Interior), 8);
}

#[tokio::test]
async fn spread_content_pages_take_two_leaves_and_titles_one() {
    let catalog = custom_layout(serde_json::json!({
        "id": "spread",
        "width": 792,
        "height": 612,
        "leavesPerSpread": 2,
        "fontFamily": "Helvetica",
        "maxFontSize": 24,
        "pageConstraints": { "pageMultiple": 1 }
    }));

    let mut title_only = book(0);
    title_only.id = "title-only".into();
    let harness = harness_with(
        title_only,
        catalog.clone(),
        MemoryObjectStore::default(),
        MemoryEventLog::default(),
    );
    let result = harness.generator.generate("title-only", "spread").await.unwrap();
    assert_eq!(page_count(&result, ArtifactKind::Interior), 1);

    let harness = harness_with(
        book(1),
        catalog,
        MemoryObjectStore::default(),
        MemoryEventLog::default(),
    );
    let result = harness.generator.generate("book-1", "spread").await.unwrap();
    assert_eq!(page_count(&result, ArtifactKind::Interior), 3);
    assert_eq!(result.metadata.padding_page_count, 0);
}

#[tokio::test]
async fn bundled_spread_layout_pads_leaves_to_the_multiple() {
    let harness = harness(book(3));
    let result = harness
        .generator
        .generate("book-1", "landscape-11x8.5")
        .await
        .unwrap();

    // A title leaf and 3 two-leaf pages, 2 + 2 + 7 is padded up to 12
    assert_eq!(result.metadata.interior_page_count, 8);
    assert_eq!(result.metadata.padding_page_count, 1);
    assert_eq!(page_count(&result, ArtifactKind::Interior), 8);
    assert_eq!(page_count(&result, ArtifactKind::Cover), 3);
}

#[tokio::test]
async fn truncation_drops_the_last_pages_and_says_so() {
    let catalog = custom_layout(serde_json::json!({
        "id": "short",
        "width": 576,
        "height": 576,
        "fontFamily": "Helvetica",
        "maxFontSize": 24,
        "pageConstraints": { "maxPages": 4, "pageMultiple": 2 }
    }));
    let harness = harness_with(
        book(7),
        catalog,
        MemoryObjectStore::default(),
        MemoryEventLog::default(),
    );
    let result = harness.generator.generate("book-1", "short").await.unwrap();

    assert_eq!(result.metadata.interior_page_count, 4);
    assert_eq!(result.truncated_page_numbers, vec![6, 7, 8, 9]);
    assert!(result.warnings.iter().any(|warning| warning.contains("Truncated 4 pages")));
    assert_eq!(page_count(&result, ArtifactKind::Interior), 4);
}

#[tokio::test]
async fn a_failed_upload_publishes_nothing() {
    let harness = harness_with(
        book(2),
        LayoutCatalog::default(),
        MemoryObjectStore::failing_on("cover.pdf"),
        MemoryEventLog::default(),
    );
    let error = harness
        .generator
        .generate("book-1", "square-8x8")
        .await
        .unwrap_err();

    assert!(matches!(error, GenerationError::Publish(_)));
    assert!(harness.objects.paths().is_empty());
    match harness.status.status("book-1") {
        Some(BookStatus::Failed { message }) => assert!(message.contains("cover")),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_anything_happens() {
    let mut draft = book(2);
    draft.finalized = false;
    let drafted = harness(draft);
    assert!(matches!(
        drafted.generator.generate("book-1", "square-8x8").await,
        Err(GenerationError::Validation(_))
    ));
    assert!(matches!(
        drafted.generator.generate("", "square-8x8").await,
        Err(GenerationError::Validation(_))
    ));
    assert!(matches!(
        drafted.generator.generate("missing", "square-8x8").await,
        Err(GenerationError::NotFound(_))
    ));
    assert!(drafted.status.history("book-1").is_empty());

    let finalized = harness(book(2));
    assert!(matches!(
        finalized.generator.generate("book-1", "missing-layout").await,
        Err(GenerationError::NotFound(_))
    ));
    assert!(finalized.status.history("book-1").is_empty());

    let mut two_front_covers = book(2);
    two_front_covers.pages[1].kind = PageKind::CoverFront;
    let malformed = harness(two_front_covers);
    assert!(matches!(
        malformed.generator.generate("book-1", "square-8x8").await,
        Err(GenerationError::Validation(_))
    ));
}

#[tokio::test]
async fn unreachable_images_and_a_broken_audit_log_only_warn() {
    let mut book = book(2);
    book.pages[2].image = Some("unreachable.png".into());
    let harness = harness_with(
        book,
        LayoutCatalog::default(),
        MemoryObjectStore::default(),
        MemoryEventLog::failing(),
    );
    let result = harness.generator.generate("book-1", "square-8x8").await.unwrap();

    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("unreachable.png")));
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("generation event")));
    assert_eq!(harness.objects.paths().len(), 3);
}

#[tokio::test]
async fn associated_true_type_fonts_are_embedded_in_every_artifact() {
    let catalog = custom_layout(serde_json::json!({
        "id": "blocks",
        "width": 576,
        "height": 576,
        "fontFamily": "Blocks",
        "maxFontSize": 24,
        "pageConstraints": { "pageMultiple": 1 }
    }));
    let mut configuration = EngineConfiguration::default();
    configuration.font_associations.push(FontAssociation {
        font_family: "Blocks".into(),
        font_file_path: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/blocks.ttf").into(),
    });
    let images = MemoryImageFetcher::default()
        .with_image("cover.png", png(60, 60))
        .with_image("dragon.png", png(80, 60));
    let generator = Generator::new(
        Collaborators {
            content: Arc::new(MemoryContentProvider::with_book(book(2))),
            layouts: Arc::new(FallbackLayoutProvider::with_bundled(Arc::new(catalog)).unwrap()),
            status: Arc::new(MemoryStatusStore::default()),
            objects: Arc::new(MemoryObjectStore::default()),
            events: Arc::new(MemoryEventLog::default()),
            images: Arc::new(images),
        },
        configuration,
    );
    let result = generator.generate("book-1", "blocks").await.unwrap();

    for document in &result.documents {
        let pdf = lopdf::Document::load_mem(&document.bytes).unwrap();
        let type0_fonts = pdf
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dictionary| {
                dictionary.get(b"Subtype").and_then(|subtype| subtype.as_name()).ok()
                    == Some(b"Type0".as_slice())
            })
            .count();
        assert_eq!(type0_fonts, 1, "{}", document.kind);
    }
}
