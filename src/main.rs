use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use storybook_press::{
    catalog::{FallbackLayoutProvider, LayoutCatalog},
    config::EngineConfiguration,
    error::ContextError,
    fetcher::HttpImageFetcher,
    generator::{Collaborators, Generator},
    memory::{DirectoryObjectStore, LogEventLog, MemoryContentProvider, MemoryStatusStore},
    story::Book,
};

#[derive(Parser, Debug)]
#[command(version, long_about = None)]
struct CliArguments {
    #[arg(long = "book", value_name = "json_file", help = "The finalized book with its pages")]
    book_path: PathBuf,
    #[arg(long = "layout-id", help = "Identifier of the layout to print the book with")]
    layout_id: String,
    #[arg(
        long = "layouts",
        value_name = "json_file",
        help = "Catalog of layouts and products consulted before the bundled one"
    )]
    layouts_path: Option<PathBuf>,
    #[arg(long = "configuration", value_name = "json_file")]
    configuration_path: Option<PathBuf>,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "directory",
        help = "Directory the artifacts are stored into"
    )]
    output_directory: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(error) = fallible_main().await {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

async fn fallible_main() -> Result<(), ContextError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let arguments = CliArguments::parse();
    log::debug!("{:?}", arguments);

    let configuration = match &arguments.configuration_path {
        Some(configuration_path) => EngineConfiguration::from_path(configuration_path)?,
        None => EngineConfiguration::default(),
    };
    let book_contents = std::fs::read_to_string(&arguments.book_path).map_err(|error| {
        ContextError::with_error(
            format!("Failed to read the book file {:?}", arguments.book_path),
            &error,
        )
    })?;
    let book: Book = serde_json::from_str(&book_contents)
        .map_err(|error| ContextError::with_error("Failed to parse the book file", &error))?;
    let book_id = book.id.clone();

    let primary_catalog = match &arguments.layouts_path {
        Some(layouts_path) => LayoutCatalog::from_path(layouts_path)?,
        None => LayoutCatalog::default(),
    };
    let status = Arc::new(MemoryStatusStore::default());
    let collaborators = Collaborators {
        content: Arc::new(MemoryContentProvider::with_book(book)),
        layouts: Arc::new(FallbackLayoutProvider::with_bundled(Arc::new(
            primary_catalog,
        ))?),
        status: status.clone(),
        objects: Arc::new(DirectoryObjectStore::new(&arguments.output_directory)),
        events: Arc::new(LogEventLog),
        images: Arc::new(HttpImageFetcher::new(configuration.image_fetch_timeout())?),
    };

    let generator = Generator::new(collaborators, configuration);
    let result = generator
        .generate(&book_id, &arguments.layout_id)
        .await
        .map_err(|error| ContextError::with_error("Failed to generate the book", &error))?;
    log::debug!("Final status: {:?}", status.status(&book_id));

    let summary = serde_json::to_string_pretty(&result)
        .map_err(|error| ContextError::with_error("Failed to serialize the result", &error))?;
    println!("{}", summary);
    for artifact in &result.artifacts {
        log::info!("Saved the {} document to {}", artifact.kind, artifact.url);
    }

    Ok(())
}
