use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::collaborators::ImageFetcher;
use crate::error::{BestEffort, ContextError};
use crate::pdf::ImageXObject;

/// Fetches `http(s)://` illustrations over the network and everything else from the file system.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ContextError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ContextError::with_error("Failed to build the HTTP client", &error))?;

        Ok(HttpImageFetcher { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, ContextError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let response = self
                .client
                .get(uri)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|error| {
                    ContextError::with_error(format!("Failed to download {:?}", uri), &error)
                })?;
            let bytes = response.bytes().await.map_err(|error| {
                ContextError::with_error(format!("Failed to read the body of {:?}", uri), &error)
            })?;
            return Ok(bytes.to_vec());
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        tokio::fs::read(path)
            .await
            .map_err(|error| ContextError::with_error(format!("Failed to read {:?}", path), &error))
    }
}

/// Decodes PNG or JPEG bytes, whichever is presented.
pub fn decode_image(bytes: &[u8]) -> Result<ImageXObject, ContextError> {
    let image = image::load_from_memory(bytes)
        .map_err(|error| ContextError::with_error("Failed to decode the image", &error))?;

    Ok(ImageXObject::from_dynamic_image(&image))
}

/// Fetches and decodes one illustration within `timeout`. Any failure degrades to a reason.
pub async fn fetch_image(
    fetcher: &dyn ImageFetcher,
    uri: &str,
    timeout: Duration,
) -> BestEffort<ImageXObject> {
    let bytes = match tokio::time::timeout(timeout, fetcher.fetch(uri)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(error)) => {
            return BestEffort::Degraded(format!("Skipping the image {:?}: {}", uri, error))
        }
        Err(_) => {
            return BestEffort::Degraded(format!(
                "Skipping the image {:?}: not fetched within {} seconds",
                uri,
                timeout.as_secs_f32()
            ))
        }
    };

    match decode_image(&bytes) {
        Ok(image) => BestEffort::Done(image),
        Err(error) => BestEffort::Degraded(format!("Skipping the image {:?}: {}", uri, error)),
    }
}

/// Fetches every distinct illustration concurrently. Images which could not be obtained are
/// missing from the map and the reason is appended to the warnings.
pub async fn prefetch_images<'a, I>(
    fetcher: Arc<dyn ImageFetcher>,
    uris: I,
    timeout: Duration,
    warnings: &mut Vec<String>,
) -> HashMap<String, ImageXObject>
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: BTreeSet<String> = uris.into_iter().map(str::to_string).collect();
    let mut fetches = JoinSet::new();
    for uri in distinct {
        let fetcher = fetcher.clone();
        fetches.spawn(async move {
            let image = fetch_image(fetcher.as_ref(), &uri, timeout).await;
            (uri, image)
        });
    }

    let mut images = HashMap::new();
    let mut degradations = Vec::new();
    while let Some(joined) = fetches.join_next().await {
        match joined {
            Ok((uri, image)) => {
                if let Some(image) = image.into_option(&mut degradations) {
                    images.insert(uri, image);
                }
            }
            Err(error) => {
                log::warn!("An image fetch task failed: {}", error);
                degradations.push(format!("An image fetch task failed: {}", error));
            }
        }
    }
    // Completion order is arbitrary
    degradations.sort();
    warnings.extend(degradations);

    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImageFetcher;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgba8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn images_are_fetched_once_and_decoded() {
        let fetcher = MemoryImageFetcher::default().with_image("a.png", png(4, 2));
        let mut warnings = Vec::new();
        let images = prefetch_images(
            Arc::new(fetcher),
            ["a.png", "a.png", "missing.png"],
            Duration::from_secs(1),
            &mut warnings,
        )
        .await;

        assert_eq!(images.len(), 1);
        assert_eq!((images["a.png"].width, images["a.png"].height), (4, 2));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("missing.png"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_time_out() {
        let fetcher = MemoryImageFetcher::default()
            .with_image("slow.png", png(2, 2))
            .with_delay(Duration::from_secs(60));
        let image = fetch_image(&fetcher, "slow.png", Duration::from_secs(30)).await;
        assert!(matches!(image, BestEffort::Degraded(reason) if reason.contains("30 seconds")));
    }

    #[tokio::test]
    async fn garbage_bytes_are_not_an_image() {
        let fetcher = MemoryImageFetcher::default().with_image("bad.png", b"not an image".to_vec());
        let image = fetch_image(&fetcher, "bad.png", Duration::from_secs(1)).await;
        assert!(!image.is_done());
    }

    #[tokio::test]
    async fn files_are_read_from_disk() {
        let path = std::env::temp_dir().join(format!("storybook-press-{}.png", std::process::id()));
        std::fs::write(&path, png(3, 3)).unwrap();

        let fetcher = HttpImageFetcher::new(Duration::from_secs(1)).unwrap();
        let uri = format!("file://{}", path.display());
        let image = fetch_image(&fetcher, &uri, Duration::from_secs(1)).await;
        assert!(image.is_done());
        std::fs::remove_file(path).unwrap();
    }
}
