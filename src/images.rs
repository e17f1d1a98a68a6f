use std::fs;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;

use crate::domain::ImageDescriptor;
use crate::error::MigrateError;
use crate::http::ImageClient;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub downloaded: usize,
    pub retried: usize,
}

pub struct ImageFetcher<'a, C: ImageClient> {
    client: &'a C,
    retry_delay: Duration,
}

impl<'a, C: ImageClient> ImageFetcher<'a, C> {
    pub fn new(client: &'a C, retry_delay: Duration) -> Self {
        Self {
            client,
            retry_delay,
        }
    }

    pub fn fetch_all(
        &self,
        images: &[ImageDescriptor],
        media_dir: &Utf8Path,
    ) -> Result<ImageReport, MigrateError> {
        fs::create_dir_all(media_dir.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;

        let mut report = ImageReport::default();
        for image in images {
            if !image.has_local_filename() {
                tracing::warn!("skipping image {} with unusable name {}", image.url, image.filename);
                continue;
            }
            if self.fetch_one(image, media_dir)? {
                report.retried += 1;
            }
            report.downloaded += 1;
        }
        Ok(report)
    }

    fn fetch_one(&self, image: &ImageDescriptor, media_dir: &Utf8Path) -> Result<bool, MigrateError> {
        let destination = media_dir.join(&image.filename);
        let mut retried = false;
        if let Err(err) = self.client.download(&image.url, destination.as_std_path()) {
            if !is_transient(&err) {
                return Err(err);
            }
            tracing::warn!("download of {} failed, retrying: {err}", image.url);
            thread::sleep(self.retry_delay);
            retried = true;
            if let Err(err) = self.client.download(&image.url, destination.as_std_path()) {
                tracing::error!("download of {} failed again: {err}", image.url);
                return Err(err);
            }
        }

        let size = fs::metadata(destination.as_std_path())
            .map(|meta| meta.len())
            .unwrap_or(0);
        if size == 0 {
            if destination.as_std_path().exists() {
                fs::remove_file(destination.as_std_path())
                    .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
            }
            tracing::error!("image {} from {} is empty", image.filename, image.url);
            return Err(MigrateError::EmptyImage(image.url.clone()));
        }
        Ok(retried)
    }
}

fn is_transient(err: &MigrateError) -> bool {
    matches!(
        err,
        MigrateError::ImageHttp(_) | MigrateError::ImageStatus { .. }
    )
}
