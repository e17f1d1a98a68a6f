use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::MigrateError;

pub trait RecordFetcher: Send + Sync {
    fn fetch_xml(&self, url: &str) -> Result<String, MigrateError>;
}

/// Writes the body behind `url` to `destination`. One attempt per call.
pub trait ImageClient: Send + Sync {
    fn download(&self, url: &str, destination: &Path) -> Result<(), MigrateError>;
}

#[derive(Clone)]
pub struct MetsHttpClient {
    client: Client,
}

impl MetsHttpClient {
    pub fn new() -> Result<Self, MigrateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mets-migrate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MigrateError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| MigrateError::RecordHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, MigrateError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(MigrateError::RecordHttp(err.to_string()));
                }
            }
        }
    }
}

impl RecordFetcher for MetsHttpClient {
    fn fetch_xml(&self, url: &str) -> Result<String, MigrateError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "record request failed".to_string());
            return Err(MigrateError::RecordStatus { status, message });
        }
        response
            .text()
            .map_err(|err| MigrateError::RecordHttp(err.to_string()))
    }
}

impl ImageClient for MetsHttpClient {
    fn download(&self, url: &str, destination: &Path) -> Result<(), MigrateError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| MigrateError::ImageHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "image request failed".to_string());
            return Err(MigrateError::ImageStatus { status, message });
        }
        write_body(&mut response, destination)
    }
}

fn write_body(body: &mut impl Read, destination: &Path) -> Result<(), MigrateError> {
    let mut file =
        File::create(destination).map_err(|err| MigrateError::Filesystem(err.to_string()))?;
    if let Err(err) = io::copy(body, &mut file) {
        drop(file);
        if let Err(remove_err) = fs::remove_file(destination) {
            tracing::warn!("could not remove partial file {}: {remove_err}", destination.display());
        }
        return Err(MigrateError::ImageHttp(err.to_string()));
    }
    Ok(())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
