//! HTTP(S) transport.
//!
//! Loaders read a JSON index shaped as `{ bundle_id: { "version": "url" } }`
//! and download archives from the listed URLs. Uploaders POST archives to a
//! fixed endpoint.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::bundler::archive::{
    ARCHIVE_MIME_TYPE, ArchiveInput, Archiver, Unarchiver, is_valid_archive, pack_directory,
};
use crate::bundler::store::parse_version;
use crate::config::HttpConfig;
use crate::error::{BundleError, Result};
use crate::remote::{AccessorConfig, Loader, LoaderFactory, Uploader, UploaderFactory};

/// `{ bundle_id: { version_string: url } }`
type BundleIndex = BTreeMap<String, BTreeMap<String, String>>;

/// Whether `url` parses as http(s) with a non-empty host.
pub fn is_valid_http_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| !host.is_empty())
    })
}

/// URL and optional CA certificate for URL-shaped accessor configs.
fn http_target(config: &AccessorConfig) -> Option<(&str, Option<&Path>)> {
    match config {
        AccessorConfig::Url { url } => Some((url.as_str(), None)),
        AccessorConfig::Https {
            url,
            ca_certificate,
        } => Some((url.as_str(), ca_certificate.as_deref())),
        AccessorConfig::Directory { .. } => None,
    }
    .filter(|(url, _)| is_valid_http_url(url))
}

fn build_client(http: &HttpConfig, ca_certificate: Option<&Path>) -> Result<Client> {
    let mut builder = Client::builder().user_agent(http.user_agent.clone());
    if let Some(path) = ca_certificate {
        let pem = fs::read(path).map_err(|err| {
            BundleError::Config(format!("read CA certificate {}: {err}", path.display()))
        })?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
    }
    Ok(builder.build()?)
}

// =============================================================================
// LOADER
// =============================================================================

pub struct HttpLoaderFactory {
    http: HttpConfig,
}

impl HttpLoaderFactory {
    pub const fn new(http: HttpConfig) -> Self {
        Self { http }
    }
}

impl LoaderFactory for HttpLoaderFactory {
    fn try_load(&self, config: &AccessorConfig) -> Option<Box<dyn Loader>> {
        let (url, ca_certificate) = http_target(config)?;
        match build_client(&self.http, ca_certificate) {
            Ok(client) => Some(Box::new(HttpLoader::with_client(
                url,
                client,
                self.http.cache_directory.clone(),
            ))),
            Err(err) => {
                warn!(url = %url, error = %err, "cannot build HTTP client for remote");
                None
            }
        }
    }
}

/// Loads bundles listed in a remote JSON index.
pub struct HttpLoader {
    index_url: String,
    client: Client,
    cache_directory: Option<PathBuf>,
    index: Option<BundleIndex>,
}

impl HttpLoader {
    pub fn new(index_url: impl Into<String>) -> Result<Self> {
        let client = build_client(&HttpConfig::default(), None)?;
        Ok(Self::with_client(index_url, client, None))
    }

    pub fn with_client(
        index_url: impl Into<String>,
        client: Client,
        cache_directory: Option<PathBuf>,
    ) -> Self {
        Self {
            index_url: index_url.into(),
            client,
            cache_directory,
            index: None,
        }
    }

    /// Downloaded archives are kept here and unpacked from disk.
    #[must_use]
    pub fn with_cache_directory(mut self, directory: Option<PathBuf>) -> Self {
        self.cache_directory = directory;
        self
    }

    /// Fetch the index on first use and keep it for the loader's lifetime.
    fn index(&mut self) -> Result<&BundleIndex> {
        if self.index.is_none() {
            debug!(url = %self.index_url, "fetching bundle index");
            let response = self.client.get(&self.index_url).send()?;
            if !response.status().is_success() {
                return Err(BundleError::LoadFailed(format!(
                    "index {} returned {}",
                    self.index_url,
                    response.status()
                )));
            }
            let index: BundleIndex = response.json()?;
            self.index = Some(index);
        }
        Ok(self.index.get_or_insert_with(BundleIndex::new))
    }

    /// Numeric versions of `bundle_id` mapped to their URLs. Non-numeric
    /// keys are skipped.
    fn releases(&mut self, bundle_id: &str) -> Result<BTreeMap<u64, String>> {
        let index_url = self.index_url.clone();
        let Some(entries) = self.index()?.get(bundle_id) else {
            return Ok(BTreeMap::new());
        };
        let mut releases = BTreeMap::new();
        for (key, url) in entries {
            match parse_version(key) {
                Some(version) => {
                    releases.insert(version, url.clone());
                }
                None => warn!(
                    index = %index_url,
                    bundle = %bundle_id,
                    key = %key,
                    "skipping non-numeric version key"
                ),
            }
        }
        Ok(releases)
    }

    fn download(&self, url: &str, bundle_id: &str, version: u64) -> Result<ArchiveInput> {
        let mut response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(BundleError::LoadFailed(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        match &self.cache_directory {
            Some(cache) => {
                fs::create_dir_all(cache)?;
                let path = cache.join(Archiver::archive_name(bundle_id, version));
                let mut file = File::create(&path)?;
                response.copy_to(&mut file)?;
                file.flush()?;
                Ok(ArchiveInput::File(path))
            }
            None => Ok(ArchiveInput::Bytes(response.bytes()?.to_vec())),
        }
    }
}

impl Loader for HttpLoader {
    fn describe(&self) -> String {
        format!("http index {}", self.index_url)
    }

    fn can_load(&mut self, bundle_id: &str, version: Option<u64>) -> bool {
        let releases = match self.releases(bundle_id) {
            Ok(releases) => releases,
            Err(err) => {
                warn!(index = %self.index_url, error = %err, "cannot read bundle index");
                return false;
            }
        };
        match version {
            Some(version) => releases
                .get(&version)
                .is_some_and(|url| is_valid_http_url(url)),
            None => releases.values().any(|url| is_valid_http_url(url)),
        }
    }

    fn bundle_versions(&mut self, bundle_id: &str) -> Result<Vec<u64>> {
        Ok(self.releases(bundle_id)?.into_keys().collect())
    }

    fn load(&mut self, bundle_id: &str, version: Option<u64>, base_directory: &Path) -> Result<()> {
        let releases = self.releases(bundle_id)?;
        let version = match version {
            Some(version) => version,
            None => *releases.keys().next_back().ok_or_else(|| {
                BundleError::LoadFailed(format!("no releases found for {bundle_id}"))
            })?,
        };
        let url = releases.get(&version).ok_or_else(|| {
            BundleError::LoadFailed(format!("no URL for {bundle_id} version {version}"))
        })?;
        if !is_valid_http_url(url) {
            return Err(BundleError::LoadFailed(format!(
                "invalid URL for {bundle_id} version {version}: {url}"
            )));
        }

        let input = self.download(url, bundle_id, version)?;
        Unarchiver::new(None).unpack(&input, Some(base_directory))?;
        info!(bundle = %bundle_id, version, url = %url, "downloaded bundle");
        Ok(())
    }
}

// =============================================================================
// UPLOADER
// =============================================================================

pub struct HttpUploaderFactory {
    http: HttpConfig,
}

impl HttpUploaderFactory {
    pub const fn new(http: HttpConfig) -> Self {
        Self { http }
    }
}

impl UploaderFactory for HttpUploaderFactory {
    fn try_upload(&self, config: &AccessorConfig) -> Option<Box<dyn Uploader>> {
        let (url, ca_certificate) = http_target(config)?;
        match build_client(&self.http, ca_certificate) {
            Ok(client) => Some(Box::new(HttpUploader::with_client(url, client))),
            Err(err) => {
                warn!(url = %url, error = %err, "cannot build HTTP client for remote");
                None
            }
        }
    }
}

/// POSTs bundle archives to an endpoint.
pub struct HttpUploader {
    upload_url: String,
    client: Client,
}

impl HttpUploader {
    pub fn new(upload_url: impl Into<String>) -> Result<Self> {
        let client = build_client(&HttpConfig::default(), None)?;
        Ok(Self::with_client(upload_url, client))
    }

    pub fn with_client(upload_url: impl Into<String>, client: Client) -> Self {
        Self {
            upload_url: upload_url.into(),
            client,
        }
    }
}

impl Uploader for HttpUploader {
    fn describe(&self) -> String {
        format!("http endpoint {}", self.upload_url)
    }

    fn can_upload(&self, bundle_path: &Path) -> bool {
        bundle_path.is_dir() || bundle_path.is_file()
    }

    fn upload(&mut self, bundle_path: &Path) -> Result<()> {
        // Keeps a packed directory alive until the request is sent.
        let mut packed: Option<NamedTempFile> = None;
        let archive_path = if bundle_path.is_dir() {
            let temp = NamedTempFile::new()?;
            pack_directory(bundle_path, temp.reopen()?)?.sync_all()?;
            let path = temp.path().to_path_buf();
            packed = Some(temp);
            path
        } else {
            bundle_path.to_path_buf()
        };

        if !is_valid_archive(&archive_path) {
            return Err(BundleError::not_a_bundle(
                bundle_path,
                "not a valid bundle archive",
            ));
        }

        let body = fs::read(&archive_path)?;
        let response = self
            .client
            .post(&self.upload_url)
            .header(CONTENT_TYPE, ARCHIVE_MIME_TYPE)
            .body(body)
            .send()?;
        drop(packed);

        let status = response.status();
        if !status.is_success() {
            return Err(BundleError::UploadFailed(format!(
                "{} returned {status}",
                self.upload_url
            )));
        }
        info!(path = %bundle_path.display(), url = %self.upload_url, "uploaded bundle");
        Ok(())
    }
}
