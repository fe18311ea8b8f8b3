//! Explicit transport registry.

use crate::config::HttpConfig;
use crate::remote::fs::{DirectoryLoaderFactory, DirectoryUploaderFactory};
use crate::remote::http::{HttpLoaderFactory, HttpUploaderFactory};
use crate::remote::{AccessorConfig, Loader, Uploader};

/// Builds a loader for configs it understands.
pub trait LoaderFactory {
    fn try_load(&self, config: &AccessorConfig) -> Option<Box<dyn Loader>>;
}

/// Builds an uploader for configs it understands.
pub trait UploaderFactory {
    fn try_upload(&self, config: &AccessorConfig) -> Option<Box<dyn Uploader>>;
}

impl<F> LoaderFactory for F
where
    F: Fn(&AccessorConfig) -> Option<Box<dyn Loader>>,
{
    fn try_load(&self, config: &AccessorConfig) -> Option<Box<dyn Loader>> {
        self(config)
    }
}

impl<F> UploaderFactory for F
where
    F: Fn(&AccessorConfig) -> Option<Box<dyn Uploader>>,
{
    fn try_upload(&self, config: &AccessorConfig) -> Option<Box<dyn Uploader>> {
        self(config)
    }
}

/// Ordered loader and uploader factories. Passed explicitly to whatever
/// needs transports; there is no process-wide table.
#[derive(Default)]
pub struct TransportRegistry {
    loaders: Vec<Box<dyn LoaderFactory>>,
    uploaders: Vec<Box<dyn UploaderFactory>>,
}

impl TransportRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP(S) and local-directory transports.
    pub fn with_defaults(http: &HttpConfig) -> Self {
        let mut registry = Self::new();
        registry.register_loader(HttpLoaderFactory::new(http.clone()));
        registry.register_loader(DirectoryLoaderFactory);
        registry.register_uploader(HttpUploaderFactory::new(http.clone()));
        registry.register_uploader(DirectoryUploaderFactory);
        registry
    }

    pub fn register_loader(&mut self, factory: impl LoaderFactory + 'static) -> &mut Self {
        self.loaders.push(Box::new(factory));
        self
    }

    pub fn register_uploader(&mut self, factory: impl UploaderFactory + 'static) -> &mut Self {
        self.uploaders.push(Box::new(factory));
        self
    }

    pub(crate) fn loaders_for(&self, config: &AccessorConfig) -> Vec<Box<dyn Loader>> {
        self.loaders
            .iter()
            .filter_map(|factory| factory.try_load(config))
            .collect()
    }

    pub(crate) fn uploaders_for(&self, config: &AccessorConfig) -> Vec<Box<dyn Uploader>> {
        self.uploaders
            .iter()
            .filter_map(|factory| factory.try_upload(config))
            .collect()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("loaders", &self.loaders.len())
            .field("uploaders", &self.uploaders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_produces_nothing() {
        let registry = TransportRegistry::new();
        assert!(registry.loaders_for(&AccessorConfig::url("http://h/i")).is_empty());
        assert!(registry.uploaders_for(&AccessorConfig::directory("/tmp")).is_empty());
    }

    #[test]
    fn closures_act_as_factories() {
        let mut registry = TransportRegistry::new();
        registry.register_loader(|config: &AccessorConfig| -> Option<Box<dyn Loader>> {
            match config {
                AccessorConfig::Directory { path } => Some(Box::new(
                    crate::remote::fs::DirectoryLoader::new(path.clone()),
                )),
                _ => None,
            }
        });
        assert_eq!(registry.loaders_for(&AccessorConfig::directory("/srv")).len(), 1);
        assert!(registry.loaders_for(&AccessorConfig::url("http://h/i")).is_empty());
    }
}
