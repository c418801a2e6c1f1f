//! Model artifact loading: cache first, network on miss.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use kiln::{CancelToken, Error, Result};

use crate::cache::ArtifactCache;
use crate::fetch::ArtifactFetcher;
use crate::store::{ArtifactMetadata, RecordStore};

/// Where a model's two artifacts live.
///
/// Parsed from a JSON manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelSource {
    /// Logical name; cache records are namespaced under it.
    pub name: String,
    /// URL of the serialized graph.
    pub graph_url: String,
    /// URL of the external weights file the graph refers to.
    pub weights_url: String,
}

impl ModelSource {
    /// Phi-3 mini instruct, q4f16 web export.
    #[must_use]
    pub fn phi3_mini_web() -> Self {
        const BASE: &str =
            "https://huggingface.co/microsoft/Phi-3-mini-4k-instruct-onnx-web/resolve/main/onnx";
        Self {
            name: "phi3-mini-4k-q4f16".into(),
            graph_url: format!("{BASE}/model_q4f16.onnx"),
            weights_url: format!("{BASE}/model_q4f16.onnx_data"),
        }
    }

    /// Load a manifest from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let source: Self = serde_json::from_str(&content)?;
        Ok(source)
    }

    /// Cache name of the graph artifact.
    #[must_use]
    pub fn graph_artifact(&self) -> String {
        format!("{}.graph", self.name)
    }

    /// Cache name of the weights artifact.
    #[must_use]
    pub fn weights_artifact(&self) -> String {
        format!("{}.weights", self.name)
    }
}

/// Where a [`ModelArtifacts`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    Cache,
    Network,
}

/// The two buffers handed to session creation.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub graph: Vec<u8>,
    pub weights: Vec<u8>,
    pub origin: ArtifactOrigin,
}

/// Loads model artifacts through an [`ArtifactCache`], fetching on a miss.
pub struct ArtifactLoader<S> {
    cache: ArtifactCache<S>,
    fetcher: ArtifactFetcher,
}

impl<S: RecordStore> ArtifactLoader<S> {
    #[must_use]
    pub fn new(cache: ArtifactCache<S>, fetcher: ArtifactFetcher) -> Self {
        Self { cache, fetcher }
    }

    #[must_use]
    pub fn cache(&self) -> &ArtifactCache<S> {
        &self.cache
    }

    /// Return the model's graph and weights.
    ///
    /// A cache hit needs both artifacts. On a miss both URLs are fetched in
    /// parallel and written back to the cache; a failed write is logged and
    /// does not fail the load.
    ///
    /// # Errors
    /// Returns `Download` if either fetch fails and `Cancelled` if `cancel`
    /// fires before the artifacts are in hand.
    pub async fn load(&self, source: &ModelSource, cancel: &CancelToken) -> Result<ModelArtifacts> {
        cancel.check()?;
        if let Some(artifacts) = self.load_cached(source).await {
            info!(model = %source.name, "loaded model from cache");
            return Ok(artifacts);
        }

        info!(model = %source.name, "model not cached, downloading");
        let mut buffers = self
            .fetcher
            .fetch_all(&[&source.graph_url, &source.weights_url], cancel)
            .await?;
        let (Some(weights), Some(graph), None) = (buffers.pop(), buffers.pop(), buffers.pop())
        else {
            return Err(Error::Other("fetcher returned the wrong number of buffers".into()));
        };
        info!(
            model = %source.name,
            graph_mib = graph.len() / (1024 * 1024),
            weights_mib = weights.len() / (1024 * 1024),
            "downloaded model"
        );

        for (name, bytes) in [
            (source.graph_artifact(), &graph),
            (source.weights_artifact(), &weights),
        ] {
            match self.cache.store_with_cancel(&name, bytes, cancel).await {
                Ok(_) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => warn!(artifact = %name, error = %e, "caching failed, continuing"),
            }
        }

        Ok(ModelArtifacts {
            graph,
            weights,
            origin: ArtifactOrigin::Network,
        })
    }

    async fn load_cached(&self, source: &ModelSource) -> Option<ModelArtifacts> {
        let graph = self.cache.load(&source.graph_artifact()).await?;
        let weights = self.cache.load(&source.weights_artifact()).await?;
        Some(ModelArtifacts {
            graph,
            weights,
            origin: ArtifactOrigin::Cache,
        })
    }

    /// Metadata of the cached graph and weights, if present.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the backend fails.
    pub async fn inspect(
        &self,
        source: &ModelSource,
    ) -> Result<(Option<ArtifactMetadata>, Option<ArtifactMetadata>)> {
        let graph = self.cache.metadata(&source.graph_artifact()).await?;
        let weights = self.cache.metadata(&source.weights_artifact()).await?;
        Ok((graph, weights))
    }

    /// Drop both artifacts from the cache.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if a delete fails.
    pub async fn evict(&self, source: &ModelSource) -> Result<()> {
        self.cache.evict(&source.graph_artifact()).await?;
        self.cache.evict(&source.weights_artifact()).await
    }
}
