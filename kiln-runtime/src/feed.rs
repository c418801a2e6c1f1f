//! Session feeds and the per-layer cache they carry.
//!
//! Step 0 feeds the whole prompt with empty cache placeholders. Every later
//! step feeds only the newest token plus the cache the previous invocation
//! returned, so the session never recomputes already-processed positions.

use kiln::session::names;
use kiln::{Error, HostTensor, Result, SessionConfig, TensorMap};

/// Cached keys and values of one layer.
#[derive(Debug, Clone)]
pub struct LayerCache {
    pub key: HostTensor,
    pub value: HostTensor,
}

/// Per-layer cache, indexed by layer.
#[derive(Debug, Clone)]
pub struct KvCache {
    layers: Vec<LayerCache>,
}

impl KvCache {
    /// Empty `[1, heads, 0, head_dim]` placeholders for every layer.
    #[must_use]
    pub fn empty(config: &SessionConfig) -> Self {
        let shape = config.empty_cache_shape();
        let layers = (0..config.num_layers)
            .map(|_| LayerCache {
                key: HostTensor::zeros(&shape, config.cache_dtype),
                value: HostTensor::zeros(&shape, config.cache_dtype),
            })
            .collect();
        Self { layers }
    }

    /// Take the `present.*` outputs of an invocation as the new cache.
    ///
    /// The tensors are moved out of `outputs`.
    ///
    /// # Errors
    /// Returns `SessionInvocation` if any layer's key or value is missing.
    pub fn from_outputs(outputs: &mut TensorMap, num_layers: usize) -> Result<Self> {
        let mut take = |name: String| {
            outputs
                .remove(&name)
                .ok_or_else(|| Error::SessionInvocation(format!("session returned no `{name}`")))
        };
        let layers = (0..num_layers)
            .map(|layer| {
                Ok(LayerCache {
                    key: take(names::present_key(layer))?,
                    value: take(names::present_value(layer))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Cache of layer `layer`, if it exists.
    #[must_use]
    pub fn layer(&self, layer: usize) -> Option<&LayerCache> {
        self.layers.get(layer)
    }

    /// Number of positions held, read from layer 0's time dimension.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.layers
            .first()
            .and_then(|l| l.key.shape().get(2).copied())
            .unwrap_or(0)
    }
}

/// Builds the named input tensors of one invocation.
#[derive(Debug, Clone)]
pub struct SessionFeedBuilder {
    config: SessionConfig,
}

impl SessionFeedBuilder {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Feed for step 0: the whole prompt and empty cache placeholders.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `prompt` is empty.
    pub fn prefill(&self, prompt: &[u32]) -> Result<TensorMap> {
        if prompt.is_empty() {
            return Err(Error::InvalidShape("prompt has no tokens".into()));
        }
        let ids: Vec<i64> = prompt.iter().map(|&id| i64::from(id)).collect();
        let positions: Vec<i64> = (0..ids.len()).map(to_i64).collect();
        self.feed(&ids, &positions, ids.len(), &KvCache::empty(&self.config))
    }

    /// Feed for step `s > 0`: the newest token of `sequence` and the cache
    /// the previous invocation returned.
    ///
    /// `sequence` is the prompt followed by every accepted token.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `sequence` is empty or `cache` does not
    /// cover the configured layer count.
    pub fn decode(&self, sequence: &[u32], cache: &KvCache) -> Result<TensorMap> {
        let Some(&last) = sequence.last() else {
            return Err(Error::InvalidShape("sequence has no tokens".into()));
        };
        if cache.num_layers() != self.config.num_layers {
            return Err(Error::InvalidShape(format!(
                "cache has {} layers, session expects {}",
                cache.num_layers(),
                self.config.num_layers
            )));
        }
        let len = sequence.len();
        self.feed(&[i64::from(last)], &[to_i64(len - 1)], len, cache)
    }

    fn feed(
        &self,
        ids: &[i64],
        positions: &[i64],
        total_len: usize,
        cache: &KvCache,
    ) -> Result<TensorMap> {
        let mut feeds = TensorMap::with_capacity(3 + 2 * self.config.num_layers);
        feeds.insert(
            names::INPUT_IDS.to_string(),
            HostTensor::from_i64(&[1, ids.len()], ids)?,
        );
        feeds.insert(
            names::POSITION_IDS.to_string(),
            HostTensor::from_i64(&[1, positions.len()], positions)?,
        );
        feeds.insert(
            names::ATTENTION_MASK.to_string(),
            HostTensor::from_i64(&[1, total_len], &vec![1; total_len])?,
        );
        for (layer, entry) in cache.layers.iter().enumerate() {
            feeds.insert(names::past_key(layer), entry.key.clone());
            feeds.insert(names::past_value(layer), entry.value.clone());
        }
        Ok(feeds)
    }
}

#[allow(clippy::cast_possible_wrap)]
fn to_i64(n: usize) -> i64 {
    n as i64
}
