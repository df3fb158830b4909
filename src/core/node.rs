pub mod models;

use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;

use crate::core::types::BlockHash;
use crate::core::types::Height;
use crate::core::types::SpecVersion;
use models::ChainEvent;
use models::ExtendedHeader;
use models::SignedBlock;

/// Hashes of recently resolved heights.
const HASH_CACHE_SIZE: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("node has no {0}")]
    NotFound(String),
    #[error("unexpected node response: {0}")]
    Parse(String),
}

/// Read access to chain data, decoded to JSON by the node gateway.
///
/// All methods are point-in-time reads, safe to repeat after a rolled
/// back transaction. Timeouts and connection management are the
/// implementation's concern.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Main-chain block hash at given height.
    async fn block_hash(&self, height: Height) -> Result<BlockHash, NodeError>;

    /// Block with decoded extrinsics.
    async fn block(&self, hash: &str) -> Result<SignedBlock, NodeError>;

    /// Digest-derived header data (block author).
    async fn extended_header(&self, hash: &str) -> Result<ExtendedHeader, NodeError>;

    /// Full event vector of a block, in emission order.
    async fn events(&self, hash: &str) -> Result<Vec<ChainEvent>, NodeError>;

    /// Decoded storage value at given block. Null when the key is empty.
    async fn state(
        &self,
        hash: &str,
        module: &str,
        item: &str,
        args: &[&str],
    ) -> Result<serde_json::Value, NodeError>;

    /// Runtime spec version active at given block.
    async fn runtime_version(&self, hash: &str) -> Result<SpecVersion, NodeError>;

    /// Height of the last finalized block.
    async fn finalized_height(&self) -> Result<Height, NodeError>;
}

/// HTTP client for a decoding node gateway.
pub struct Node {
    id: String,
    url: String,
    http: reqwest::Client,
    hash_cache: Mutex<LruCache<Height, BlockHash>>,
}

impl Node {
    pub fn new(id: &str, url: &str) -> Self {
        tracing::debug!("using node gateway [{id}] at {url}");
        Self {
            id: id.to_owned(),
            url: url.trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
            hash_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(HASH_CACHE_SIZE).unwrap(),
            )),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, NodeError> {
        let url = format!("{}{}", self.url, path);
        tracing::trace!("[{}] GET {url}", self.id);
        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound(path.to_owned()));
        }
        let response = response.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChainClient for Node {
    async fn block_hash(&self, height: Height) -> Result<BlockHash, NodeError> {
        if let Some(hash) = self.hash_cache.lock().unwrap().get(&height) {
            return Ok(hash.clone());
        }
        let res: models::BlockHashResponse = self
            .get(&format!("/chain/blocks/height/{height}"))
            .await
            .map_err(|e| match e {
                NodeError::NotFound(_) => NodeError::NotFound(format!("block at {height}")),
                other => other,
            })?;
        self.hash_cache
            .lock()
            .unwrap()
            .put(height, res.hash.clone());
        Ok(res.hash)
    }

    async fn block(&self, hash: &str) -> Result<SignedBlock, NodeError> {
        self.get(&format!("/chain/blocks/{hash}")).await
    }

    async fn extended_header(&self, hash: &str) -> Result<ExtendedHeader, NodeError> {
        self.get(&format!("/chain/blocks/{hash}/header")).await
    }

    async fn events(&self, hash: &str) -> Result<Vec<ChainEvent>, NodeError> {
        let res: models::EventsResponse = self.get(&format!("/chain/blocks/{hash}/events")).await?;
        Ok(res.events)
    }

    async fn state(
        &self,
        hash: &str,
        module: &str,
        item: &str,
        args: &[&str],
    ) -> Result<serde_json::Value, NodeError> {
        let mut path = format!("/chain/state/{module}/{item}?at={hash}");
        if !args.is_empty() {
            path.push_str(&format!("&keys={}", args.join(",")));
        }
        let res: models::StateResponse = self.get(&path).await?;
        Ok(res.value)
    }

    async fn runtime_version(&self, hash: &str) -> Result<SpecVersion, NodeError> {
        let res: models::RuntimeVersionResponse =
            self.get(&format!("/chain/runtime?at={hash}")).await?;
        Ok(res.spec_version)
    }

    async fn finalized_height(&self) -> Result<Height, NodeError> {
        let res: models::FinalizedHead = self.get("/chain/finalized").await?;
        Ok(res.height)
    }
}

#[cfg(feature = "test-utilities")]
pub use mock::MockNode;

#[cfg(feature = "test-utilities")]
mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::models;
    use super::ChainClient;
    use super::NodeError;
    use crate::core::types::BlockHash;
    use crate::core::types::Height;
    use crate::core::types::SpecVersion;

    /// In-memory chain for tests. Unregistered lookups return `NotFound`
    /// (hashes/blocks) or null (state), mirroring the gateway contract.
    #[derive(Default)]
    pub struct MockNode {
        hashes: HashMap<Height, BlockHash>,
        blocks: HashMap<BlockHash, models::SignedBlock>,
        headers: HashMap<BlockHash, models::ExtendedHeader>,
        events: HashMap<BlockHash, Vec<models::ChainEvent>>,
        state: HashMap<String, serde_json::Value>,
        spec_versions: HashMap<BlockHash, SpecVersion>,
        finalized: Mutex<Height>,
    }

    fn state_key(hash: &str, module: &str, item: &str, args: &[&str]) -> String {
        format!("{hash}|{module}|{item}|{}", args.join(","))
    }

    impl MockNode {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_hash(mut self, height: Height, hash: &str) -> Self {
            self.hashes.insert(height, hash.to_owned());
            self
        }

        pub fn with_block(mut self, hash: &str, block: models::SignedBlock) -> Self {
            self.blocks.insert(hash.to_owned(), block);
            self
        }

        pub fn with_header(mut self, hash: &str, header: models::ExtendedHeader) -> Self {
            self.headers.insert(hash.to_owned(), header);
            self
        }

        pub fn with_events(mut self, hash: &str, events: Vec<models::ChainEvent>) -> Self {
            self.events.insert(hash.to_owned(), events);
            self
        }

        pub fn with_state(
            mut self,
            hash: &str,
            module: &str,
            item: &str,
            args: &[&str],
            value: serde_json::Value,
        ) -> Self {
            self.state.insert(state_key(hash, module, item, args), value);
            self
        }

        pub fn with_spec_version(mut self, hash: &str, version: SpecVersion) -> Self {
            self.spec_versions.insert(hash.to_owned(), version);
            self
        }

        pub fn with_finalized(self, height: Height) -> Self {
            *self.finalized.lock().unwrap() = height;
            self
        }

        pub fn set_finalized(&self, height: Height) {
            *self.finalized.lock().unwrap() = height;
        }
    }

    #[async_trait]
    impl ChainClient for MockNode {
        async fn block_hash(&self, height: Height) -> Result<BlockHash, NodeError> {
            self.hashes
                .get(&height)
                .cloned()
                .ok_or_else(|| NodeError::NotFound(format!("block at {height}")))
        }

        async fn block(&self, hash: &str) -> Result<models::SignedBlock, NodeError> {
            self.blocks
                .get(hash)
                .cloned()
                .ok_or_else(|| NodeError::NotFound(format!("block {hash}")))
        }

        async fn extended_header(&self, hash: &str) -> Result<models::ExtendedHeader, NodeError> {
            Ok(self.headers.get(hash).cloned().unwrap_or(
                models::ExtendedHeader {
                    author: None,
                    digest: serde_json::Value::Null,
                },
            ))
        }

        async fn events(&self, hash: &str) -> Result<Vec<models::ChainEvent>, NodeError> {
            Ok(self.events.get(hash).cloned().unwrap_or_default())
        }

        async fn state(
            &self,
            hash: &str,
            module: &str,
            item: &str,
            args: &[&str],
        ) -> Result<serde_json::Value, NodeError> {
            Ok(self
                .state
                .get(&state_key(hash, module, item, args))
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        }

        async fn runtime_version(&self, hash: &str) -> Result<SpecVersion, NodeError> {
            Ok(self.spec_versions.get(hash).copied().unwrap_or(1))
        }

        async fn finalized_height(&self) -> Result<Height, NodeError> {
            Ok(*self.finalized.lock().unwrap())
        }
    }
}
