//! RelayBuilder - コンポーネントのワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 0 のプールサイズや容量は build() で弾く
//! - ports を差し替えられるので、テストは InMemory 実装でそのまま組める

use std::sync::Arc;

use super::broadcaster::Broadcaster;
use super::runtime::Relay;
use super::worker_loop::Worker;
use crate::config::RelayConfig;
use crate::error::StoreError;
use crate::impls::{FsArtifactStore, FsTaskStore, HttpDownstream};
use crate::ports::{ArtifactStore, Downstream, IdGenerator, SystemClock, TaskStore, UlidGenerator};
use crate::queue::TaskQueue;

/// # 使用例
/// ```ignore
/// let relay = RelayBuilder::new(config)
///     .with_defaults()
///     .await?
///     .build()?;
/// ```
pub struct RelayBuilder {
    config: RelayConfig,
    store: Option<Arc<dyn TaskStore>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    downstream: Option<Arc<dyn Downstream>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}. Provide it or call with_defaults().")]
    MissingComponent(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot build http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            store: None,
            artifacts: None,
            downstream: None,
            ids: None,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn downstream(mut self, downstream: Arc<dyn Downstream>) -> Self {
        self.downstream = Some(downstream);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Fill every component not set yet from the config: file stores under
    /// `upload_dir`, an HTTP downstream and ULID ids on the system clock.
    pub async fn with_defaults(mut self) -> Result<Self, BuildError> {
        if self.store.is_none() {
            self.store = Some(Arc::new(FsTaskStore::open(&self.config.upload_dir).await?));
        }
        if self.artifacts.is_none() {
            self.artifacts = Some(Arc::new(
                FsArtifactStore::open(&self.config.upload_dir).await?,
            ));
        }
        if self.downstream.is_none() {
            self.downstream = Some(Arc::new(HttpDownstream::new(
                self.config.request_timeout,
                self.config.downstream_base_url.clone(),
            )?));
        }
        if self.ids.is_none() {
            self.ids = Some(Arc::new(UlidGenerator::new(SystemClock)));
        }
        Ok(self)
    }

    fn validate(&self) -> Result<(), BuildError> {
        let checks = [
            ("pool_size", self.config.pool_size),
            ("history_cap", self.config.history_cap),
            ("event_capacity", self.config.event_capacity),
            ("subscriber_capacity", self.config.subscriber_capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(BuildError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        if u32::try_from(self.config.pool_size).is_err() {
            return Err(BuildError::InvalidConfig(format!(
                "pool_size {} is too large",
                self.config.pool_size
            )));
        }
        if self.config.request_timeout.is_zero() {
            return Err(BuildError::InvalidConfig(
                "request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn build(self) -> Result<Relay, BuildError> {
        self.validate()?;

        let store = self.store.ok_or(BuildError::MissingComponent("task store"))?;
        let artifacts = self
            .artifacts
            .ok_or(BuildError::MissingComponent("artifact store"))?;
        let downstream = self
            .downstream
            .ok_or(BuildError::MissingComponent("downstream"))?;
        let ids = self.ids.ok_or(BuildError::MissingComponent("id generator"))?;

        let queue = Arc::new(TaskQueue::new(self.config.history_cap));
        let (broadcaster, fan_out) = Broadcaster::new(
            Arc::clone(&artifacts),
            self.config.event_capacity,
            self.config.subscriber_capacity,
        );
        let broadcaster = Arc::new(broadcaster);

        let worker = Arc::new(Worker {
            queue: Arc::clone(&queue),
            store: Arc::clone(&store),
            artifacts: Arc::clone(&artifacts),
            downstream,
            broadcaster: Arc::clone(&broadcaster),
            retry: self.config.retry.clone(),
            call_timeout: self.config.request_timeout,
        });

        Ok(Relay::new(
            self.config,
            queue,
            store,
            artifacts,
            broadcaster,
            fan_out,
            worker,
            ids,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryArtifactStore, InMemoryTaskStore};
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::Value;

    use crate::domain::{RpcRequest, TransportError};

    struct NoDownstream;

    #[async_trait]
    impl Downstream for NoDownstream {
        async fn call(&self, endpoint: &str, _request: &RpcRequest) -> Result<Value, TransportError> {
            Err(TransportError::InvalidEndpoint(endpoint.to_string()))
        }
    }

    fn builder(config: RelayConfig) -> RelayBuilder {
        RelayBuilder::new(config)
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .artifact_store(Arc::new(InMemoryArtifactStore::new()))
            .downstream(Arc::new(NoDownstream))
            .id_generator(Arc::new(UlidGenerator::new(SystemClock)))
    }

    #[tokio::test]
    async fn test_build_success() {
        assert!(builder(RelayConfig::default()).build().is_ok());
    }

    #[rstest]
    #[case::pool(RelayConfig { pool_size: 0, ..RelayConfig::default() }, "pool_size")]
    #[case::history(RelayConfig { history_cap: 0, ..RelayConfig::default() }, "history_cap")]
    #[case::events(RelayConfig { event_capacity: 0, ..RelayConfig::default() }, "event_capacity")]
    #[case::subscribers(RelayConfig { subscriber_capacity: 0, ..RelayConfig::default() }, "subscriber_capacity")]
    fn test_build_rejects_zero_sizes(#[case] config: RelayConfig, #[case] field: &str) {
        let err = builder(config).build().err().unwrap();
        assert!(matches!(err, BuildError::InvalidConfig(ref msg) if msg.contains(field)));
    }

    #[test]
    fn test_build_missing_component() {
        let err = RelayBuilder::new(RelayConfig::default())
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::MissingComponent("artifact store")));
    }

    #[tokio::test]
    async fn test_with_defaults_opens_the_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            upload_dir: dir.path().join("uploads"),
            ..RelayConfig::default()
        };
        let relay = RelayBuilder::new(config)
            .with_defaults()
            .await
            .unwrap()
            .build();
        assert!(relay.is_ok());
        assert!(dir.path().join("uploads").is_dir());
    }
}
