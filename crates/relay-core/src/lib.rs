//! relay-core
//!
//! Upload-forwarding queue: admitted requests are persisted, queued, forwarded
//! to a JSON-RPC downstream by a bounded worker pool, retried on transport
//! failure, and every status change is pushed to subscribers.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, state, record, outcome, rpc, events, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, ArtifactStore, Downstream, Clock, IdGenerator）
//! - **queue**: pending / in-flight / history と retry policy
//! - **app**: アプリケーションロジック（builder, runtime, worker_loop, broadcaster, ingress, status）
//! - **impls**: 実装（ファイルストア, HTTP downstream, InMemory ストア）
//! - **config**: 環境変数からの設定
//! - **error**: ストアとクレート全体のエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{Relay, RelayBuilder, RelayHandle, Submission};
pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, StoreError};
