//! Implementations of the ports.
//!
//! - FsTaskStore / FsArtifactStore: upload ディレクトリ上の本番実装
//! - InMemoryTaskStore / InMemoryArtifactStore: テスト・開発用
//! - HttpDownstream: reqwest による JSON-RPC クライアント

pub mod fs_store;
pub mod http_downstream;
pub mod inmem_store;

pub use self::fs_store::{FsArtifactStore, FsTaskStore};
pub use self::http_downstream::HttpDownstream;
pub use self::inmem_store::{InMemoryArtifactStore, InMemoryTaskStore};
