//! Ports - 抽象化レイヤー
//!
//! 外部との境界（ディスク、downstream、時刻、ID 生成）を trait で切り出します。
//! テストでは InMemory 実装や FixedClock に差し替えます。

pub mod artifact_store;
pub mod clock;
pub mod downstream;
pub mod id_generator;
pub mod task_store;

pub use self::artifact_store::ArtifactStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::downstream::Downstream;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
