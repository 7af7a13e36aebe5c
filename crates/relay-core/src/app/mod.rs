//! Application layer: admission, dispatch, execution and the push channel.

pub mod broadcaster;
pub mod builder;
pub mod ingress;
pub mod runtime;
pub mod status;
pub mod worker_loop;

pub use self::broadcaster::{Broadcaster, FanOut, TaskViews};
pub use self::builder::{BuildError, RelayBuilder};
pub use self::ingress::Submission;
pub use self::runtime::{RecoveryReport, Relay, RelayHandle, ShutdownReport};
pub use self::status::RelayStatus;
pub use self::worker_loop::{Worker, WorkerPool};
