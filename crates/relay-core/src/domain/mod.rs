//! Domain model (ids, task, status, records, outcomes, errors, push messages).

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod rpc;
pub mod state;
pub mod task;

pub use self::errors::{StateError, TransportError, ValidationError};
pub use self::events::{ClientMessage, ServerMessage, PONG};
pub use self::ids::{SubscriberId, TaskId};
pub use self::outcome::DownstreamResult;
pub use self::record::{RecordError, TaskRecord, TaskView};
pub use self::rpc::RpcRequest;
pub use self::state::TaskStatus;
pub use self::task::{Forward, Method, Task};
