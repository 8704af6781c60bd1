//! Background worker: request protocol, remote service, thumbnail pool, and
//! the job loop that ties them together.

pub mod handler;
pub mod protocol;
pub mod service;
pub mod thumbnail;
pub mod transport;

pub use handler::{Worker, WorkerConfig};
pub use protocol::{DataMethod, NotificationLevel, WorkerReply, WorkerRequest};
pub use service::{CallCounts, CollectionService, MemoryService};
pub use thumbnail::{ImmediatePool, ThumbnailDone, ThumbnailJob, ThumbnailPool};
pub use transport::{LocalTransport, ThreadTransport, WorkerTransport};
