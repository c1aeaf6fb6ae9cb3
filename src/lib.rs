pub mod coalesce;
pub mod config;
pub mod error;
mod reduce;
pub mod tensor;
pub mod transport;
pub mod types;

pub use coalesce::{Coalescer, PartitionPlan, Partitions, SyncCoalescer};
pub use config::CoalesceConfig;
pub use error::{CoalesceError, Result};
pub use tensor::{Element, Tensor, TensorView};
pub use transport::{BulkLink, Capabilities, ChannelLink, Group, RingTransport, TcpLink, Transport};
pub use types::{DataType, Rank, ReduceOp};
