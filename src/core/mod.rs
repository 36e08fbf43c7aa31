pub mod aggregator;
pub mod body;
pub mod dispatcher;
pub mod fanout;
pub mod replicator;
pub mod resolution;
pub mod target;

pub use aggregator::{AggregateResult, TargetReport, aggregate};
pub use body::{BodyCapturer, CaptureError};
pub use dispatcher::{AttemptError, AttemptOutcome, Cancelled, Dispatcher};
pub use fanout::{FanOutError, FanOutService, ForwardOutcome};
pub use replicator::{CapturedRequest, HeaderPlacement, ReplicateError, RequestReplicator};
pub use target::{RouteError, ServiceTarget};
