pub mod disconnect;
pub mod monitor;
pub mod queue;

pub use disconnect::{CountdownState, DisconnectHandle, DisconnectTimer};
pub use monitor::{ProgressMonitor, StallProbe, StallVerdict};
pub use queue::{QueueSnapshot, TrackQueue};
