pub mod base;
pub mod logging;
pub mod loopback;
pub mod player;

pub use base::*;
pub use logging::*;
pub use loopback::*;
pub use player::*;
