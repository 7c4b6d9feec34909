pub mod events;
pub mod state;
pub mod tracks;

pub use events::*;
pub use state::*;
pub use tracks::*;
