pub mod controller;
pub mod state;

pub use controller::{SessionController, SessionDeps, SessionReport, UiChannels};
pub use state::{transition, Phase, PlaylistItem, SessionAction, SessionState, TransitionError};
