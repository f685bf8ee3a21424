pub mod player;
pub mod resolver;

pub use player::{MediaPlayer, PlaybackProgress, PlaybackState, ProcessPlayer};
pub use resolver::{
    resolver_from_settings, CommandResolver, PassthroughResolver, PlayableSource, SourceResolver,
};
