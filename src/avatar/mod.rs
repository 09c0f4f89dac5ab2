//! Avatar: viseme shape model, frame-timing renderer, and model assets.

pub mod assets;
pub mod renderer;
pub mod shapes;

pub use renderer::{TickSignal, VisemeRenderer};
pub use shapes::{MorphTargetSink, VisemeFrame, SHAPE_CHANNELS, SHAPE_FRAME_RATE};
