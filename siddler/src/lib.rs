#![no_std]
#[cfg(test)]
#[macro_use]
extern crate std;

pub mod builder;
pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod control;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod flow;
pub mod midi;
pub mod queue;
pub mod render;
pub mod shared;
pub mod stats;
pub mod status;
pub mod tone;
pub mod visual;
pub mod voice;

pub use builder::Builder;
pub use config::Config;
pub use context::{EngineContext, ScanlineContext, ScanlineInput, SoundChip};
pub use control::{Action, ChipMode, ChipModel};
pub use dispatch::StereoFrame;
pub use engine::Engine;
pub use event::RegisterEvent;
pub use render::Renderer;
pub use shared::SharedStatus;
pub use tone::ToneChip;
