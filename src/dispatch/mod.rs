// src/dispatch/mod.rs

pub mod context;
pub mod dispatcher;
pub mod ui_loop;

pub use context::UiContext;
pub use dispatcher::{channel, Envelope, EnvelopeKind, ResultDispatcher, UiCallback};
pub use ui_loop::{UiLoop, UiThread};
