pub mod config;
pub mod controller;
pub mod convert;
pub mod decode;
pub mod device;
pub mod effects;
pub mod error;
pub mod render;
pub mod session;
pub mod sink;
pub mod status;

pub use config::PlaybackConfig;
pub use controller::Controller;
pub use error::PlayerError;
pub use session::Session;
pub use status::{StatusReporter, StatusSnapshot};
