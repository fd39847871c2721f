#![forbid(unsafe_code)]

pub mod aggregate;
pub mod gating;
pub mod model;
pub mod navigation;
pub mod time;

pub use time::Clock;
