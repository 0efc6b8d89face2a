pub mod controller;
pub mod engine;
pub mod loop_worker;

pub use controller::TrackingController;
pub use engine::{CycleError, PositioningEngine};
pub use loop_worker::{wall_clock, ObservationClock, TrackingContext};
