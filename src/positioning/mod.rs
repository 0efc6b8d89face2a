pub mod config;
pub mod filter;
pub mod fusion;
pub mod signal;
pub mod window;

pub use config::{
    FilterConfig, PositioningConfig, RadiusConfig, SignalModelConfig, TrackingConfig,
    WindowConfig,
};
pub use filter::{classify, Classification, RejectReason};
pub use fusion::FusionEngine;
pub use signal::{distance_from_rssi, radius_from_distances, radius_from_entries};
pub use window::ObservationWindow;
