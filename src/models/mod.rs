mod beacon;
mod estimate;
mod observation;
mod sighting;

pub use beacon::{BeaconRecord, Coordinates};
pub use estimate::LocationEstimate;
pub use observation::ObservationEntry;
pub use sighting::Sighting;
