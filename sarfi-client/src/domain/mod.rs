mod event;
mod meter;
mod profile;
mod weight;

pub use event::{EventMatcher, EventQuery, VoltageDipEvent, NO_DIP_VOLTAGE, VOLTAGE_DIP};
pub use meter::{Meter, UNKNOWN_VOLTAGE_LEVEL};
pub use profile::Profile;
pub use weight::Weight;
