mod sarfi_queries;

pub use sarfi_queries::{get_meters, list_events, list_profiles, list_weights};
