pub mod errors;
pub mod manifest;
pub mod store;
pub mod update;

pub use errors::{ManifestError, ShapeError};
pub use update::{UpdateOutcome, UpdateRequest, update};
