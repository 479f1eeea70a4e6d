mod adapters;
mod host;
mod resolver;

pub use adapters::adapter_for;
pub use host::HostKind;
pub use resolver::{ReviewFetch, ReviewMap, ReviewResolver};
