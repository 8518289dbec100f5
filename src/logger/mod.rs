//! Process-wide tracing setup with a filter that is reloaded after settings load.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
