pub use crate::app::App;
pub use prefd_types::error::{Error, PrefResult};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
