pub mod context;
pub mod error;

pub use context::{AppContext, ClearOutcome};
pub use error::{HeadwireError, Result};
