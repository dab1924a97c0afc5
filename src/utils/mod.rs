//! The `utils` module holds the pieces shared by every layer of the proxy:
//! the error taxonomy and logging initialisation.

pub mod error;
pub mod logging;

pub use error::{ProxyError, Result};
