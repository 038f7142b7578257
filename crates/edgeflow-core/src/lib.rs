pub mod error;
pub mod traits;
pub mod types;

pub use error::{EdgeError, Result};
pub use traits::{single_input, Stage};
pub use types::*;
