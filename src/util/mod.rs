//! Small shared utilities that don't belong to any one service component.

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
