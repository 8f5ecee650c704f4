//! Input validation shared by the command layer.

mod url_validator;

pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
