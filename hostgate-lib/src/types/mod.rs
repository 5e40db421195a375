#![allow(unreachable_pub)]

mod content;
mod cookies;
mod error;
mod request;
mod response;

pub use content::{Content, Image, ImageFormat, ResponseEncoding};
pub use cookies::CookieJar;
pub use error::ErrorKind;
pub use request::{Body, RequestSpec};
pub use response::Response;

/// The hostgate `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
