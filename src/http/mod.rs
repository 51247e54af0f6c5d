pub mod cookies;
pub mod kernel;
pub mod message;
pub mod options;

pub use cookies::{Cookie, CookieJar};
pub use kernel::{DirectoryKernel, Kernel};
pub use message::{Exchange, Headers, Method, Request, Response};
pub use options::{canonical_header, HttpOptions, ParamValue};
