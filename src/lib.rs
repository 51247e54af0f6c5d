pub mod assertion;
pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod http;
pub mod testing;
pub mod types;
pub mod utils;

pub use assertion::{not, Assertion, AssertionFailure, FailureHandler};
pub use browser::{Browser, Component, KernelDriver};
#[cfg(feature = "chrome")]
pub use browser::ChromeDriver;
pub use self::core::{Config, Driver, HttpAware, Interactive, ProfileAware, Visual};
pub use dom::{Crawler, FieldValue, Node, NodeKind, Selector, SelectorKind};
pub use errors::{BrowserError, Result};
pub use http::{HttpOptions, Kernel, Method, Request, Response};
pub use types::*;
