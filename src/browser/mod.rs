pub mod actions;
pub mod assertions;
#[cfg(feature = "chrome")]
pub mod chrome;
pub mod inject;
pub mod kernel;
pub mod navigation;
pub mod session;

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriver;
pub use inject::{Component, Injectable, ParameterRegistry};
pub use kernel::KernelDriver;
pub use session::Browser;
