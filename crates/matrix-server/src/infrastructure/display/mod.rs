//! Display infrastructure.
//!
//! - **`driver`** – The hardware seam: [`MatrixBackend`] creates a
//!   [`MatrixDriver`] for a given set of panel options.
//! - **`adapter`** – [`DisplayAdapter`] owns one driver, keeps the back
//!   canvas and publishes it on `present()`.
//! - **`headless`** – An in-memory backend used when no panel is attached and
//!   by the test suites.

pub mod adapter;
pub mod driver;
pub mod headless;

pub use adapter::{DisplayAdapter, DisplayError};
pub use driver::{DriverError, MatrixBackend, MatrixDriver, MatrixOptions};
pub use headless::HeadlessBackend;
