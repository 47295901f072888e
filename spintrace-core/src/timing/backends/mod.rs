//! Clock implementations
//!
//! - `SystemClock`: UTC wall clock via chrono
//! - `MockClock`: settable clock for tests
//!
//! ## Choosing a Clock
//!
//! - **Tests**: Use `MockClock`
//! - **Everything else**: Use `SystemClock`

mod mock;
mod std_backend;

pub use mock::MockClock;
pub use std_backend::SystemClock;
