//! Testing utilities for trellis kernels.
//!
//! - **TestClient** - dispatches requests against a [`Kernel`](trellis_core::Kernel)
//! - **Assertions** - status, header and body checks on [`TestResponse`]
//! - **RecordingLogger / FailingLogger** - fault logger doubles
//! - **Spy / MockController** - call recording
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{Kernel, action};
//! use trellis_testing::*;
//!
//! let mut kernel = Kernel::new();
//! kernel
//!     .router(|r| {
//!         r.get("/hello", action(|_| Ok("Hello!")))?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let client = TestClient::new(Arc::new(kernel));
//! let response = client.get("/hello");
//! assert_status(&response, 200);
//! assert_eq!(response.body_string(), Some("Hello!".to_string()));
//! ```

pub mod assertions;
pub mod mock;
pub mod test_client;

pub use assertions::*;
pub use mock::*;
pub use test_client::*;
