#![deny(missing_docs)]

//! A line-protocol TCP server that simulates a payment-authorization backend, with graceful
//! shutdown.
//!
//! Clients send `PAYMENT|<amount>` lines and receive one `RESPONSE|...` line for each. Amounts
//! above 100 take `min(amount, 10000)` milliseconds to authorize. Stopping the server closes the
//! listener, lets open connections finish for a grace period, and then cancels whatever is still
//! in flight.
//!
//! ## Examples
//!
//! ```no_run
//! use scheme_simulator::{Config, Server};
//! use std::time::Duration;
//! use tokio::signal;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("127.0.0.1:8080").with_grace_period(Duration::from_secs(5));
//!     let server = Server::new(config);
//!     server
//!         .start(async {
//!             let _ = signal::ctrl_c().await;
//!         })
//!         .await?;
//!     server.stop_requested().await;
//!     let outcome = server.stop().await;
//!     eprintln!("stopped: {:?}", outcome);
//!     Ok(())
//! }
//! ```

mod cancel;
pub mod config;
mod connection;
mod error;
pub mod processor;
mod race;
pub mod registry;
mod server;
mod stream;
mod tracker;

pub use cancel::{CancelToken, Cancelled};
pub use config::Config;
pub use connection::{serve, CANCELLED_WRITE_TIMEOUT, MAX_LINE_LENGTH};
pub use error::Error;
pub use processor::{process, Response};
pub use race::{race, Race, Winner};
pub use registry::{ConnectionId, Registry};
pub use server::{Outcome, Phase, Server};
pub use stream::UntilStopped;
pub use tracker::{ConnectionGuard, Drained, Stopping, Tracker};
