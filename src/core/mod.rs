//! Core Infrastructure
//!
//! Clock, token value generation and authentication key derivation.

pub mod clock;
pub mod generator;
pub mod key;

pub use clock::{Clock, MockClock, SystemClock};
pub use generator::{MockTokenGenerator, RandomTokenGenerator, TokenValueGenerator};
pub use key::{AuthenticationKeyGenerator, DefaultAuthenticationKeyGenerator};
