//! Session credential model, redacted secrets, and login requests.

pub mod credential;
pub mod login;
pub mod secret;

pub use credential::*;
pub use login::*;
pub use secret::*;
