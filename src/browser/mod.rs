pub mod extract;
pub mod fingerprint;
pub mod session;

pub use session::BrowserSessionProvider;
