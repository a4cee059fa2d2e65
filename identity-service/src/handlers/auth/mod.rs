pub mod registration;
pub mod session;
pub mod social;

pub use registration::register;
pub use session::{current_session, issue_token, login, logout};
pub use social::{google_callback, google_link, google_signin};
