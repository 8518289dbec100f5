mod expiry;
mod session;
mod token;

pub use expiry::*;
pub use session::*;
pub use token::*;
