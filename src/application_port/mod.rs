mod session_service;
mod token_codec;

pub use session_service::*;
pub use token_codec::*;
