mod clock_impl;
mod device_id_impl;
mod refresh_transport_fake;
mod session_guard;
mod session_manager;
mod session_watcher;
mod token_codec_impl;
mod token_store;

pub use clock_impl::*;
pub use device_id_impl::*;
pub use refresh_transport_fake::*;
pub use session_guard::*;
pub use session_manager::*;
pub use session_watcher::*;
pub use token_codec_impl::*;
pub use token_store::*;
