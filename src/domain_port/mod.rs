// store

mod key_value_store;

pub use key_value_store::*;

// remote

mod refresh_transport;
mod time_source;

pub use refresh_transport::*;
pub use time_source::*;

// local

mod clock;
mod device_id_provider;

pub use clock::*;
pub use device_id_provider::*;
