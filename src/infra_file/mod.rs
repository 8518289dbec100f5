mod key_value_store_file;

pub use key_value_store_file::*;
