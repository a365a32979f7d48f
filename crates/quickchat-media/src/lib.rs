pub mod storage;

pub use storage::{decode_data_uri, DecodedImage, LocalStorage, Storage, StorageError};
