mod keychain;
mod kv;
mod session;

pub use keychain::{KeychainStore, KEYRING_SERVICE};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use session::{SessionStore, KEY_FOLLOWING_LIST, KEY_TOKEN, KEY_USER};
