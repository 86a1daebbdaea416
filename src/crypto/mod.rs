pub mod cipher;
pub mod keystore;

pub use cipher::CipherError;
pub use keystore::{KeyStore, KeyStoreError};
