pub mod secure_storage;

pub use secure_storage::{FileSecureStorage, MemorySecureStorage, SecretBytes, SecureStorage};
