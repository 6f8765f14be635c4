pub mod error;

pub use error::{AppError, RpcErrorBody, SignError};

pub type Result<T> = std::result::Result<T, SignError>;
