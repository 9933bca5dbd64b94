mod error;
pub use error::{AppError, ErrorBody, ErrorCode};

mod env;
pub use env::APP_ENV;

mod message;
pub use message::{MemCellKind, RawMessage, Scene};
