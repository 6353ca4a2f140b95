pub mod error;
pub mod tx;

pub use error::{AppError, AppResult};
pub use tx::Db;
