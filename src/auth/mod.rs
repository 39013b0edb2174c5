//! Token persistence, token inspection and the session built on them

pub mod session;
pub mod storage;
pub mod token;

pub use session::{Session, SessionAction, SessionController};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, TokenStore};
pub use token::{AuthEvent, DecodedToken, TokenPair};
