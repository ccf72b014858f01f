pub mod app;
pub mod error;
pub mod game;
pub mod leaderboard;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod shared;
pub mod store;

pub use error::SyncError;
