pub mod client;
pub mod connection;
pub mod executor;
pub mod queries;
mod session;

pub use client::{SqlClient, connect, connect_to};
pub use session::{SqlServerSession, SqlServerSessionProvider};
