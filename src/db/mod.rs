mod connection;
mod helpers;
mod migrations;
pub mod repositories;
pub mod transactional;

pub use connection::Database;
pub use transactional::{DocumentTxn, TransactionalStore};
