pub mod connection;
pub mod player;

pub use connection::ConnectionStatus;
pub use player::{PlayerEntry, PlayerStatus};
