pub mod blockchain;
pub mod coin;
pub mod events;
pub mod node;
