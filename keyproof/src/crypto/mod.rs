// Crypto module declarations

pub mod challenge;
pub mod keys;
pub mod verify;
