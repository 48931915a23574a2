pub mod client;
pub mod instance;
pub mod server;
pub mod trigger;
