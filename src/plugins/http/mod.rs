pub mod cli;
pub mod driver;
pub mod fetch;
pub mod wire;
