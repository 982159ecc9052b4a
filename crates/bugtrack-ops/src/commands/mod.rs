pub mod backup;
pub mod monitor;
