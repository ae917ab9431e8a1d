pub mod resilience;
pub mod time;
pub mod unit;
