pub mod health;
pub mod job;
pub mod validation;
pub mod ws;
