pub mod auth;
pub mod inference;
pub mod queue;
pub mod uploads;
