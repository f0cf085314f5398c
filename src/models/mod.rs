pub mod messages;
pub mod notification;
pub mod photo;
pub mod search;
pub mod user;
