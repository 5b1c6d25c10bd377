pub mod conversation;
pub mod diesel_ulid;
pub mod message;
pub mod planned_message;
pub mod user;

pub use diesel_ulid::DieselUlid;
