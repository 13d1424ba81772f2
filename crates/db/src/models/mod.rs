pub mod outbox;
pub mod session;
pub mod task;
pub mod user;
pub mod verification_code;
