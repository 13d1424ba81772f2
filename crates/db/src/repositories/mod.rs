//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! any `PgExecutor` as the first argument: `&PgPool` for single statements,
//! `&mut PgConnection` inside [`with_transaction`](crate::with_transaction).

pub mod outbox_repo;
pub mod session_repo;
pub mod task_repo;
pub mod user_repo;
pub mod verification_code_repo;

pub use outbox_repo::OutboxRepo;
pub use session_repo::SessionRepo;
pub use task_repo::TaskRepo;
pub use user_repo::UserRepo;
pub use verification_code_repo::VerificationCodeRepo;
