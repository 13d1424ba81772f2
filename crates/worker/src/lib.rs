//! Task queue consumer.
//!
//! [`TaskProcessor`] claims tasks from the `tasks` table and runs the
//! [`TaskHandler`] registered for each task type.

pub mod config;
pub mod handler;
pub mod processor;
pub mod send_verify_email;

pub use handler::{TaskError, TaskHandler};
pub use processor::{ProcessorSettings, TaskProcessor};
pub use send_verify_email::SendVerifyEmailHandler;
