//! Domain types and pure logic for the identity service.
//!
//! Nothing in this crate performs I/O; persistence lives in `tessera-db` and
//! orchestration in `tessera-service`.

pub mod error;
pub mod password;
pub mod roles;
pub mod secret;
pub mod tasks;
pub mod token;
pub mod types;
pub mod validation;
