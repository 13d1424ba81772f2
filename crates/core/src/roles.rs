//! Role names stored in `users.role`.
//!
//! `ROLE_USER` must match the column default in `20250101000001_create_users_table.sql`.

pub const ROLE_USER: &str = "user";
