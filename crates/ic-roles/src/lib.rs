//! # ic-roles
//!
//! Argument-role registry and path utilities for IronCurtain.
//!
//! Every tool argument the policy engine looks at carries zero or more
//! [`ArgumentRole`]s. The role determines how the raw argument value is
//! normalized before any rule is matched: path roles expand `~`, follow
//! symlinks on every existing ancestor, and collapse parent traversals;
//! `github-owner` lowercases; `none` is the identity.
//!
//! The registry is closed: adding a role means adding an enum variant here
//! and updating the match arms. An annotation that references a role this
//! crate does not know fails loading with [`RoleError::UnknownRole`].

mod error;
mod path;
mod role;

pub use error::RoleError;
pub use path::{expand_tilde, is_contained, normalize_path};
pub use role::ArgumentRole;
