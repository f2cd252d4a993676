//! stashd: minimal multi-user item stash.
//!
//! Users register and log in for a bearer token, keep opaque item records,
//! and hand items to each other through single-use transfer links. Module
//! map:
//! - [`auth`]: credential store + the authorization gate
//! - [`items`]: item records with a single current owner
//! - [`transfer`]: two-step ownership hand-off
//! - [`gateway`]: axum HTTP boundary
//! - [`config`], [`error`]: ambient plumbing

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod items;
pub mod transfer;
