//! # Contact Mirror Core
//!
//! Runtime-independent logic for Contact Mirror: data models, phone
//! normalization, keypad grouping, the [`store::ContactStore`] abstraction,
//! reconciliation planning, directory view building, and search ranking.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The storage
//! engine, remote provider client, and sync orchestrator live in the
//! `contact-mirror` application crate.

pub mod directory;
pub mod error;
pub mod keypad;
pub mod models;
pub mod phone;
pub mod reconcile;
pub mod remote;
pub mod search;
pub mod store;
