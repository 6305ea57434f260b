//! # Contact Mirror
//!
//! Keeps a local SQLite replica of a remote address book and serves it to
//! desk phones as a keypad-browsable directory and to everything else as a
//! JSON search API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ People API   │──▶│ Sync engine  │──▶│  SQLite   │
//! │ (paginated)  │   │ batch+retry  │   │ contacts  │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │(cmirror) │         │ XML/JSON │
//!                 └──────────┘         └──────────┘
//! ```
//!
//! Domain logic that needs neither tokio nor SQLite (phone normalization,
//! keypad grouping, reconciliation planning, directory views, search
//! ranking) lives in the `contact-mirror-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! cmirror init                        # create database
//! cmirror sync                        # full first time, incremental after
//! cmirror search "ada"
//! cmirror directory group 2ABC        # XML a phone would see
//! cmirror serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite `ContactStore` |
//! | [`connector_people`] | People-API remote source |
//! | [`credentials`] | Access token providers |
//! | [`sync`] | Sync orchestrator |
//! | [`directory`] | Cisco IP-phone XML |
//! | [`search`] | Search entry points |
//! | [`get`] | Contact retrieval |
//! | [`status`] | Sync status overview |
//! | [`server`] | HTTP server |

pub mod config;
pub mod connector_people;
pub mod credentials;
pub mod db;
pub mod directory;
pub mod get;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod status;
pub mod sync;
