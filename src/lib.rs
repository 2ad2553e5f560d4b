//! Archive inspection and import for Mass Effect trilogy mods.
//!
//! [`inspect::Inspector`] finds the mods inside a `.zip` or `.7z` archive,
//! recognising both described mods and known unofficial DLC through the
//! catalog. [`extract::extract_selected`] copies the chosen mods into the
//! library, and [`session::ImportSession`] runs both off the caller's thread.

pub mod archive;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod game;
pub mod hashing;
pub mod ini;
pub mod inspect;
pub mod mods;
pub mod remote;
pub mod resolver;
pub mod session;
