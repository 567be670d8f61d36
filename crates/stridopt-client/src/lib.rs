//! # stridopt-client
//!
//! Application core of the Stridopt client: the session, typed live feeds
//! for every screen, and the write commands behind them. Presentation code
//! holds an [`AppState`], binds feeds with the current identity and calls
//! into [`commands`].

pub mod aggregates;
pub mod commands;
pub mod config;
pub mod error;
pub mod feeds;
pub mod logging;
pub mod session;
pub mod state;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::Session;
pub use state::{AppState, Backend};
