//! # stridopt-sync
//!
//! Live, self-healing subscriptions over the document store. A single
//! generic primitive ([`LiveQuery`]) is parameterised by a query and a
//! document mapper; [`LiveSlot`] swaps subscriptions when their inputs
//! change; [`catalog`] names the query behind every feed.

pub mod catalog;
pub mod live;
pub mod retry;
pub mod slot;

mod error;

pub use error::{Result, SyncError};
pub use live::{LiveEvent, LiveQuery, LiveStatus, LiveView};
pub use retry::RetryPolicy;
pub use slot::LiveSlot;
