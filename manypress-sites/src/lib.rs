//! # manypress-sites
//!
//! Site records and the orchestration layer that fans one site's publish
//! out to every enabled protocol backend:
//! - [`store`] — [`SiteConfigStore`]: create / get / update / sync /
//!   delete / list_all / stats over the persisted `sites` collection
//! - [`error`] — [`SiteError`], [`SyncFailure`]

pub mod error;
pub mod store;

pub use error::{SiteError, SyncFailure};
pub use store::{SiteConfigStore, DEFAULT_SYNC_TIMEOUT};
