//! Upstream collaborators: the slate for a date and the final box scores.
//!
//! Both speak the crate's own JSON shapes ([`SlateEntry`], [`PlayerResult`]);
//! translating third-party sports APIs into them happens elsewhere.
//!
//! [`SlateEntry`]: crate::db::models::SlateEntry
//! [`PlayerResult`]: crate::db::models::PlayerResult

pub mod http;
pub mod json_dir;
pub mod provider;

pub use http::HttpFeed;
pub use json_dir::{read_json_list, JsonDirFeed};
pub use provider::{ResultsProvider, SlateProvider};
