//! Client-side core for browsing and editing scheduled activities.
//!
//! [`ActivityStore`] keeps an in-memory cache of activities in step with a
//! remote [`ActivityApi`], tracks which activity is selected and whether the
//! edit form is open, and derives date-sorted and day-grouped views for the
//! presentation layer.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod cache;
pub mod config;
pub mod model;
pub mod selection;
pub mod store;
pub mod views;

#[cfg(feature = "http")]
pub mod http;

pub use api::{ActivityApi, ApiError};
pub use cache::EntityCache;
pub use config::{ApiConfig, ConfigError, ValidatedUrl};
pub use model::{Activity, ActivityDraft, ActivityId, ActivityRecord, LatLon, RecordError};
pub use selection::Selection;
pub use store::{
    ActivityStore, IdGenerator, Operation, OperationError, StoreEvent, StoreSnapshot,
    TransientFlags, UuidGenerator,
};
pub use views::DayGroup;

#[cfg(feature = "http")]
pub use http::HttpActivityApi;
