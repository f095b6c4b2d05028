//! lifelog - terminal timeline dashboard for personal data.
//!
//! Lanes of events and graphs over a shared, pannable window. Each lane is
//! backed by a paginated SQL-over-HTTP source that is fetched in calendar
//! chunks at a resolution picked from the window width.

pub mod api;
pub mod catalog;
pub mod config;
pub mod family;
pub mod loader;
pub mod query;
pub mod range;
pub mod records;
pub mod resolution;
pub mod source;
pub mod view;

pub mod app;
pub mod theme;
pub mod timeline;
pub mod ui;
