//! Core of the Aras requirement import toolkit.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values for the Aras
//! OData API without touching the network (host-does-IO). A [`Session`]
//! pairs the stateless [`OdataClient`] with a host-supplied [`Transport`]
//! and a lazily acquired bearer token.
//!
//! # Design
//! - `client`: one `build_*` / `parse_*` pair per REST operation.
//! - `session`: authentication and per-operation error logging.
//! - `content`: TechDoc XML for requirements and the aggregate document.
//! - `decode`: ordered decoders for loosely specified response shapes.
//! - `import` / `refresh`: the two batch workflows, sequential and blocking.

pub mod client;
pub mod content;
pub mod decode;
pub mod error;
pub mod http;
pub mod import;
pub mod refresh;
pub mod session;
pub mod types;

pub use client::{ArasAction, DeleteAction, ItemQuery, OdataClient};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use import::{ImportOutcome, ImportSettings, Importer, Pause, ThreadSleep, Throttle};
pub use session::{Credentials, PasswordGrant, Session};
pub use types::{CreatedRecord, FailedRecord, ImportEntry, ImportResults, ImportSummary};
