//! Async client core for the social posting API.
//!
//! # Overview
//! Authenticates, reads and writes posts, comments and profiles against the
//! REST backend, attaching credentials the same way on every call and
//! normalizing failures into one error type.
//!
//! # Design
//! - `SocialApi` is stateless and does no I/O. It builds `HttpRequest`
//!   values and parses `HttpResponse` values, so the whole wire contract is
//!   testable without a network.
//! - `SocialClient` drives `SocialApi` through a `Transport`, owns the
//!   `SessionContext` and publishes `ClientEvent`s for UI code.
//! - The session is an explicit object per client, persisted through
//!   `SessionStorage` under the keys `token` and `username`.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod session;
pub mod transport;
pub mod types;

pub use api::{Call, SocialApi, API_KEY_HEADER};
pub use client::SocialClient;
pub use config::ClientConfig;
pub use error::{ClientError, StorageError, TransportError};
pub use events::{CallState, ClientEvent, Outcome};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{FileStorage, MemoryStorage, Session, SessionContext, SessionStorage};
pub use transport::{Transport, UreqTransport};
pub use types::{
    split_tags, AuthorRef, Comment, Credentials, ListQuery, MediaRef, Page, PageMeta, Post,
    PostDraft, PostUpdate, Profile, ProfileCounts, Registration, DEFAULT_LIMIT, DEFAULT_PAGE,
};
