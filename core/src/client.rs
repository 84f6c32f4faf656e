//! Async client for the social API.
//!
//! # Design
//! `SocialClient` combines the stateless `SocialApi` with a `Transport`, the
//! client's own `SessionContext` and an event channel. Every operation runs
//! `build -> execute -> parse`. Protected operations check the session first
//! and fail with `ClientError::NotAuthenticated` before anything is built or
//! sent. Nothing is retried; a failed call is terminal and the caller decides
//! whether to resubmit.

use std::future::Future;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{Call, SocialApi};
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::events::{CallState, ClientEvent, Outcome, EVENT_CAPACITY};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::{Session, SessionContext};
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    Comment, Credentials, ListQuery, Page, Post, PostDraft, PostUpdate, Profile, Registration,
};

pub struct SocialClient<T> {
    api: SocialApi,
    transport: T,
    session: SessionContext,
    events: broadcast::Sender<ClientEvent>,
}

impl SocialClient<UreqTransport> {
    /// Client talking HTTP through ureq, with an in-memory session.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self::new(SocialApi::from_config(config)?, UreqTransport::new()))
    }
}

impl<T: Transport> SocialClient<T> {
    pub fn new(api: SocialApi, transport: T) -> Self {
        Self::with_session(api, transport, SessionContext::in_memory())
    }

    pub fn with_session(api: SocialApi, transport: T, session: SessionContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            transport,
            session,
            events,
        }
    }

    pub fn api(&self) -> &SocialApi {
        &self.api
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Receive state transitions of tracked calls made after this point.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Log in and make the returned session the active one.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = self.api.build_login(&credentials)?;
        self.tracked(
            Call::Login,
            async {
                let session = self.api.parse_login(self.send(request).await?)?;
                self.session.begin(session.clone())?;
                info!(username = %session.username, "session started");
                Ok::<_, ClientError>(session)
            },
            |session| Outcome::SessionStarted {
                username: session.username.clone(),
            },
        )
        .await
    }

    /// Register a new account. Does not start a session.
    pub async fn register(&self, registration: &Registration) -> Result<Profile, ClientError> {
        let request = self.api.build_register(registration)?;
        self.tracked(
            Call::Register,
            async { self.api.parse_register(self.send(request).await?) },
            |profile| Outcome::Registered(profile.clone()),
        )
        .await
    }

    /// Clear the active session and its persisted keys.
    pub fn logout(&self) -> Result<(), ClientError> {
        match self.session.end() {
            Ok(()) => {
                info!("session ended");
                self.emit(Call::Logout, CallState::Succeeded(Outcome::SessionEnded));
                Ok(())
            }
            Err(e) => {
                warn!("logout failed: {e}");
                self.emit(Call::Logout, CallState::Failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn list_posts(&self, query: &ListQuery) -> Result<Page<Post>, ClientError> {
        let request = self.api.build_list_posts(self.session.current().as_ref(), query);
        let response = self.send(request).await;
        self.logged(Call::ListPosts, response.and_then(|r| self.api.parse_list_posts(r)))
    }

    pub async fn list_posts_by_user(
        &self,
        username: &str,
        query: &ListQuery,
    ) -> Result<Page<Post>, ClientError> {
        let request = self
            .api
            .build_list_posts_by_user(self.session.current().as_ref(), username, query);
        let response = self.send(request).await;
        self.logged(
            Call::ListPostsByUser,
            response.and_then(|r| self.api.parse_list_posts_by_user(r)),
        )
    }

    pub async fn read_post(&self, id: u64) -> Result<Post, ClientError> {
        let request = self.api.build_read_post(self.session.current().as_ref(), id);
        let response = self.send(request).await;
        self.logged(Call::ReadPost, response.and_then(|r| self.api.parse_read_post(r)))
    }

    pub async fn read_profile(&self, username: &str) -> Result<Profile, ClientError> {
        let request = self
            .api
            .build_read_profile(self.session.current().as_ref(), username);
        let response = self.send(request).await;
        self.logged(Call::ReadProfile, response.and_then(|r| self.api.parse_read_profile(r)))
    }

    // -----------------------------------------------------------------------
    // Protected writes
    // -----------------------------------------------------------------------

    pub async fn create_post(&self, draft: &PostDraft) -> Result<Post, ClientError> {
        let session = self.require_session(Call::CreatePost)?;
        let request = self.api.build_create_post(&session, draft)?;
        self.tracked(
            Call::CreatePost,
            async { self.api.parse_create_post(self.send(request).await?) },
            |post| Outcome::PostCreated(post.clone()),
        )
        .await
    }

    pub async fn update_post(&self, id: u64, update: &PostUpdate) -> Result<Post, ClientError> {
        let session = self.require_session(Call::UpdatePost)?;
        let request = self.api.build_update_post(&session, id, update)?;
        self.tracked(
            Call::UpdatePost,
            async { self.api.parse_update_post(self.send(request).await?) },
            |post| Outcome::PostUpdated(post.clone()),
        )
        .await
    }

    /// Resolves `true` once the server acknowledged the delete with a 2xx.
    pub async fn delete_post(&self, id: u64) -> Result<bool, ClientError> {
        let session = self.require_session(Call::DeletePost)?;
        let request = self.api.build_delete_post(&session, id);
        self.tracked(
            Call::DeletePost,
            async { self.api.parse_delete_post(self.send(request).await?) },
            |_| Outcome::PostDeleted { id },
        )
        .await
    }

    pub async fn add_comment(&self, post_id: u64, body: &str) -> Result<Comment, ClientError> {
        let session = self.require_session(Call::AddComment)?;
        let request = self.api.build_add_comment(&session, post_id, body)?;
        self.tracked(
            Call::AddComment,
            async { self.api.parse_add_comment(self.send(request).await?) },
            |comment| Outcome::CommentAdded {
                post_id,
                comment: comment.clone(),
            },
        )
        .await
    }

    pub async fn delete_comment(&self, post_id: u64, comment_id: u64) -> Result<bool, ClientError> {
        let session = self.require_session(Call::DeleteComment)?;
        let request = self.api.build_delete_comment(&session, post_id, comment_id);
        self.tracked(
            Call::DeleteComment,
            async { self.api.parse_delete_comment(self.send(request).await?) },
            |_| Outcome::CommentDeleted { post_id, comment_id },
        )
        .await
    }

    // -----------------------------------------------------------------------

    fn require_session(&self, call: Call) -> Result<Session, ClientError> {
        self.session.current().ok_or_else(|| {
            debug!(?call, "rejected: no active session");
            ClientError::NotAuthenticated
        })
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        Ok(self.transport.execute(request).await?)
    }

    fn emit(&self, call: Call, state: CallState) {
        // No subscribers is fine.
        let _ = self.events.send(ClientEvent { call, state });
    }

    fn logged<V>(&self, call: Call, result: Result<V, ClientError>) -> Result<V, ClientError> {
        if let Err(e) = &result {
            warn!(?call, "{e}");
        }
        result
    }

    /// Run `work` as one tracked call: publish `InFlight`, then exactly one
    /// terminal state.
    async fn tracked<V, F>(
        &self,
        call: Call,
        work: F,
        outcome: impl FnOnce(&V) -> Outcome,
    ) -> Result<V, ClientError>
    where
        F: Future<Output = Result<V, ClientError>>,
    {
        self.emit(call, CallState::InFlight);
        match work.await {
            Ok(value) => {
                self.emit(call, CallState::Succeeded(outcome(&value)));
                Ok(value)
            }
            Err(e) => {
                warn!(?call, "{e}");
                self.emit(call, CallState::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}

impl<T> std::fmt::Debug for SocialClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialClient")
            .field("api", &self.api)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
