//! Stateless request builder and response parser for the social API.
//!
//! # Design
//! `SocialApi` holds only the base URL and API key. Each operation is split
//! into a `build_*` method that produces an `HttpRequest` and a `parse_*`
//! method that consumes an `HttpResponse`. Protected builders take a
//! `&Session`, so a mutating request cannot be built without credentials.
//!
//! Error normalization is shared by every parser: a non-2xx response fails
//! with the `message` the server put in the body, or with the operation's
//! fallback text when the body has none.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::Session;
use crate::types::{
    Comment, Credentials, Envelope, ListQuery, LoginData, NewComment, Page, Post, PostDraft,
    PostUpdate, Profile, Registration,
};

pub const API_KEY_HEADER: &str = "x-noroff-api-key";

/// Every operation the client performs. Used for error fallbacks and for
/// labelling client events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Login,
    Register,
    Logout,
    ListPosts,
    ListPostsByUser,
    ReadPost,
    CreatePost,
    UpdatePost,
    DeletePost,
    AddComment,
    DeleteComment,
    ReadProfile,
}

impl Call {
    /// Message used when a failed response carries none.
    pub fn default_message(self) -> &'static str {
        match self {
            Call::Login => "Login failed",
            Call::Register => "Registration failed",
            Call::Logout => "Logout failed",
            Call::ListPosts | Call::ListPostsByUser => "Failed to fetch posts",
            Call::ReadPost => "Failed to fetch post",
            Call::CreatePost => "Failed to create post",
            Call::UpdatePost => "Failed to update post",
            Call::DeletePost => "Failed to delete post",
            Call::AddComment => "Failed to add comment",
            Call::DeleteComment => "Failed to delete comment",
            Call::ReadProfile => "Failed to fetch user profile",
        }
    }

    pub fn is_auth(self) -> bool {
        matches!(self, Call::Login | Call::Register)
    }
}

/// Synchronous, stateless request builder and response parser.
#[derive(Debug, Clone)]
pub struct SocialApi {
    base_url: Url,
    api_key: String,
}

impl SocialApi {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, TransportError> {
        let parsed =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url: parsed,
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(&config.base_url, &config.api_key)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub fn build_login(&self, credentials: &Credentials) -> Result<HttpRequest, TransportError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.endpoint(&["auth", "login"]).into(),
            headers: json_headers(),
            body: Some(to_json(credentials)?),
        })
    }

    pub fn build_register(&self, registration: &Registration) -> Result<HttpRequest, TransportError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.endpoint(&["auth", "register"]).into(),
            headers: json_headers(),
            body: Some(to_json(registration)?),
        })
    }

    pub fn parse_login(&self, response: HttpResponse) -> Result<Session, ClientError> {
        expect_success(Call::Login, &response)?;
        let data: LoginData = decode_data(&response)?;
        if data.access_token.trim().is_empty() {
            let reason = "login response has an empty accessToken".to_string();
            return Err(TransportError::Deserialization(reason).into());
        }
        Ok(Session::new(data.access_token, data.name))
    }

    pub fn parse_register(&self, response: HttpResponse) -> Result<Profile, ClientError> {
        expect_success(Call::Register, &response)?;
        Ok(decode_data(&response)?)
    }

    // -----------------------------------------------------------------------
    // Posts
    // -----------------------------------------------------------------------

    pub fn build_list_posts(&self, session: Option<&Session>, query: &ListQuery) -> HttpRequest {
        let mut url = self.endpoint(&["social", "posts"]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("limit", &query.effective_limit().to_string())
                .append_pair("page", &query.effective_page().to_string())
                .append_pair("_author", "true")
                .append_pair("_comments", "true");
            if let Some(tag) = query.effective_tag() {
                pairs.append_pair("tag", tag);
            }
        }
        self.request(HttpMethod::Get, url, session)
    }

    pub fn build_list_posts_by_user(
        &self,
        session: Option<&Session>,
        username: &str,
        query: &ListQuery,
    ) -> HttpRequest {
        let mut url = self.endpoint(&["social", "profiles", username, "posts"]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("limit", &query.effective_limit().to_string())
                .append_pair("page", &query.effective_page().to_string())
                .append_pair("_author", "true")
                .append_pair("author", username)
                .append_pair("_comments", "true");
            if let Some(tag) = query.effective_tag() {
                pairs.append_pair("tag", tag);
            }
        }
        self.request(HttpMethod::Get, url, session)
    }

    pub fn build_read_post(&self, session: Option<&Session>, id: u64) -> HttpRequest {
        let mut url = self.endpoint(&["social", "posts", &id.to_string()]);
        url.query_pairs_mut()
            .append_pair("_author", "true")
            .append_pair("_comments", "true");
        self.request(HttpMethod::Get, url, session)
    }

    pub fn build_create_post(
        &self,
        session: &Session,
        draft: &PostDraft,
    ) -> Result<HttpRequest, TransportError> {
        let url = self.endpoint(&["social", "posts"]);
        self.json_request(HttpMethod::Post, url, session, draft)
    }

    pub fn build_update_post(
        &self,
        session: &Session,
        id: u64,
        update: &PostUpdate,
    ) -> Result<HttpRequest, TransportError> {
        let url = self.endpoint(&["social", "posts", &id.to_string()]);
        self.json_request(HttpMethod::Put, url, session, update)
    }

    pub fn build_delete_post(&self, session: &Session, id: u64) -> HttpRequest {
        let url = self.endpoint(&["social", "posts", &id.to_string()]);
        self.request(HttpMethod::Delete, url, Some(session))
    }

    pub fn parse_list_posts(&self, response: HttpResponse) -> Result<Page<Post>, ClientError> {
        self.parse_page(Call::ListPosts, response)
    }

    pub fn parse_list_posts_by_user(&self, response: HttpResponse) -> Result<Page<Post>, ClientError> {
        self.parse_page(Call::ListPostsByUser, response)
    }

    pub fn parse_read_post(&self, response: HttpResponse) -> Result<Post, ClientError> {
        expect_success(Call::ReadPost, &response)?;
        Ok(decode_data(&response)?)
    }

    pub fn parse_create_post(&self, response: HttpResponse) -> Result<Post, ClientError> {
        expect_success(Call::CreatePost, &response)?;
        Ok(decode_data(&response)?)
    }

    pub fn parse_update_post(&self, response: HttpResponse) -> Result<Post, ClientError> {
        expect_success(Call::UpdatePost, &response)?;
        Ok(decode_data(&response)?)
    }

    pub fn parse_delete_post(&self, response: HttpResponse) -> Result<bool, ClientError> {
        expect_success(Call::DeletePost, &response)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    pub fn build_add_comment(
        &self,
        session: &Session,
        post_id: u64,
        body: &str,
    ) -> Result<HttpRequest, TransportError> {
        let mut url = self.endpoint(&["social", "posts", &post_id.to_string(), "comment"]);
        url.query_pairs_mut().append_pair("_author", "true");
        self.json_request(HttpMethod::Post, url, session, &NewComment { body })
    }

    pub fn build_delete_comment(&self, session: &Session, post_id: u64, comment_id: u64) -> HttpRequest {
        let url = self.endpoint(&[
            "social",
            "posts",
            &post_id.to_string(),
            "comment",
            &comment_id.to_string(),
        ]);
        self.request(HttpMethod::Delete, url, Some(session))
    }

    pub fn parse_add_comment(&self, response: HttpResponse) -> Result<Comment, ClientError> {
        expect_success(Call::AddComment, &response)?;
        Ok(decode_data(&response)?)
    }

    pub fn parse_delete_comment(&self, response: HttpResponse) -> Result<bool, ClientError> {
        expect_success(Call::DeleteComment, &response)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    pub fn build_read_profile(&self, session: Option<&Session>, username: &str) -> HttpRequest {
        let url = self.endpoint(&["social", "profiles", username]);
        self.request(HttpMethod::Get, url, session)
    }

    pub fn parse_read_profile(&self, response: HttpResponse) -> Result<Profile, ClientError> {
        expect_success(Call::ReadProfile, &response)?;
        Ok(decode_data(&response)?)
    }

    // -----------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base can always carry path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn headers(&self, session: Option<&Session>) -> Vec<(String, String)> {
        let mut headers = json_headers();
        headers.push((API_KEY_HEADER.to_string(), self.api_key.clone()));
        if let Some(session) = session {
            headers.push(("authorization".to_string(), session.bearer()));
        }
        headers
    }

    fn request(&self, method: HttpMethod, url: Url, session: Option<&Session>) -> HttpRequest {
        HttpRequest {
            method,
            url: url.into(),
            headers: self.headers(session),
            body: None,
        }
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        url: Url,
        session: &Session,
        payload: &T,
    ) -> Result<HttpRequest, TransportError> {
        Ok(HttpRequest {
            body: Some(to_json(payload)?),
            ..self.request(method, url, Some(session))
        })
    }

    fn parse_page(&self, call: Call, response: HttpResponse) -> Result<Page<Post>, ClientError> {
        expect_success(call, &response)?;
        let envelope: Envelope<Vec<Post>> = decode(&response.body)?;
        Ok(Page {
            items: envelope.data,
            meta: envelope.meta.unwrap_or_default(),
        })
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![("content-type".to_string(), "application/json".to_string())]
}

fn to_json<T: Serialize>(value: &T) -> Result<String, TransportError> {
    serde_json::to_string(value).map_err(|e| TransportError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Deserialization(e.to_string()))
}

fn decode_data<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, TransportError> {
    decode::<Envelope<T>>(&response.body).map(|envelope| envelope.data)
}

/// Map a non-2xx response to `Auth` or `Api`, carrying the server message.
fn expect_success(call: Call, response: &HttpResponse) -> Result<(), ClientError> {
    if response.is_success() {
        return Ok(());
    }
    let status = response.status;
    let message = server_message(&response.body).unwrap_or_else(|| call.default_message().to_string());
    if call.is_auth() {
        Err(ClientError::Auth { status, message })
    } else {
        Err(ClientError::Api { status, message })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// The top-level `message`, or the first `errors[].message` the backend
/// reports validation failures with.
fn server_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .into_iter()
        .chain(parsed.errors.into_iter().filter_map(|detail| detail.message))
        .find(|message| !message.trim().is_empty())
}
