use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// The only key accepted in the `x-noroff-api-key` header.
pub const API_KEY: &str = "mock-api-key";

/// Largest page size the backend serves.
pub const MAX_LIMIT: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Media {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Clone, Debug)]
struct Account {
    name: String,
    email: String,
    password: String,
    bio: Option<String>,
    avatar: Option<Media>,
    banner: Option<Media>,
}

#[derive(Clone, Debug)]
struct PostRecord {
    id: u64,
    title: String,
    body: Option<String>,
    tags: Vec<String>,
    media: Option<Media>,
    owner: String,
    comments: Vec<CommentRecord>,
}

#[derive(Clone, Debug)]
struct CommentRecord {
    id: u64,
    body: String,
    post_id: u64,
    owner: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileView {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<Media>,
    pub banner: Option<Media>,
    #[serde(rename = "_count", skip_serializing_if = "Option::is_none", default)]
    pub count: Option<Counts>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Counts {
    pub posts: usize,
    pub followers: usize,
    pub following: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: u64,
    pub body: String,
    pub post_id: u64,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<ProfileView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostView {
    pub id: u64,
    pub title: String,
    pub body: Option<String>,
    pub tags: Vec<String>,
    pub media: Option<Media>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<ProfileView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comments: Option<Vec<CommentView>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub is_first_page: bool,
    pub is_last_page: bool,
    pub current_page: usize,
    pub previous_page: Option<usize>,
    pub next_page: Option<usize>,
    pub page_count: usize,
    pub total_count: usize,
}

#[derive(Deserialize)]
pub struct Register {
    pub name: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub avatar: Option<Media>,
    pub banner: Option<Media>,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreatePost {
    pub title: String,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub media: Option<Media>,
}

#[derive(Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub media: Option<Media>,
}

#[derive(Deserialize)]
pub struct CreateComment {
    pub body: String,
}

#[derive(Deserialize, Default)]
pub struct Embed {
    #[serde(rename = "_author", default)]
    pub author: bool,
    #[serde(rename = "_comments", default)]
    pub comments: bool,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub tag: Option<String>,
    #[serde(rename = "_author", default)]
    pub with_author: bool,
    #[serde(rename = "_comments", default)]
    pub with_comments: bool,
}

impl ListParams {
    fn embed(&self) -> Embed {
        Embed {
            author: self.with_author,
            comments: self.with_comments,
        }
    }
}

#[derive(Default)]
pub struct Store {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    posts: BTreeMap<u64, PostRecord>,
    next_post_id: u64,
    next_comment_id: u64,
}

pub type Db = Arc<RwLock<Store>>;

/// Failure rendered in the backend's `errors[]` shape.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("No {what} with such ID"))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = json!({
            "errors": [{ "message": self.message }],
            "status": self.status.canonical_reason().unwrap_or_default(),
            "statusCode": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiFailure>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/social/posts", get(list_posts).post(create_post))
        .route(
            "/social/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/social/posts/{id}/comment", post(create_comment))
        .route("/social/posts/{id}/comment/{comment_id}", delete(delete_comment))
        .route("/social/profiles/{name}", get(get_profile))
        .route("/social/profiles/{name}/posts", get(list_profile_posts))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn envelope<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "data": data, "meta": {} }))
}

/// Resolve the caller from the api key and bearer token headers.
fn authorize(store: &Store, headers: &HeaderMap) -> ApiResult<String> {
    let key = headers
        .get("x-noroff-api-key")
        .and_then(|value| value.to_str().ok());
    if key != Some(API_KEY) {
        return Err(ApiFailure::new(StatusCode::UNAUTHORIZED, "No API key header was found"));
    }
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| store.tokens.get(token))
        .cloned()
        .ok_or_else(|| ApiFailure::new(StatusCode::UNAUTHORIZED, "Missing or invalid authorization header"))
}

impl Store {
    fn profile_view(&self, account: &Account, with_counts: bool) -> ProfileView {
        ProfileView {
            name: account.name.clone(),
            email: account.email.clone(),
            bio: account.bio.clone(),
            avatar: account.avatar.clone(),
            banner: account.banner.clone(),
            count: with_counts.then(|| Counts {
                posts: self.posts.values().filter(|p| p.owner == account.name).count(),
                followers: 0,
                following: 0,
            }),
        }
    }

    fn author_view(&self, name: &str) -> Option<ProfileView> {
        self.accounts.get(name).map(|a| self.profile_view(a, false))
    }

    fn comment_view(&self, comment: &CommentRecord, with_author: bool) -> CommentView {
        CommentView {
            id: comment.id,
            body: comment.body.clone(),
            post_id: comment.post_id,
            owner: comment.owner.clone(),
            author: if with_author { self.author_view(&comment.owner) } else { None },
        }
    }

    fn post_view(&self, post: &PostRecord, embed: &Embed) -> PostView {
        PostView {
            id: post.id,
            title: post.title.clone(),
            body: post.body.clone(),
            tags: post.tags.clone(),
            media: post.media.clone(),
            author: if embed.author { self.author_view(&post.owner) } else { None },
            comments: embed.comments.then(|| {
                post.comments
                    .iter()
                    .map(|c| self.comment_view(c, embed.author))
                    .collect()
            }),
        }
    }

    /// Newest first, filtered, then sliced into the requested page.
    /// `limit` is capped at `MAX_LIMIT`.
    fn page(&self, params: &ListParams, owner: Option<&str>) -> (Vec<PostView>, Meta) {
        let limit = params.limit.unwrap_or(MAX_LIMIT).clamp(1, MAX_LIMIT);
        let page = params.page.unwrap_or(1).max(1);
        let matching: Vec<&PostRecord> = self
            .posts
            .values()
            .rev()
            .filter(|p| owner.map_or(true, |owner| p.owner == owner))
            .filter(|p| params.tag.as_ref().map_or(true, |tag| p.tags.contains(tag)))
            .collect();
        let embed = params.embed();
        let total_count = matching.len();
        let page_count = total_count.div_ceil(limit).max(1);
        let items = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(|p| self.post_view(p, &embed))
            .collect();
        let meta = Meta {
            is_first_page: page == 1,
            is_last_page: page >= page_count,
            current_page: page,
            previous_page: (page > 1).then(|| page - 1),
            next_page: (page < page_count).then(|| page + 1),
            page_count,
            total_count,
        };
        (items, meta)
    }
}

// --- auth ---

async fn register(
    State(db): State<Db>,
    Json(input): Json<Register>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut store = db.write().await;
    if input.password.len() < 8 {
        return Err(ApiFailure::new(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
        ));
    }
    if store.accounts.contains_key(&input.name)
        || store.accounts.values().any(|a| a.email == input.email)
    {
        return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Profile already exists"));
    }
    let account = Account {
        name: input.name,
        email: input.email,
        password: input.password,
        bio: input.bio,
        avatar: input.avatar,
        banner: input.banner,
    };
    let view = store.profile_view(&account, false);
    store.accounts.insert(account.name.clone(), account);
    debug!(name = %view.name, "registered");
    Ok((StatusCode::CREATED, envelope(view)))
}

async fn login(
    State(db): State<Db>,
    Json(input): Json<Login>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut store = db.write().await;
    let account = store
        .accounts
        .values()
        .find(|a| a.email == input.email && a.password == input.password)
        .cloned()
        .ok_or_else(|| ApiFailure::new(StatusCode::UNAUTHORIZED, "Invalid email or password"))?;
    let token = Uuid::new_v4().to_string();
    store.tokens.insert(token.clone(), account.name.clone());
    let mut data = serde_json::to_value(store.profile_view(&account, false))
        .map_err(|e| ApiFailure::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    data["accessToken"] = json!(token);
    Ok(envelope(data))
}

// --- posts ---

async fn list_posts(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = db.read().await;
    authorize(&store, &headers)?;
    let (items, meta) = store.page(&params, None);
    Ok(Json(json!({ "data": items, "meta": meta })))
}

async fn create_post(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreatePost>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut store = db.write().await;
    let owner = authorize(&store, &headers)?;
    if input.title.trim().is_empty() {
        return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Title cannot be empty"));
    }
    store.next_post_id += 1;
    let post = PostRecord {
        id: store.next_post_id,
        title: input.title,
        body: input.body,
        tags: input.tags.unwrap_or_default(),
        media: input.media,
        owner,
        comments: Vec::new(),
    };
    let view = store.post_view(&post, &Embed::default());
    store.posts.insert(post.id, post);
    Ok((StatusCode::CREATED, envelope(view)))
}

async fn get_post(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(embed): Query<Embed>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = db.read().await;
    authorize(&store, &headers)?;
    let post = store.posts.get(&id).ok_or_else(|| ApiFailure::not_found("post"))?;
    Ok(envelope(store.post_view(post, &embed)))
}

async fn update_post(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(input): Json<UpdatePost>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut store = db.write().await;
    let caller = authorize(&store, &headers)?;
    let post = store.posts.get_mut(&id).ok_or_else(|| ApiFailure::not_found("post"))?;
    if post.owner != caller {
        return Err(ApiFailure::new(StatusCode::FORBIDDEN, "You are not the owner of this post"));
    }
    if let Some(title) = input.title {
        post.title = title;
    }
    if let Some(body) = input.body {
        post.body = Some(body);
    }
    if let Some(tags) = input.tags {
        post.tags = tags;
    }
    if let Some(media) = input.media {
        post.media = Some(media);
    }
    let post = post.clone();
    Ok(envelope(store.post_view(&post, &Embed::default())))
}

async fn delete_post(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let mut store = db.write().await;
    let caller = authorize(&store, &headers)?;
    let post = store.posts.get(&id).ok_or_else(|| ApiFailure::not_found("post"))?;
    if post.owner != caller {
        return Err(ApiFailure::new(StatusCode::FORBIDDEN, "You are not the owner of this post"));
    }
    store.posts.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

// --- comments ---

async fn create_comment(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Query(embed): Query<Embed>,
    Json(input): Json<CreateComment>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut store = db.write().await;
    let owner = authorize(&store, &headers)?;
    if !store.posts.contains_key(&id) {
        return Err(ApiFailure::not_found("post"));
    }
    store.next_comment_id += 1;
    let comment = CommentRecord {
        id: store.next_comment_id,
        body: input.body,
        post_id: id,
        owner,
    };
    let view = store.comment_view(&comment, embed.author);
    if let Some(post) = store.posts.get_mut(&id) {
        post.comments.push(comment);
    }
    Ok((StatusCode::CREATED, envelope(view)))
}

async fn delete_comment(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((id, comment_id)): Path<(u64, u64)>,
) -> ApiResult<StatusCode> {
    let mut store = db.write().await;
    let caller = authorize(&store, &headers)?;
    let post = store.posts.get_mut(&id).ok_or_else(|| ApiFailure::not_found("post"))?;
    let index = post
        .comments
        .iter()
        .position(|c| c.id == comment_id)
        .ok_or_else(|| ApiFailure::not_found("comment"))?;
    if post.comments[index].owner != caller {
        return Err(ApiFailure::new(StatusCode::FORBIDDEN, "You are not the owner of this comment"));
    }
    post.comments.remove(index);
    Ok(StatusCode::NO_CONTENT)
}

// --- profiles ---

async fn get_profile(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = db.read().await;
    authorize(&store, &headers)?;
    let account = store
        .accounts
        .get(&name)
        .ok_or_else(|| ApiFailure::new(StatusCode::NOT_FOUND, "No profile with this name"))?;
    Ok(envelope(store.profile_view(account, true)))
}

async fn list_profile_posts(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = db.read().await;
    authorize(&store, &headers)?;
    if !store.accounts.contains_key(&name) {
        return Err(ApiFailure::new(StatusCode::NOT_FOUND, "No profile with this name"));
    }
    let (items, meta) = store.page(&params, Some(&name));
    Ok(Json(json!({ "data": items, "meta": meta })))
}
