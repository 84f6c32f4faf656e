use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, PostView, API_KEY};
use serde_json::Value;
use tower::{Service, ServiceExt};

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header("x-noroff-api-key", API_KEY)
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body.to_string())
        .unwrap()
}

async fn call(app: &mut Router, request: Request<String>) -> axum::response::Response {
    ServiceExt::<Request<String>>::ready(app)
        .await
        .unwrap()
        .call(request)
        .await
        .unwrap()
}

/// Register `name` and log in, returning the access token.
async fn sign_in(app: &mut Router, name: &str) -> String {
    let email = format!("{name}@stud.noroff.no");
    let resp = call(
        app,
        json_request(
            "POST",
            "/auth/register",
            &format!(r#"{{"name":"{name}","email":"{email}","password":"password1"}}"#),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = call(
        app,
        json_request(
            "POST",
            "/auth/login",
            &format!(r#"{{"email":"{email}","password":"password1"}}"#),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body["data"]["name"], name);
    body["data"]["accessToken"].as_str().unwrap().to_string()
}

// --- auth ---

#[tokio::test]
async fn login_with_wrong_password_returns_401_with_message() {
    let mut app = app();
    sign_in(&mut app, "ada").await;
    let resp = call(
        &mut app,
        json_request(
            "POST",
            "/auth/login",
            r#"{"email":"ada@stud.noroff.no","password":"wrong-password"}"#,
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = body_json(resp).await;
    assert_eq!(body["errors"][0]["message"], "Invalid email or password");
    assert_eq!(body["statusCode"], 401);
}

#[tokio::test]
async fn register_twice_returns_400() {
    let mut app = app();
    sign_in(&mut app, "ada").await;
    let resp = call(
        &mut app,
        json_request(
            "POST",
            "/auth/register",
            r#"{"name":"ada","email":"other@stud.noroff.no","password":"password1"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_register_returns_422() {
    let app = app();
    let resp = app
        .oneshot(json_request("POST", "/auth/register", r#"{"not_name":1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- access control ---

#[tokio::test]
async fn list_posts_without_api_key_returns_401() {
    let app = app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/social/posts")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_token_returns_401() {
    let app = app();
    let resp = app
        .oneshot(authed("GET", "/social/posts", "bogus", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_owner_can_delete() {
    let mut app = app();
    let ada = sign_in(&mut app, "ada").await;
    let bob = sign_in(&mut app, "bob").await;

    let resp = call(&mut app, authed("POST", "/social/posts", &ada, r#"{"title":"Mine"}"#)).await;
    let created: Value = body_json(resp).await;
    let id = created["data"]["id"].as_u64().unwrap();

    let resp = call(&mut app, authed("DELETE", &format!("/social/posts/{id}"), &bob, "")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// --- posts ---

#[tokio::test]
async fn get_post_not_found() {
    let mut app = app();
    let token = sign_in(&mut app, "ada").await;
    let resp = call(&mut app, authed("GET", "/social/posts/999", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = body_json(resp).await;
    assert_eq!(body["errors"][0]["message"], "No post with such ID");
}

#[tokio::test]
async fn get_post_bad_id_returns_400() {
    let mut app = app();
    let token = sign_in(&mut app, "ada").await;
    let resp = call(&mut app, authed("GET", "/social/posts/not-a-number", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_posts_embeds_author_and_comments_on_request() {
    let mut app = app();
    let token = sign_in(&mut app, "ada").await;
    call(&mut app, authed("POST", "/social/posts", &token, r#"{"title":"One","tags":["rust"]}"#)).await;
    call(&mut app, authed("POST", "/social/posts", &token, r#"{"title":"Two","tags":["web"]}"#)).await;

    let resp = call(
        &mut app,
        authed("GET", "/social/posts?limit=12&page=1&_author=true&_comments=true&tag=rust", &token, ""),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    let posts: Vec<PostView> = serde_json::from_value(body["data"].clone()).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "One");
    assert_eq!(posts[0].author.as_ref().unwrap().name, "ada");
    assert!(posts[0].comments.as_ref().unwrap().is_empty());
    assert_eq!(body["meta"]["totalCount"], 1);
}

// --- full lifecycle ---

#[tokio::test]
async fn post_and_comment_lifecycle() {
    let mut app = app();
    let token = sign_in(&mut app, "ada").await;

    // create
    let resp = call(
        &mut app,
        authed("POST", "/social/posts", &token, r#"{"title":"Walk dog","body":"At noon"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = body_json(resp).await;
    let id = created["data"]["id"].as_u64().unwrap();
    assert_eq!(created["data"]["title"], "Walk dog");

    // update, partial: only title
    let resp = call(
        &mut app,
        authed("PUT", &format!("/social/posts/{id}"), &token, r#"{"title":"Walk cat"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = body_json(resp).await;
    assert_eq!(updated["data"]["title"], "Walk cat");
    assert_eq!(updated["data"]["body"], "At noon"); // unchanged

    // comment
    let resp = call(
        &mut app,
        authed(
            "POST",
            &format!("/social/posts/{id}/comment?_author=true"),
            &token,
            r#"{"body":"Nice"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let comment: Value = body_json(resp).await;
    let comment_id = comment["data"]["id"].as_u64().unwrap();
    assert_eq!(comment["data"]["postId"], id);
    assert_eq!(comment["data"]["author"]["name"], "ada");

    // profile counts the post
    let resp = call(&mut app, authed("GET", "/social/profiles/ada", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let profile: Value = body_json(resp).await;
    assert_eq!(profile["data"]["_count"]["posts"], 1);

    // delete comment
    let resp = call(
        &mut app,
        authed("DELETE", &format!("/social/posts/{id}/comment/{comment_id}"), &token, ""),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // delete post
    let resp = call(&mut app, authed("DELETE", &format!("/social/posts/{id}"), &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // get after delete: 404
    let resp = call(&mut app, authed("GET", &format!("/social/posts/{id}"), &token, "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // profile posts after delete: empty
    let resp = call(&mut app, authed("GET", "/social/profiles/ada/posts", &token, "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}
