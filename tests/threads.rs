//! Thread Tests
//!
//! Covers thread CRUD, ownership rules, cover uploads and list caching.

mod common;

use axum::http::{Method, StatusCode};
use common::{app, MultipartForm, TEST_UPLOAD_MAX_BYTES};
use serde_json::json;
use uuid::Uuid;

// ===========================================================================
// Creation
// ===========================================================================

#[tokio::test]
async fn create_thread_valid() {
    let app = app().await;
    let user = app.create_user("thread_create").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Hello board")
                .text("body", "First post")
                .text("tags", "intro,meta")
                .text("userId", &user.id.to_string()),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let thread = &resp.json()["thread"];
    assert_eq!(thread["title"], "Hello board");
    assert_eq!(thread["body"], "First post");
    assert_eq!(thread["tags"], "intro,meta");
    assert_eq!(thread["authorId"], user.id.to_string().as_str());
    assert_eq!(thread["author"]["username"], user.username.as_str());
    assert_eq!(thread["commentCount"], 0);
    assert!(thread["coverUrl"].is_null());
}

#[tokio::test]
async fn create_thread_rejects_non_multipart_body() {
    let app = app().await;
    let user = app.create_user("thread_json").await;

    let resp = app
        .post_json(
            "/api/threads",
            json!({ "title": "Wrong encoding", "body": "Sent as JSON" }),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["ok"], false);
    assert!(!resp.message().is_empty());
}

#[tokio::test]
async fn create_thread_requires_title_and_body() {
    let app = app().await;
    let user = app.create_user("thread_missing").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new().text("title", "No body here"),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.message(), "title and body are required");
}

#[tokio::test]
async fn create_thread_title_too_long() {
    let app = app().await;
    let user = app.create_user("thread_longtitle").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", &"t".repeat(121))
                .text("body", "body"),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.message(), "title must be at most 120 characters");
}

#[tokio::test]
async fn create_thread_for_another_user_is_forbidden() {
    let app = app().await;
    let user = app.create_user("thread_spoof").await;
    let other = app.create_user("thread_spoofed").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Spoofed")
                .text("body", "body")
                .text("userId", &other.id.to_string()),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_thread_unknown_category() {
    let app = app().await;
    let user = app.create_user("thread_badcat").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Lost")
                .text("body", "body")
                .text("categoryId", &Uuid::new_v4().to_string()),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.message(), "category does not exist");
}

#[tokio::test]
async fn create_thread_requires_auth() {
    let app = app().await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new().text("title", "anon").text("body", "anon"),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Covers
// ===========================================================================

#[tokio::test]
async fn cover_upload_is_stored_and_served() {
    let app = app().await;
    let user = app.create_user("thread_cover").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "With cover")
                .text("body", "body")
                .png("cover"),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let cover_url = resp.json()["thread"]["coverUrl"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(cover_url.starts_with("/static/thread_images/thread-"));
    assert!(cover_url.ends_with(".png"));
    assert!(app.static_path(&cover_url).exists());

    let served = app.get(&cover_url, None).await;
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(served.header("content-type").as_deref(), Some("image/png"));
    assert_eq!(
        served.header("cache-control").as_deref(),
        Some("public, max-age=604800")
    );
    assert_eq!(
        served.header("access-control-allow-origin").as_deref(),
        Some("*")
    );
}

#[tokio::test]
async fn replacing_cover_removes_previous_file() {
    let app = app().await;
    let user = app.create_user("thread_recover").await;

    let created = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Cover v1")
                .text("body", "body")
                .png("cover"),
            Some(&user.token),
        )
        .await;
    let thread = &created.json()["thread"];
    let thread_id = thread["id"].as_str().unwrap().to_string();
    let first_cover = thread["coverUrl"].as_str().unwrap().to_string();

    let updated = app
        .multipart(
            Method::PATCH,
            &format!("/api/threads/{}", thread_id),
            MultipartForm::new().png("cover"),
            Some(&user.token),
        )
        .await;

    assert_eq!(updated.status, StatusCode::OK);
    let second_cover = updated.json()["thread"]["coverUrl"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first_cover, second_cover);
    assert!(!app.static_path(&first_cover).exists());
    assert!(app.static_path(&second_cover).exists());
}

#[tokio::test]
async fn non_image_cover_is_rejected() {
    let app = app().await;
    let user = app.create_user("thread_txtcover").await;

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Bad cover")
                .text("body", "body")
                .file("cover", "notes.txt", "text/plain", b"just text"),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.message(), "only image files can be uploaded");
}

#[tokio::test]
async fn oversized_cover_is_rejected() {
    let app = app().await;
    let user = app.create_user("thread_bigcover").await;
    let payload = vec![0u8; TEST_UPLOAD_MAX_BYTES + 1];

    let resp = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Huge cover")
                .text("body", "body")
                .file("cover", "huge.png", "image/png", &payload),
            Some(&user.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.json()["ok"], false);
}

// ===========================================================================
// Reading
// ===========================================================================

#[tokio::test]
async fn get_thread_not_found() {
    let app = app().await;

    let resp = app
        .get(&format!("/api/threads/{}", Uuid::new_v4()), None)
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.message(), "thread not found");
}

#[tokio::test]
async fn get_thread_invalid_id() {
    let app = app().await;

    let resp = app.get("/api/threads/not-a-uuid", None).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["ok"], false);
}

#[tokio::test]
async fn list_threads_filters_by_category_and_paginates() {
    let app = app().await;
    let admin = app.create_admin("thread_lister").await;
    let category = app
        .post_json(
            "/api/categories",
            json!({ "name": common::unique("Listing") }),
            Some(&admin.token),
        )
        .await
        .json()["category"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    for title in ["first", "second", "third"] {
        let resp = app
            .multipart(
                Method::POST,
                "/api/threads",
                MultipartForm::new()
                    .text("title", title)
                    .text("body", "body")
                    .text("categoryId", &category),
                Some(&admin.token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    let page1 = app
        .get(
            &format!("/api/threads?category={}&page=1&limit=2", category),
            None,
        )
        .await;
    assert_eq!(page1.status, StatusCode::OK);
    let body = page1.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["title"], "third");
    assert_eq!(items[1]["title"], "second");
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["pages"], 2);

    let page2 = app
        .get(
            &format!("/api/threads?category={}&page=2&limit=2", category),
            None,
        )
        .await;
    let items = page2.json()["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "first");
}

#[tokio::test]
async fn list_threads_rejects_bad_limit() {
    let app = app().await;

    let resp = app.get("/api/threads?limit=1000", None).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.message(), "limit must be between 1 and 100");
}

#[tokio::test]
async fn list_threads_rejects_out_of_range_page() {
    let app = app().await;

    let resp = app
        .get(&format!("/api/threads?page={}&limit=20", i64::MAX), None)
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["ok"], false);
    assert_eq!(resp.message(), "page is out of range");
}

#[tokio::test]
async fn list_comments_rejects_out_of_range_page() {
    let app = app().await;
    let user = app.create_user("thread_far_page").await;
    let thread = app.create_thread(&user, "Deep pages").await;

    let resp = app
        .get(
            &format!(
                "/api/threads/{}/comments?page={}",
                thread["id"].as_str().unwrap(),
                i64::MAX
            ),
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.message(), "page is out of range");
}

#[tokio::test]
async fn list_cache_is_invalidated_by_new_thread() {
    let app = app().await;
    let admin = app.create_admin("thread_cache").await;
    let category = app
        .post_json(
            "/api/categories",
            json!({ "name": common::unique("Cached") }),
            Some(&admin.token),
        )
        .await
        .json()["category"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let path = format!("/api/threads?category={}&page=1&limit=10", category);

    let before = app.get(&path, None).await;
    assert_eq!(before.json()["items"].as_array().unwrap().len(), 0);

    let created = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Fresh")
                .text("body", "body")
                .text("categoryId", &category),
            Some(&admin.token),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);

    let after = app.get(&path, None).await;
    let items = after.json()["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Fresh");
}

#[tokio::test]
async fn single_thread_cache_sees_edits() {
    let app = app().await;
    let user = app.create_user("thread_editcache").await;
    let thread = app.create_thread(&user, "Before").await;
    let path = format!("/api/threads/{}", thread["id"].as_str().unwrap());

    assert_eq!(app.get(&path, None).await.json()["thread"]["title"], "Before");

    let resp = app
        .multipart(
            Method::PATCH,
            &path,
            MultipartForm::new().text("title", "After"),
            Some(&user.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    assert_eq!(app.get(&path, None).await.json()["thread"]["title"], "After");
}

// ===========================================================================
// Editing and deleting
// ===========================================================================

#[tokio::test]
async fn update_thread_by_non_owner_is_forbidden() {
    let app = app().await;
    let owner = app.create_user("thread_owner").await;
    let stranger = app.create_user("thread_stranger").await;
    let thread = app.create_thread(&owner, "Mine").await;

    let resp = app
        .multipart(
            Method::PATCH,
            &format!("/api/threads/{}", thread["id"].as_str().unwrap()),
            MultipartForm::new().text("title", "Stolen"),
            Some(&stranger.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_can_edit_any_thread() {
    let app = app().await;
    let owner = app.create_user("thread_adminedit").await;
    let admin = app.create_admin("thread_editor").await;
    let thread = app.create_thread(&owner, "Original").await;

    let resp = app
        .multipart(
            Method::PATCH,
            &format!("/api/threads/{}", thread["id"].as_str().unwrap()),
            MultipartForm::new().text("body", "moderated"),
            Some(&admin.token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let updated = &resp.json()["thread"];
    assert_eq!(updated["title"], "Original");
    assert_eq!(updated["body"], "moderated");
    assert_eq!(updated["authorId"], owner.id.to_string().as_str());
}

#[tokio::test]
async fn delete_thread_by_non_owner_keeps_thread() {
    let app = app().await;
    let owner = app.create_user("thread_keep").await;
    let stranger = app.create_user("thread_deleter").await;
    let thread = app.create_thread(&owner, "Keep me").await;
    let thread_id: Uuid = thread["id"].as_str().unwrap().parse().unwrap();

    let resp = app
        .delete(&format!("/api/threads/{}", thread_id), Some(&stranger.token))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads WHERE id = $1")
        .bind(thread_id)
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn delete_thread_removes_comments_and_files() {
    let app = app().await;
    let owner = app.create_user("thread_cascade").await;
    let commenter = app.create_user("thread_commenter").await;

    let created = app
        .multipart(
            Method::POST,
            "/api/threads",
            MultipartForm::new()
                .text("title", "Doomed")
                .text("body", "body")
                .png("cover"),
            Some(&owner.token),
        )
        .await;
    let thread = created.json()["thread"].clone();
    let thread_id: Uuid = thread["id"].as_str().unwrap().parse().unwrap();
    let cover_url = thread["coverUrl"].as_str().unwrap().to_string();

    app.create_comment(&commenter, &thread_id.to_string(), "one")
        .await;
    let with_image = app
        .multipart(
            Method::POST,
            &format!("/api/threads/{}/comments", thread_id),
            MultipartForm::new().png("image"),
            Some(&commenter.token),
        )
        .await;
    let image_url = with_image.json()["comment"]["imageUrl"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .delete(&format!("/api/threads/{}", thread_id), Some(&owner.token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.message(), "thread deleted");

    let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE thread_id = $1")
        .bind(thread_id)
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(comments, 0);
    assert!(!app.static_path(&cover_url).exists());
    assert!(!app.static_path(&image_url).exists());

    let gone = app
        .get(&format!("/api/threads/{}", thread_id), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}
