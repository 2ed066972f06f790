//! REST API integration tests

use anyhow::Result;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use sea_orm_migration::MigratorTrait;
use serde_json::{json, Value};

use xkcd::database::migrations::Migrator;
use xkcd::{AppContext, Settings};
use xkcd_server::server::app::create_app;
use xkcd_test_utils::{fixtures, TempDir, TestDb};

struct TestApp {
    server: TestServer,
    _dir: TempDir,
}

async fn setup_test_server() -> Result<TestApp> {
    let dir = TempDir::new()?;
    let db = TestDb::new_in_memory().connect().await?;
    Migrator::up(&db, None).await?;

    let mut settings = Settings::default();
    settings.storage.root = dir.path().join("images");
    settings.storage.tmp_dir = dir.path().join("tmp");
    settings.storage.upload_max_size = 256 * 1024;

    let ctx = AppContext::new(db.clone(), db, settings, reqwest::Client::new());
    let app = create_app(ctx, Some("http://localhost:5173")).await?;
    let server = TestServer::new(app)?;

    Ok(TestApp { server, _dir: dir })
}

fn comic_payload(number: Option<i32>, title: &str, image_ids: Vec<i64>) -> Value {
    json!({
        "number": number,
        "publication_date": "2009-03-02",
        "is_interactive": false,
        "tags": ["physics", "math"],
        "original": {
            "title": title,
            "tooltip": format!("{} tooltip", title),
            "raw_transcript": "[[A stick figure]]",
            "image_ids": image_ids,
        }
    })
}

async fn upload_png(server: &TestServer) -> i64 {
    let form = MultipartForm::new().add_part(
        "image",
        Part::bytes(fixtures::png_bytes(20, 10).unwrap())
            .file_name("comic.png")
            .mime_type("image/png"),
    );
    let response = server.post("/api/v1/images/upload").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let image: Value = response.json();
    image["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let app = setup_test_server().await?;

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["service"], "xkcd-server");
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() -> Result<()> {
    let app = setup_test_server().await?;

    let response = app.server.get("/api/v1/strips").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let error: Value = response.json();
    assert_eq!(error["code"], "NOT_FOUND");
    assert_eq!(error["details"]["id"], "/api/v1/strips");
    Ok(())
}

#[tokio::test]
async fn test_comic_crud_api() -> Result<()> {
    let app = setup_test_server().await?;
    let server = &app.server;

    let response = server
        .post("/api/v1/comics")
        .json(&comic_payload(Some(556), "Alternative Energy Revolution", vec![]))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let comic: Value = response.json();
    let comic_id = comic["id"].as_i64().unwrap();
    assert_eq!(comic["number"], 556);
    assert_eq!(comic["slug"], "alternative-energy-revolution");
    assert_eq!(comic["tags"], json!(["math", "physics"]));
    assert_eq!(comic["original"]["language"], "EN");
    assert_eq!(comic["original"]["is_draft"], false);

    let response = server.get("/api/v1/comics/by-number/556").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["id"], comic_id);

    let response = server.get("/api/v1/comics/latest-number").await;
    assert_eq!(response.json::<Value>(), json!({ "number": 556 }));

    let mut update = comic_payload(Some(557), "Renamed", vec![]);
    update["tags"] = json!(["energy"]);
    let response = server
        .put(&format!("/api/v1/comics/{}", comic_id))
        .json(&update)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let updated: Value = response.json();
    assert_eq!(updated["number"], 557);
    assert_eq!(updated["tags"], json!(["energy"]));
    assert_eq!(updated["original"]["title"], "Renamed");

    let response = server.delete(&format!("/api/v1/comics/{}", comic_id)).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = server.get(&format!("/api/v1/comics/{}", comic_id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let error: Value = response.json();
    assert_eq!(error["code"], "COMIC_NOT_FOUND");
    assert_eq!(error["details"], json!({ "comic_id": comic_id }));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_number_is_conflict() -> Result<()> {
    let app = setup_test_server().await?;

    app.server
        .post("/api/v1/comics")
        .json(&comic_payload(Some(1), "Barrel", vec![]))
        .await;
    let response = app
        .server
        .post("/api/v1/comics")
        .json(&comic_payload(Some(1), "Another Barrel", vec![]))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let error: Value = response.json();
    assert_eq!(error["code"], "COMIC_NUMBER_ALREADY_EXISTS");
    assert_eq!(error["details"]["number"], 1);
    Ok(())
}

#[tokio::test]
async fn test_extra_comic_by_slug_and_list_filters() -> Result<()> {
    let app = setup_test_server().await?;
    let server = &app.server;

    server
        .post("/api/v1/comics")
        .json(&comic_payload(None, "Mu + Pi", vec![]))
        .await;
    let mut other = comic_payload(Some(10), "Tag Free", vec![]);
    other["tags"] = json!([]);
    server.post("/api/v1/comics").json(&other).await;

    let response = server.get("/api/v1/comics/by-slug/mu-plus-pi").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["number"], Value::Null);

    let response = server
        .get("/api/v1/comics")
        .add_query_param("tags", "physics,math")
        .add_query_param("tag_combination", "and")
        .await;
    let page: Value = response.json();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["slug"], "mu-plus-pi");

    let response = server
        .get("/api/v1/comics")
        .add_query_param("order_by", "id")
        .add_query_param("order", "desc")
        .add_query_param("limit", "1")
        .await;
    let page: Value = response.json();
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["number"], 10);
    Ok(())
}

#[tokio::test]
async fn test_upload_and_attach_images() -> Result<()> {
    let app = setup_test_server().await?;
    let server = &app.server;

    let image_id = upload_png(server).await;

    let response = server
        .post("/api/v1/comics")
        .json(&comic_payload(Some(5), "With Image", vec![image_id]))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let comic: Value = response.json();
    let comic_id = comic["id"].as_i64().unwrap();
    let original_id = comic["original"]["id"].as_i64().unwrap();
    assert_eq!(comic["original"]["images"][0]["id"], image_id);
    assert_eq!(comic["original"]["images"][0]["converted"], Value::Null);

    // the image already belongs to the original translation
    let response = server
        .post(&format!("/api/v1/comics/{}/translations", comic_id))
        .json(&json!({
            "language": "ru",
            "title": "С картинкой",
            "image_ids": [image_id],
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let error: Value = response.json();
    assert_eq!(error["code"], "IMAGES_ALREADY_ATTACHED");
    assert_eq!(
        error["details"]["conflicts"],
        json!([{ "translation_id": original_id, "image_id": image_id }])
    );

    let response = server
        .post(&format!("/api/v1/comics/{}/translations", comic_id))
        .json(&json!({ "language": "ru", "title": "Ничего", "image_ids": [424242] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["details"]["image_ids"], json!([424242]));
    Ok(())
}

#[tokio::test]
async fn test_upload_rejections() -> Result<()> {
    let app = setup_test_server().await?;
    let server = &app.server;

    let form = MultipartForm::new().add_part(
        "image",
        Part::bytes(fixtures::PDF_BYTES.to_vec()).file_name("doc.pdf"),
    );
    let response = server.post("/api/v1/images/upload").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["code"], "UNSUPPORTED_FORMAT");
    assert_eq!(error["details"]["supported_formats"], json!(["png", "jpeg", "webp", "gif"]));

    let form = MultipartForm::new().add_text("title", "no file here");
    let response = server.post("/api/v1/images/upload").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "EMPTY_FILE");

    let response = server
        .post("/api/v1/images/download")
        .json(&json!({ "url": "ftp://example.com/a.png" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_URL");
    Ok(())
}

#[tokio::test]
async fn test_translation_lifecycle_api() -> Result<()> {
    let app = setup_test_server().await?;
    let server = &app.server;

    let comic: Value = server
        .post("/api/v1/comics")
        .json(&comic_payload(Some(20), "Lifecycle", vec![]))
        .await
        .json();
    let comic_id = comic["id"].as_i64().unwrap();

    let response = server
        .post(&format!("/api/v1/comics/{}/translations", comic_id))
        .json(&json!({
            "language": "de",
            "title": "Lebenszyklus",
            "raw_transcript": "Ein Strichmännchen",
            "is_draft": true,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let draft: Value = response.json();
    let draft_id = draft["id"].as_i64().unwrap();
    assert_eq!(draft["language"], "DE");

    let response = server
        .get(&format!("/api/v1/comics/{}/translations/DE", comic_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .get(&format!("/api/v1/comics/{}/translations", comic_id))
        .add_query_param("include_drafts", "true")
        .await;
    assert_eq!(response.json::<Vec<Value>>().len(), 2);

    // drafts are published through the publish endpoint only
    let response = server
        .put(&format!("/api/v1/translations/{}", draft_id))
        .json(&json!({ "language": "de", "title": "Lebenszyklus", "is_draft": false }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "DRAFT_STATUS_CHANGE_FORBIDDEN");

    let response = server
        .post(&format!("/api/v1/translations/{}/publish", draft_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["is_draft"], false);

    let response = server
        .get(&format!("/api/v1/comics/{}/translations/de", comic_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["id"], draft_id);

    let response = server
        .get(&format!("/api/v1/translations/{}/raw-transcript", draft_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "Ein Strichmännchen");

    let original_id = comic["original"]["id"].as_i64().unwrap();
    let response = server
        .delete(&format!("/api/v1/translations/{}", original_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "ORIGINAL_TRANSLATION_FORBIDDEN");

    let response = server
        .delete(&format!("/api/v1/translations/{}", draft_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    Ok(())
}
