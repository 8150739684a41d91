/// HTTP-level tests against the full router on the in-memory repository
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use brando_imoveis::config::Config;
use brando_imoveis::handlers::AppState;
use brando_imoveis::memory_store::MemoryRepository;
use brando_imoveis::models::ListingDraft;
use brando_imoveis::routes;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const PASSWORD: &str = "segredo-de-teste";
const BOUNDARY: &str = "brando-test-boundary";

fn test_app() -> (Router, Arc<AppState>) {
    let repo = Arc::new(MemoryRepository::new());
    let state = Arc::new(AppState::new(repo, Config::for_tests(PASSWORD)));
    (routes::router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn form(method: &str, uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart(uri: &str, parts: &[Part<'_>], cookie: &str) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, content_type, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}

/// Logs in and returns the cookie pair to send back.
async fn login(app: &Router) -> String {
    let response = send(app, form("POST", "/admin/login", &format!("password={}", PASSWORD), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app();
    let response = send(&app, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_admin_routes_require_session() {
    let (app, _) = test_app();

    for uri in ["/admin/leads", "/admin/listings", "/admin/services", "/admin/export"] {
        let response = send(&app, get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let response = send(&app, get("/admin/leads", Some("admin_session=forged"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, form("POST", "/admin/login", "password=errada", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_then_logout() {
    let (app, _) = test_app();
    let cookie = login(&app).await;

    let response = send(&app, get("/admin/leads", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, form("POST", "/admin/logout", "", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/admin/leads", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lead_redirects_to_whatsapp_with_listing_code() {
    let (app, state) = test_app();
    let mut draft = ListingDraft::seeded("BR-777");
    draft.kind = "Casa".into();
    let listing = state.repo.save_listing(None, &draft, Vec::new()).await.unwrap();

    let body = format!(
        "name=Ana&phone=48991054216&message=Quero+visitar&listing_id={}",
        listing.id
    );
    let response = send(&app, form("POST", "/lead", &body, None)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(location.starts_with("https://wa.me/5548991054216?text="));
    assert!(location.contains("BR-777"));

    let leads = state.repo.list_leads().await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].listing_id, Some(listing.id));
    assert_eq!(leads[0].phone, "+5548991054216");
}

#[tokio::test]
async fn test_lead_requires_name() {
    let (app, _) = test_app();
    let response = send(&app, form("POST", "/lead", "name=+&phone=48991054216", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contact_redirects_without_listing() {
    let (app, state) = test_app();
    let response = send(&app, form("POST", "/contact", "name=Bia&phone=48991054216", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(state.repo.list_leads().await.unwrap()[0].listing_id, None);
}

#[tokio::test]
async fn test_missing_photo_is_404() {
    let (app, _) = test_app();
    let response = send(&app, get("/photos/999", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import_without_price_column_is_rejected() {
    let (app, state) = test_app();
    let cookie = login(&app).await;

    let file = b"code;type;neighborhood;description;status\nBR-1;Casa;Ratones;;ativo\n";
    let response = send(
        &app,
        multipart("/admin/import", &[Part::File("file", "catalogo.csv", "text/csv", file)], &cookie),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("price"));
    assert!(state.repo.get_listing_by_code("BR-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_import_then_browse_and_export() {
    let (app, _) = test_app();
    let cookie = login(&app).await;

    let file = "code;type;price;neighborhood;description;status\n\
                BR-1;Casa;R$ 500.000,00;Ratones;Quintal grande;ativo\n\
                BR-2;Apartamento;650000;Canasvieiras;;inativo\n";
    let response = send(
        &app,
        multipart(
            "/admin/import",
            &[Part::File("file", "catalogo.csv", "text/csv", file.as_bytes())],
            &cookie,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;
    assert_eq!(report["imported"], 2);
    assert_eq!(report["created"], 2);

    // only active listings are public
    let listings = json_body(send(&app, get("/listings?q=ratones", None)).await).await;
    let listings = listings.as_array().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["code"], "BR-1");
    assert_eq!(listings[0]["price"], 500_000.0);

    let response = send(&app, get("/admin/export?format=csv", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("imoveis.csv"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("BR-2;Apartamento;650000;Canasvieiras;;inactive"));

    let response = send(&app, get("/admin/export?format=pdf", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_upload_and_cover_reassignment() {
    let (app, _) = test_app();
    let cookie = login(&app).await;

    let response = send(
        &app,
        multipart(
            "/admin/listings",
            &[
                Part::Text("code", "BR-50"),
                Part::Text("type", "Casa"),
                Part::Text("price", "1.200.000,00"),
                Part::Text("neighborhood", "Ratones"),
                Part::Text("status", "Ativo"),
                Part::File("photos", "a.jpg", "image/jpeg", b"first-photo"),
                Part::File("photos", "b.png", "image/png", b"second-photo"),
            ],
            &cookie,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail = json_body(response).await;
    assert_eq!(detail["price"], 1_200_000.0);
    let id = detail["id"].as_i64().unwrap();
    let photos = detail["photos"].as_array().unwrap();
    assert_eq!(photos.len(), 2);
    let first = photos[0]["id"].as_i64().unwrap();
    let second = photos[1]["id"].as_i64().unwrap();
    assert_eq!(detail["cover_url"], format!("/photos/{}", first));

    // served with MIME type and a revalidating ETag
    let response = send(&app, get(&format!("/photos/{}", second), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
    let request = Request::builder()
        .uri(format!("/photos/{}", second))
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::NOT_MODIFIED);

    // deleting the cover hands it to the remaining photo
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/photos/{}", first))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::NO_CONTENT);

    let detail = json_body(send(&app, get(&format!("/admin/listings/{}", id), Some(&cookie))).await).await;
    let photos = detail["photos"].as_array().unwrap();
    let covers: Vec<i64> = photos
        .iter()
        .filter(|p| p["is_cover"] == true)
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(covers, vec![second]);
    assert_eq!(detail["cover_url"], format!("/photos/{}", second));
}

#[tokio::test]
async fn test_listing_form_rejects_blank_and_duplicate_codes() {
    let (app, _) = test_app();
    let cookie = login(&app).await;

    let response = send(
        &app,
        multipart("/admin/listings", &[Part::Text("code", "  ")], &cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let create = |code: &'static str| multipart("/admin/listings", &[Part::Text("code", code)], &cookie);
    assert_eq!(send(&app, create("BR-9")).await.status(), StatusCode::CREATED);
    assert_eq!(send(&app, create("BR-9")).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overlong_text_is_rejected_and_export_keeps_working() {
    let (app, state) = test_app();
    let cookie = login(&app).await;
    let long = "a".repeat(40_000);

    let response = send(
        &app,
        multipart(
            "/admin/listings",
            &[
                Part::Text("code", "BR-60"),
                Part::Text("description", &long),
                Part::File("photos", "a.jpg", "image/jpeg", b"photo"),
            ],
            &cookie,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("description"));
    assert!(state.repo.get_listing_by_code("BR-60").await.unwrap().is_none());

    // the first row is valid, the second is not: nothing is written
    let file = format!(
        "code;type;price;neighborhood;description;status\n\
         BR-61;Casa;500000;Ratones;Quintal;ativo\n\
         BR-62;Casa;600000;Ratones;{};ativo\n",
        long
    );
    let response = send(
        &app,
        multipart(
            "/admin/import",
            &[Part::File("file", "catalogo.csv", "text/csv", file.as_bytes())],
            &cookie,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.repo.get_listing_by_code("BR-61").await.unwrap().is_none());

    let create = multipart(
        "/admin/listings",
        &[Part::Text("code", "BR-63"), Part::Text("description", "Linha um\nLinha dois")],
        &cookie,
    );
    assert_eq!(send(&app, create).await.status(), StatusCode::CREATED);
    let response = send(&app, get("/admin/export?format=xlsx", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_service_ticket_workflow() {
    let (app, _) = test_app();
    let cookie = login(&app).await;

    let response = send(
        &app,
        form(
            "POST",
            "/services",
            "client_name=Carlos&phone=48991054216&service_type=pintura&listing_id=abc",
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    assert_eq!(created["success"], true);
    let id = created["id"].as_i64().unwrap();

    let uri = format!("/admin/services/{}", id);
    let response = send(&app, form("POST", &uri, "cost=-5", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        form(
            "POST",
            &uri,
            "status=andamento&scheduled_for=2024-06-01&responsible=Joao&cost=150",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ticket = json_body(response).await;
    assert_eq!(ticket["status"], "in_progress");
    assert_eq!(ticket["scheduled_for"], "2024-06-01");

    // unknown status and blank date keep what was there
    let response = send(&app, form("POST", &uri, "status=cancelado&scheduled_for=", Some(&cookie))).await;
    let ticket = json_body(response).await;
    assert_eq!(ticket["status"], "in_progress");
    assert_eq!(ticket["scheduled_for"], "2024-06-01");

    let tickets = json_body(send(&app, get("/admin/services", Some(&cookie))).await).await;
    assert_eq!(tickets.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_assistant_endpoint() {
    let (app, _) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/assistant")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"q":"onde fica a loja"}"#))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["answer"],
        brando_imoveis::assistant::ADDRESS
    );
}
