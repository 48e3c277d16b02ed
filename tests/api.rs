use std::{net::SocketAddr, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use trip_planner::{
    config::AppConfig,
    db::{init_pool, migrate},
    routes::create_router,
    state::AppState,
};

struct TestApp {
    router: Router,
    _root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let database_url = format!("sqlite://{}", root.path().join("api.sqlite").display());
        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            session_ttl: chrono::Duration::hours(3),
            cors_origins: vec!["http://localhost:5173".into()],
            update_timeout: Duration::from_secs(5),
        };
        let db = init_pool(&config.database_url).await.expect("pool");
        migrate(&db).await.expect("migrations");
        Self {
            router: create_router(AppState::new(config, db)),
            _root: root,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn form(&self, uri: &str, token: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    async fn register_and_login(&self, username: &str) -> String {
        let (status, _) = self
            .form(
                "/register",
                None,
                &format!(
                    "username={username}&password=secret-pass&display_name=Tester&gender=true\
                     &dob=1990-04-01&vehicle=Van&phone=0210000&email={username}%40example.com\
                     &address=1+Main+St&district=Central&city=Auckland"
                ),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .form(
                "/login",
                None,
                &format!("username={username}&password=secret-pass"),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        body["token"].as_str().expect("token").to_string()
    }
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new().await;

    let (status, _) = app.json(Method::GET, "/trips", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(Method::GET, "/validate-token", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_wrong_password_is_bad_request() {
    let app = TestApp::new().await;
    app.register_and_login("mere").await;

    let (status, body) = app
        .form("/login", None, "username=mere&password=nope-nope")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid username or password");
}

#[tokio::test]
async fn trip_update_reconciles_stops_over_http() {
    let app = TestApp::new().await;
    let token = app.register_and_login("wiremu").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/add-trip",
            Some(&token),
            Some(json!({
                "trip_name": "Northland",
                "start": "Auckland",
                "start_coordinates": [-36.85, 174.76],
                "start_date": "2024-12-01",
                "end_date": "2024-12-04",
                "time": "08:30:00",
                "trip_status": "Upcoming",
                "stops": [
                    { "position": 1, "name": "Whangarei", "coordinates": [-35.72, 174.32] },
                    { "position": 2, "name": "Paihia", "coordinates": [-35.28, 174.09] }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let trip_id = body["trip_id"].as_i64().expect("trip id");

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/update-trip/{trip_id}"),
            Some(&token),
            Some(json!({
                "updated_trip": { "trip_status": "Delayed" },
                "stops_of_trip": [
                    { "id": 1, "stop_name": "Whangarei", "stop_coordinates": [-35.72, 174.32] },
                    { "id": 3, "stop_name": "Cape Reinga", "stop_coordinates": [-34.43, 172.68] }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["trip_id"], trip_id);
    assert_eq!(body["trip_status"], "Delayed");

    let (status, body) = app
        .json(Method::GET, &format!("/trips/{trip_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip_name"], "Northland");
    assert_eq!(body["start"], "Auckland");
    assert_eq!(body["trip_status"], "Delayed");
    let stops: Vec<(i64, String)> = body["stops"]
        .as_array()
        .expect("stops")
        .iter()
        .map(|stop| {
            (
                stop["position"].as_i64().unwrap(),
                stop["stop_name"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        stops,
        vec![(1, "Whangarei".to_string()), (3, "Cape Reinga".to_string())]
    );
}

#[tokio::test]
async fn unknown_status_is_unprocessable_and_trip_is_untouched() {
    let app = TestApp::new().await;
    let token = app.register_and_login("hine").await;

    let (_, body) = app
        .json(
            Method::POST,
            "/add-trip",
            Some(&token),
            Some(json!({ "trip_name": "Day out" })),
        )
        .await;
    let trip_id = body["trip_id"].as_i64().expect("trip id");

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/update-trip/{trip_id}"),
            Some(&token),
            Some(json!({
                "updated_trip": { "trip_name": "Renamed", "trip_status": "Unknown" },
                "stops_of_trip": []
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = app
        .json(Method::GET, &format!("/trips/{trip_id}"), Some(&token), None)
        .await;
    assert_eq!(body["trip_name"], "Day out");
    assert_eq!(body["trip_status"], "Upcoming");
}

#[tokio::test]
async fn trips_of_other_users_are_not_found() {
    let app = TestApp::new().await;
    let owner = app.register_and_login("kahu").await;
    let other = app.register_and_login("rangi").await;

    let (_, body) = app
        .json(
            Method::POST,
            "/add-trip",
            Some(&owner),
            Some(json!({ "trip_name": "Private" })),
        )
        .await;
    let trip_id = body["trip_id"].as_i64().expect("trip id");

    let (status, _) = app
        .json(Method::GET, &format!("/trips/{trip_id}"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(
            Method::PUT,
            &format!("/update-trip/{trip_id}"),
            Some(&other),
            Some(json!({ "updated_trip": {}, "stops_of_trip": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(
            Method::DELETE,
            &format!("/delete-trip/{trip_id}"),
            Some(&other),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(
            Method::DELETE,
            &format!("/delete-trip/{trip_id}"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn trip_list_puts_active_trips_first() {
    let app = TestApp::new().await;
    let token = app.register_and_login("tui").await;

    for (name, status) in [
        ("Old", "Finished"),
        ("Soon", "Upcoming"),
        ("Now", "In Progress"),
        ("Late", "Delayed"),
    ] {
        let (status_code, _) = app
            .json(
                Method::POST,
                "/add-trip",
                Some(&token),
                Some(json!({ "trip_name": name, "trip_status": status })),
            )
            .await;
        assert_eq!(status_code, StatusCode::OK);
    }

    let (status, body) = app.json(Method::GET, "/trips", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .expect("trip list")
        .iter()
        .map(|trip| trip["trip_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Now", "Soon", "Late", "Old"]);
}

#[tokio::test]
async fn profile_update_skips_empty_fields_and_sanitises() {
    let app = TestApp::new().await;
    let token = app.register_and_login("awhina").await;

    let (status, _) = app
        .form(
            "/update-profile",
            Some(&token),
            "display_name=%3Cb%3EAwhina%3C%2Fb%3E%21&gender=false&dob=&vehicle=&email=&phone=&address=&city=Hamilton&district=",
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.json(Method::GET, "/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["display_name"], "Awhina");
    assert_eq!(body["user"]["gender"], false);
    assert_eq!(body["user"]["vehicle"], "Van");
    assert_eq!(body["user"]["dob"], "1990-04-01");
    assert_eq!(body["user_contact"]["city"], "Hamilton");
    assert_eq!(body["user_contact"]["district"], "Central");
}

#[tokio::test]
async fn password_change_and_logout() {
    let app = TestApp::new().await;
    let token = app.register_and_login("nikau").await;

    let (status, body) = app
        .form(
            "/update-password",
            Some(&token),
            "current_pwd=secret-pass&new_pwd=fresh-secret&cf_new_pwd=other-secret",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "New passwords don't match!");

    let (status, _) = app
        .form(
            "/update-password",
            Some(&token),
            "current_pwd=secret-pass&new_pwd=fresh-secret&cf_new_pwd=fresh-secret",
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .form("/login", None, "username=nikau&password=fresh-secret")
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.form("/logout", Some(&token), "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .json(Method::GET, "/validate-token", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
