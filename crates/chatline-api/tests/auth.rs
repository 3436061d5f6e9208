mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use common::{ADMIN_EMAIL, PASSWORD, test_app};

#[tokio::test]
async fn signup_issues_token_for_new_user_and_sets_strict_cookie() {
    let app = test_app();
    let res = app
        .json(
            Method::POST,
            "/api/auth/signup",
            None,
            json!({ "fullName": "Alice", "email": "Alice@Example.com", "password": PASSWORD, "bio": "hi" }),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["userData"]["email"], "alice@example.com");
    assert_eq!(res.body["userData"]["bio"], "hi");
    assert!(res.body["userData"].get("password").is_none());

    let token = res.body["token"].as_str().unwrap();
    let claims = app.state.tokens.verify_access_token(token).unwrap();
    assert_eq!(claims.sub.to_string(), res.body["userData"]["id"].as_str().unwrap());

    let cookie = res.set_cookie().unwrap();
    assert!(cookie.starts_with("refreshToken="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("Max-Age=604800"));
}

#[tokio::test]
async fn signup_validation() {
    let app = test_app();

    let res = app
        .json(Method::POST, "/api/auth/signup", None, json!({ "email": "a@b.c", "password": PASSWORD }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Missing details");

    app.signup("Alice", "alice@example.com").await;
    let res = app
        .json(
            Method::POST,
            "/api/auth/signup",
            None,
            json!({ "fullName": "Other", "email": "alice@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Account already exists");
}

#[tokio::test]
async fn login_with_wrong_password_issues_nothing() {
    let app = test_app();
    app.signup("Alice", "alice@example.com").await;

    let res = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "alice@example.com", "password": "wrong password" }),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body.get("token").is_none());
    assert!(res.set_cookie().is_none());
}

#[tokio::test]
async fn login_succeeds_and_replaces_previous_refresh_token() {
    let app = test_app();
    let (_, _, signup_cookie) = app.signup("Alice", "alice@example.com").await;

    let res = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "ALICE@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["token"].is_string());
    let login_cookie = res.refresh_cookie().unwrap();

    // The signup token was overwritten, so presenting it is a replay
    assert_eq!(app.refresh(Some(&signup_cookie)).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.refresh(Some(&login_cookie)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn assistant_account_cannot_log_in() {
    let app = test_app();
    let assistant = app
        .state
        .db
        .get_user_by_id(&app.state.config.assistant_id.to_string())
        .unwrap()
        .unwrap();

    let res = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": assistant.email, "password": "!" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_rotates_once_and_replay_revokes() {
    let app = test_app();
    let (_, user_id, cookie) = app.signup("Alice", "alice@example.com").await;

    let first = app.refresh(Some(&cookie)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["userData"]["id"], user_id.as_str());
    assert!(first.body["token"].is_string());
    let rotated = first.refresh_cookie().unwrap();
    assert_ne!(rotated, cookie);

    // Replaying the stale cookie is treated as theft
    let replay = app.refresh(Some(&cookie)).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert!(replay.set_cookie().unwrap().starts_with("refreshToken=;"));

    let stored = app.state.db.get_user_by_id(&user_id).unwrap().unwrap();
    assert!(stored.refresh_token.is_none());

    // ...which also kills the legitimately rotated token
    assert_eq!(app.refresh(Some(&rotated)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_without_or_with_bogus_cookie() {
    let app = test_app();
    assert_eq!(app.refresh(None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.refresh(Some("refreshToken=garbage")).await.status,
        StatusCode::UNAUTHORIZED
    );

    // An access token is signed with the other secret
    let (token, _, _) = app.signup("Alice", "alice@example.com").await;
    let res = app.refresh(Some(&format!("refreshToken={}", token))).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_stored_token() {
    let app = test_app();
    let (token, user_id, cookie) = app.signup("Alice", "alice@example.com").await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.set_cookie().unwrap().starts_with("refreshToken=;"));

    assert!(app.state.db.get_user_by_id(&user_id).unwrap().unwrap().refresh_token.is_none());
    assert_eq!(app.refresh(Some(&cookie)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_valid_bearer() {
    let app = test_app();

    let res = app
        .send(
            Request::builder()
                .uri("/api/auth/get-profile")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Not authorized, no token");

    let res = app.get("/api/auth/get-profile", "nonsense").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Invalid token");

    let (token, user_id, _) = app.signup("Alice", "alice@example.com").await;
    let res = app.get("/api/auth/get-profile", &token).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["id"], user_id.as_str());

    let res = app.get("/api/auth/check", &token).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn update_profile_with_avatar() {
    let app = test_app();
    let (token, _, _) = app.signup("Alice", "alice@example.com").await;

    let res = app
        .multipart(
            Method::PUT,
            "/api/auth/update-profile",
            &token,
            &[("fullName", "Alice Liddell"), ("bio", "down the hole")],
            Some(("profilePic", "image/png", &b"\x89PNG fake"[..])),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["user"]["fullName"], "Alice Liddell");
    assert_eq!(res.body["user"]["bio"], "down the hole");
    assert_eq!(res.body["user"]["profilePic"], "https://media.test/avatars/0.img");
    assert_eq!(app.media.uploads.lock().unwrap().as_slice(), ["image/png"]);
}

#[tokio::test]
async fn update_profile_rejects_non_images_and_disabled_uploads() {
    let app = test_app();
    let (token, user_id, _) = app.signup("Alice", "alice@example.com").await;

    let res = app
        .multipart(
            Method::PUT,
            "/api/auth/update-profile",
            &token,
            &[],
            Some(("profilePic", "application/pdf", &b"%PDF"[..])),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    app.state.db.set_user_flags(&user_id, Some(false), None).unwrap();
    let res = app
        .multipart(
            Method::PUT,
            "/api/auth/update-profile",
            &token,
            &[],
            Some(("profilePic", "image/png", &b"\x89PNG"[..])),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    // Text-only edits still work
    let res = app
        .multipart(Method::PUT, "/api/auth/update-profile", &token, &[("bio", "new")], None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["bio"], "new");
    assert!(app.media.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn admin_toggles_user_flags() {
    let app = test_app();
    let (admin_token, _, _) = app.signup("Admin", ADMIN_EMAIL).await;
    let (token, user_id, _) = app.signup("Alice", "alice@example.com").await;

    let uri = format!("/api/admin/users/{}/flags", user_id);
    let res = app
        .json(Method::PUT, &uri, Some(&token), json!({ "uploadEnabled": false }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .json(Method::PUT, &uri, Some(&admin_token), json!({ "uploadEnabled": false }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["uploadEnabled"], false);
    assert_eq!(res.body["user"]["aiEnabled"], true);

    let res = app
        .multipart(
            Method::PUT,
            "/api/auth/update-profile",
            &token,
            &[],
            Some(("profilePic", "image/png", &b"\x89PNG"[..])),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let missing = format!("/api/admin/users/{}/flags", uuid::Uuid::new_v4());
    let res = app
        .json(Method::PUT, &missing, Some(&admin_token), json!({ "aiEnabled": false }))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_gets_error_envelope() {
    let app = test_app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{fullName: nope"))
        .unwrap();

    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["success"], false);
    assert!(res.body["message"].is_string());
}

#[tokio::test]
async fn racing_signups_for_one_email_yield_one_account() {
    let app = test_app();
    let body = || json!({ "fullName": "Alice", "email": "alice@example.com", "password": PASSWORD });

    let (a, b) = tokio::join!(
        app.json(Method::POST, "/api/auth/signup", None, body()),
        app.json(Method::POST, "/api/auth/signup", None, body()),
    );

    let mut statuses = [a.status, b.status];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::BAD_REQUEST]);
    let loser = if a.status == StatusCode::BAD_REQUEST { &a } else { &b };
    assert_eq!(loser.body["message"], "Account already exists");
}
