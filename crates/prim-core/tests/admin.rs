use actix_web::middleware::from_fn;
use actix_web::{test, web, App};
use base64::Engine;

use prim_core::feedback::{augment_response, FEEDBACK_HEADER};
use prim_core::payment::PAYMENT_SIGNATURE_HEADER;
use prim_core::{
    routes, AllowlistRegistry, AppState, FeedbackChannel, PayerHeaderVerifier, PaymentGate,
    PrimConfig,
};

const ADMIN_TOKEN: &str = "test-admin-token-0123456789abcdef";
const ADMIN: &str = "0x1234567890123456789012345678901234567890";
const WALLET: &str = "0xAbCdEf1234567890aBcDeF1234567890AbCdEf12";

fn make_state(admin_token: Option<&str>) -> AppState {
    let config = PrimConfig {
        service_name: "prim-test".to_string(),
        allowlist_db_path: ":memory:".to_string(),
        admin_token: admin_token.map(String::from),
        ..PrimConfig::default()
    };
    AppState::new(config, AllowlistRegistry::new()).unwrap()
}

fn setup(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let gate = state.allowlist_gate().unwrap();
        cfg.app_data(web::Data::new(FeedbackChannel::default()))
            .app_data(web::Data::new(PaymentGate::new(PayerHeaderVerifier)))
            .app_data(web::Data::new(gate))
            .app_data(web::Data::new(state))
            .configure(routes::health::configure)
            .configure(routes::admin::configure)
            .configure(routes::whoami::configure);
    }
}

fn signature_for(from: &str) -> String {
    let payment = serde_json::json!({ "payload": { "from": from } });
    base64::engine::general_purpose::STANDARD.encode(payment.to_string())
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

#[actix_rt::test]
async fn test_admin_routes_not_configured_without_token() {
    let app = test::init_service(
        App::new()
            .wrap(from_fn(augment_response))
            .configure(setup(make_state(None))),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/admin/allowlist")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 501);
    assert!(resp.headers().contains_key(FEEDBACK_HEADER));
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "not_configured");
    assert!(body["feedback_url"].is_string());
}

#[actix_rt::test]
async fn test_admin_requires_valid_token() {
    let app = test::init_service(
        App::new()
            .wrap(from_fn(augment_response))
            .configure(setup(make_state(Some(ADMIN_TOKEN)))),
    )
    .await;

    // No token: identity absent
    let req = test::TestRequest::get().uri("/admin/allowlist").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "forbidden");

    // Wrong token: identity present but not permitted
    let req = test::TestRequest::get()
        .uri("/admin/allowlist")
        .insert_header(bearer("wrong-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[actix_rt::test]
async fn test_add_then_gated_route_admits_wallet() {
    let app = test::init_service(
        App::new()
            .wrap(from_fn(augment_response))
            .configure(setup(make_state(Some(ADMIN_TOKEN)))),
    )
    .await;

    // Not yet allowlisted
    let req = test::TestRequest::get()
        .uri("/v1/whoami")
        .insert_header((PAYMENT_SIGNATURE_HEADER, signature_for(WALLET)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri("/admin/allowlist")
        .insert_header(bearer(ADMIN_TOKEN))
        .insert_header(("X-Admin-Address", ADMIN))
        .set_json(serde_json::json!({ "address": WALLET, "note": "beta tester" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["entry"]["address"], WALLET.to_lowercase());
    assert_eq!(body["entry"]["added_by"], ADMIN);
    assert_eq!(body["entry"]["note"], "beta tester");

    let req = test::TestRequest::get()
        .uri("/v1/whoami")
        .insert_header((PAYMENT_SIGNATURE_HEADER, signature_for(&WALLET.to_lowercase())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["wallet_address"], WALLET.to_lowercase());
}

#[actix_rt::test]
async fn test_add_rejects_bad_input() {
    let app = test::init_service(
        App::new()
            .wrap(from_fn(augment_response))
            .configure(setup(make_state(Some(ADMIN_TOKEN)))),
    )
    .await;

    for payload in [
        "not json".to_string(),
        "{}".to_string(),
        serde_json::json!({ "address": "0xabc" }).to_string(),
    ] {
        let req = test::TestRequest::post()
            .uri("/admin/allowlist")
            .insert_header(bearer(ADMIN_TOKEN))
            .insert_header(("Content-Type", "application/json"))
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "invalid_request");
    }
}

#[actix_rt::test]
async fn test_upsert_get_and_idempotent_remove() {
    let app = test::init_service(
        App::new()
            .wrap(from_fn(augment_response))
            .configure(setup(make_state(Some(ADMIN_TOKEN)))),
    )
    .await;

    for note in ["first", "second"] {
        let req = test::TestRequest::post()
            .uri("/admin/allowlist")
            .insert_header(bearer(ADMIN_TOKEN))
            .set_json(serde_json::json!({ "address": WALLET, "note": note }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    let req = test::TestRequest::get()
        .uri("/admin/allowlist")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["entries"][0]["note"], "second");

    let uri = format!("/admin/allowlist/{}", WALLET.to_uppercase().replacen("0X", "0x", 1));
    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["entry"]["address"], WALLET.to_lowercase());

    for expected in [true, false] {
        let req = test::TestRequest::delete()
            .uri(&format!("/admin/allowlist/{}", WALLET))
            .insert_header(bearer(ADMIN_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["removed"], expected);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/admin/allowlist/{}", WALLET))
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(body["feedback_url"].is_string());
}

#[actix_rt::test]
async fn test_health_reports_allowlist_status() {
    let app = test::init_service(
        App::new()
            .wrap(from_fn(augment_response))
            .configure(setup(make_state(None))),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key(FEEDBACK_HEADER));
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "prim-test");
    assert_eq!(body["allowlist_status"], "ok");
}
