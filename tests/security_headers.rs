#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App, HttpResponse};
use agora::repo::inmem::InMemRepo;
use agora::{config, AppState, SecurityHeaders};
use std::sync::Arc;

fn setup_env() {
    std::env::remove_var("ENABLE_HSTS");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("AGORA_DATA_DIR", tmp.into_path());
}

#[actix_web::test]
#[serial_test::serial]
async fn test_security_headers_present() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(InMemRepo::new()),
            }))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/forums").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
#[serial_test::serial]
async fn test_hsts_enabled_via_builder() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env().with_hsts(true))
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(InMemRepo::new()),
            }))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/forums").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(
        resp.headers().get("strict-transport-security").is_some(),
        "HSTS header missing"
    );
}

// Handler-provided headers win over the middleware defaults.
#[actix_web::test]
#[serial_test::serial]
async fn test_existing_cache_header_preserved() {
    setup_env();
    let app = test::init_service(App::new().wrap(SecurityHeaders::from_env()).route(
        "/custom",
        web::get().to(|| async {
            HttpResponse::Ok()
                .insert_header((actix_web::http::header::CACHE_CONTROL, "max-age=60"))
                .finish()
        }),
    ))
    .await;
    let req = test::TestRequest::get().uri("/custom").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get("cache-control").unwrap(), "max-age=60");
}
