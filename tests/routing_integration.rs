mod support;

use anyhow::Result;
use http::StatusCode;
use http::header::CONTENT_TYPE;

use offline_router::build_worker;
use offline_router::router::{
    Request, RequestClass, RequestDestination, RequestMode, ResponseSource, RouteOutcome,
    StoreOutcome,
};
use offline_router::worker::ServiceWorker;

use support::*;

async fn active_worker(upstream: &SiteUpstream) -> Result<ServiceWorker> {
    let worker = build_worker(&test_settings(&upstream.origin(), "v1", None)).await?;
    worker.install_and_activate().await?;
    Ok(worker)
}

#[tokio::test]
async fn precached_static_asset_needs_no_network() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    let worker = active_worker(&upstream).await?;
    assert_eq!(upstream.hits("/css/styles.css"), 1);

    let request = Request::get("/css/styles.css")?.with_destination(RequestDestination::Style);
    let routed = worker.fetch(&request).await;

    assert_eq!(routed.report.class, RequestClass::StaticAsset);
    assert_eq!(routed.report.source, ResponseSource::Cache);
    let response = routed.response().expect("cached response");
    assert_eq!(response.body.as_ref(), b"body { margin: 0 }");
    assert_eq!(upstream.hits("/css/styles.css"), 1);
    Ok(())
}

#[tokio::test]
async fn image_partition_keeps_the_newest_hundred() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    for i in 0..101 {
        upstream.ok(&format!("/images/p{i}.png"), "image/png", format!("png-{i}"));
    }
    let worker = active_worker(&upstream).await?;

    for i in 0..101 {
        let request = Request::get(&format!("/images/p{i}.png"))?
            .with_destination(RequestDestination::Image);
        let routed = worker.fetch(&request).await;
        assert_eq!(routed.report.source, ResponseSource::Network);
        assert_eq!(routed.report.stored, StoreOutcome::Stored);
    }

    let dynamic = worker.router().storage().open("dynamic-v1").await?;
    assert_eq!(dynamic.len(), 100);
    let keys = dynamic.keys();
    assert!(!keys.contains(&"/images/p0.png".to_string()));
    assert!(keys.contains(&"/images/p1.png".to_string()));
    assert!(keys.contains(&"/images/p100.png".to_string()));

    // The evicted image is fetched again.
    let again = Request::get("/images/p0.png")?.with_destination(RequestDestination::Image);
    assert_eq!(worker.fetch(&again).await.report.source, ResponseSource::Network);
    assert_eq!(upstream.hits("/images/p0.png"), 2);
    Ok(())
}

#[tokio::test]
async fn navigation_copy_is_stored_byte_for_byte() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    let page = "<html><body>Categor\u{ed}as \u{1f6d2}</body></html>".as_bytes().to_vec();
    upstream.ok("/categorias.html", "text/html; charset=utf-8", page.clone());
    let worker = active_worker(&upstream).await?;

    let request = Request::get("/categorias.html")?.with_mode(RequestMode::Navigate);
    let online = worker.fetch(&request).await;
    assert_eq!(online.report.stored, StoreOutcome::Stored);
    assert_eq!(online.response().unwrap().body.as_ref(), page.as_slice());

    let stored = worker
        .router()
        .storage()
        .open("dynamic-v1")
        .await?
        .get(&request)
        .expect("navigation stored");
    assert_eq!(stored.body.as_ref(), page.as_slice());

    upstream.go_offline();
    let offline = worker.fetch(&request).await;
    assert_eq!(offline.report.source, ResponseSource::Cache);
    let response = offline.response().unwrap();
    assert_eq!(response.body.as_ref(), page.as_slice());
    assert_eq!(
        response.headers.get(CONTENT_TYPE).unwrap(),
        "text/html; charset=utf-8"
    );
    Ok(())
}

#[tokio::test]
async fn error_pages_are_returned_but_not_stored() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    let worker = active_worker(&upstream).await?;

    let request = Request::get("/no-existe.html")?.with_mode(RequestMode::Navigate);
    let routed = worker.fetch(&request).await;
    assert_eq!(routed.response().unwrap().status, StatusCode::NOT_FOUND);
    assert_eq!(routed.report.stored, StoreOutcome::NotAttempted);
    assert!(worker.router().storage().match_any(&request).is_none());
    Ok(())
}

#[tokio::test]
async fn offline_navigation_gets_offline_document() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    let worker = active_worker(&upstream).await?;
    upstream.go_offline();

    let request = Request::get("/contacto.html")?.with_mode(RequestMode::Navigate);
    let routed = worker.fetch(&request).await;
    assert_eq!(routed.report.source, ResponseSource::Fallback);
    assert_eq!(routed.response().unwrap().body.as_ref(), OFFLINE_PAGE.as_bytes());
    Ok(())
}

#[tokio::test]
async fn offline_image_gets_placeholder() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    let worker = active_worker(&upstream).await?;
    upstream.go_offline();

    let request = Request::get("/images/nuevo.png")?.with_destination(RequestDestination::Image);
    let routed = worker.fetch(&request).await;
    assert_eq!(routed.report.source, ResponseSource::Fallback);
    let response = routed.response().unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "image/svg+xml");
    Ok(())
}

#[tokio::test]
async fn api_falls_back_to_last_good_copy() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    upstream.ok("/api/products", "application/json", r#"[{"id":1}]"#);
    let worker = active_worker(&upstream).await?;

    let products = Request::get("/api/products")?;
    let online = worker.fetch(&products).await;
    assert_eq!(online.report.class, RequestClass::ApiData);
    assert_eq!(online.report.stored, StoreOutcome::Stored);

    upstream.go_offline();
    let offline = worker.fetch(&products).await;
    assert_eq!(offline.report.source, ResponseSource::Cache);
    assert_eq!(offline.response().unwrap().body.as_ref(), br#"[{"id":1}]"#);

    let uncached = Request::get("/api/offers")?;
    assert_eq!(worker.fetch(&uncached).await.outcome, RouteOutcome::NetworkError);
    Ok(())
}

#[tokio::test]
async fn other_requests_are_never_stored() -> Result<()> {
    let upstream = SiteUpstream::start().await?;
    serve_site(&upstream);
    upstream.ok("/manifest.json", "application/json", "{}");
    let worker = active_worker(&upstream).await?;

    let request = Request::get("/manifest.json")?;
    let routed = worker.fetch(&request).await;
    assert_eq!(routed.report.class, RequestClass::Other);
    assert_eq!(routed.report.source, ResponseSource::Network);
    assert!(worker.router().storage().match_any(&request).is_none());

    upstream.go_offline();
    let offline = worker.fetch(&request).await;
    assert_eq!(offline.response().unwrap().status, StatusCode::NOT_FOUND);
    assert!(offline.response().unwrap().body.is_empty());
    Ok(())
}
