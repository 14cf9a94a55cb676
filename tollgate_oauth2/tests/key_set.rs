use std::time::Duration;

use color_eyre::Result;
use tollgate_oauth2::{KeySetError, KeySetFetcher};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

mod common;
use common::{jwks_body, SigningKey, JWKS_PATH};

fn jwks_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), JWKS_PATH)
}

#[tokio::test]
async fn fresh_key_set_is_served_from_cache() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[&key])?))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::new(jwks_url(&server))?;
    let first = fetcher.key_set().await?;
    let second = fetcher.key_set().await?;

    assert_eq!(first, second);
    assert!(first.contains_key_id(&key.kid));
    Ok(())
}

#[tokio::test]
async fn zero_lifetime_fetches_every_time() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[&key])?))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::builder(jwks_url(&server))
        .with_cache_ttl(Duration::ZERO)
        .build()?;

    for _ in 0..3 {
        fetcher.key_set().await?;
    }
    Ok(())
}

#[tokio::test]
async fn invalidated_key_set_is_fetched_again() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[&key])?))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::new(jwks_url(&server))?;
    fetcher.key_set().await?;
    fetcher.invalidate();
    fetcher.key_set().await?;
    Ok(())
}

#[tokio::test]
async fn unchanged_key_set_is_revalidated_with_etag() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_body(&[&key])?)
                .insert_header("ETag", "\"v1\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::builder(jwks_url(&server))
        .with_cache_ttl(Duration::ZERO)
        .build()?;

    let first = fetcher.key_set().await?;
    let second = fetcher.key_set().await?;

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn slow_endpoint_times_out() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_body(&[&key])?)
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::builder(jwks_url(&server))
        .with_timeout(Duration::from_millis(200))
        .build()?;

    match fetcher.key_set().await {
        Err(KeySetError::Request(err)) => assert!(err.is_timeout()),
        other => panic!("expected a timeout, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn server_error_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::new(jwks_url(&server))?;

    match fetcher.key_set().await {
        Err(KeySetError::UnexpectedStatus(status)) => assert_eq!(status.as_u16(), 500),
        other => panic!("expected an unexpected status, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn body_that_is_not_a_key_set_is_rejected() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::new(jwks_url(&server))?;

    assert!(matches!(
        fetcher.key_set().await,
        Err(KeySetError::Malformed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn failed_fetch_keeps_previous_key_set() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[&key])?))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::new(jwks_url(&server))?;
    fetcher.key_set().await?;

    assert!(fetcher.refresh().await.is_err());

    let cached = fetcher.key_set().await?;
    assert!(cached.contains_key_id(&key.kid));
    Ok(())
}

#[tokio::test]
async fn unsupported_keys_are_skipped() -> Result<()> {
    let key = SigningKey::generate("key-1")?;
    let mut body = jwks_body(&[&key])?;
    if let Some(keys) = body["keys"].as_array_mut() {
        keys.insert(
            0,
            serde_json::json!({ "kid": "ec-1", "kty": "EC", "crv": "P-256", "x": "AA", "y": "AA" }),
        );
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let fetcher = KeySetFetcher::new(jwks_url(&server))?;
    let jwks = fetcher.key_set().await?;

    assert_eq!(jwks.keys().len(), 1);
    assert!(jwks.contains_key_id(&key.kid));
    Ok(())
}
