//! End-to-end tests against a running server.

use std::time::Duration;

use status_remap::config::ServerConfig;
use status_remap::StatusMapping;

mod common;

fn config_with(codes: &[(&str, i64)]) -> ServerConfig {
    let mut config = ServerConfig::default();
    for (from, to) in codes {
        config
            .remap
            .codes
            .insert(from.to_string(), toml::Value::Integer(*to));
    }
    config
}

#[tokio::test]
async fn test_mapped_404_becomes_410() {
    let server = common::start_server(config_with(&[("404", 410)]), &[]).await;

    let res = common::client()
        .get(server.url("/does-not-exist"))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 410);
    assert_eq!(res.text().await.unwrap(), "Gone");
}

#[tokio::test]
async fn test_empty_mapping_passes_body() {
    let server = common::start_server(ServerConfig::default(), &[]).await;

    let res = common::client().get(server.url("/")).send().await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "status-remap\n");
}

#[tokio::test]
async fn test_unmapped_status_keeps_body() {
    let server = common::start_server(config_with(&[("404", 410)]), &[]).await;

    let res = common::client()
        .post(server.url("/status/418"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 418);
    assert_eq!(res.text().await.unwrap(), "status 418\n");
}

#[tokio::test]
async fn test_handler_panic_becomes_500() {
    let server = common::start_server(config_with(&[("404", 410)]), &[]).await;

    let res = common::client().get(server.url("/panic")).send().await.unwrap();

    assert_eq!(res.status(), 500);
}

#[tokio::test]
async fn test_redirect_precedence() {
    let plain = common::start_server(ServerConfig::default(), &[]).await;
    let res = common::client()
        .get(plain.url("/redirect/x"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()["location"], "/x");

    let remapped = common::start_server(ServerConfig::default(), &[("302", "404")]).await;
    let res = common::client()
        .get(remapped.url("/redirect/x"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert!(res.headers().get("location").is_none());
}

#[tokio::test]
async fn test_cli_overrides_win_over_config() {
    let server = common::start_server(config_with(&[("404", 410)]), &[("404", "451"), ("abc", "500")]).await;

    let res = common::client()
        .get(server.url("/nowhere"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 451);
    assert_eq!(server.mapping.load().len(), 1);
}

#[tokio::test]
async fn test_config_update_swaps_mapping() {
    let server = common::start_server(ServerConfig::default(), &[]).await;
    let client = common::client();

    let res = client.get(server.url("/status/503")).send().await.unwrap();
    assert_eq!(res.status(), 503);

    server
        .config_updates
        .send(config_with(&[("503", 429)]))
        .unwrap();

    // The swap happens on the server's reload task.
    let mut swapped = false;
    for _ in 0..50 {
        if *server.mapping.load() == StatusMapping::from_iter([(503, 429)]) {
            swapped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(swapped, "mapping was not swapped");

    let res = client.get(server.url("/status/503")).send().await.unwrap();
    assert_eq!(res.status(), 429);
}
