use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use pubnub_client::{
    Client, Config, ReconnectionPolicy, Status, StatusCategory,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config pointed at a local mock server.
fn test_config(server: &MockServer) -> Config {
    let mut config = Config::new("pub_key", "sub_key");
    config.uuid = "test-uuid".into();
    config.origin = format!("127.0.0.1:{}", server.port());
    config.secure = false;
    config
}

async fn next_status(listener: &mut pubnub_client::Listener) -> Status {
    tokio::time::timeout(Duration::from_secs(10), listener.status.recv())
        .await
        .expect("timed out waiting for a status event")
        .expect("status channel closed")
}

/// Park the subscribe loop: an empty response for the given cursor, held
/// open like a real long-poll.
fn mock_idle_poll(server: &MockServer, path: &str, tt: &str, region: &str) {
    let body = format!(r#"{{"t":{{"t":"{tt}","r":{region}}},"m":[]}}"#);
    server.mock(|when, then| {
        when.method(GET).path(path).query_param("tt", tt);
        then.status(200)
            .body(body)
            .delay(Duration::from_secs(20));
    });
}

// ---------------------------------------------------------------------------
// Subscribe handshake → connected status, cursor, subscribed sets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_emits_connected_and_tracks_channels() {
    let server = MockServer::start();
    let handshake = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/subscribe/sub_key/ch/0")
            .query_param("tt", "0")
            .query_param("heartbeat", "300")
            .query_param("uuid", "test-uuid");
        then.status(200)
            .body(r#"{"t":{"t":"15079041051785708","r":12},"m":[]}"#);
    });
    mock_idle_poll(&server, "/v2/subscribe/sub_key/ch/0", "15079041051785708", "12");

    let client = Client::new(test_config(&server)).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Connected);
    assert_eq!(status.affected_channels, vec!["ch"]);
    assert!(!status.error);

    assert_eq!(client.subscribed_channels(), vec!["ch"]);
    assert!(client.subscribed_groups().is_empty());
    handshake.assert();

    // No message events for an empty batch.
    assert!(listener.message.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Messages are delivered in envelope order with decoded payloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn messages_arrive_in_order() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v2/subscribe/sub_key/ch/0")
            .query_param("tt", "0");
        then.status(200).body(r#"{"t":{"t":"100","r":1},"m":[]}"#);
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/v2/subscribe/sub_key/ch/0")
            .query_param("tt", "100");
        then.status(200).body(
            r#"{"t":{"t":"200","r":1},"m":[
                {"a":"4","f":0,"i":"sender","p":{"t":"150","r":1},"k":"sub_key","c":"ch","d":{"n":1}},
                {"c":"ch","b":"ch","d":"second"}
            ]}"#,
        );
    });
    mock_idle_poll(&server, "/v2/subscribe/sub_key/ch/0", "200", "1");

    let client = Client::new(test_config(&server)).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    assert_eq!(
        next_status(&mut listener).await.category,
        StatusCategory::Connected
    );

    let first = tokio::time::timeout(Duration::from_secs(10), listener.message.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(first.payload, json!({"n": 1}));
    assert_eq!(first.publisher.as_deref(), Some("sender"));
    assert_eq!(first.timetoken, 150);
    assert_eq!(first.subscription, None);

    let second = tokio::time::timeout(Duration::from_secs(10), listener.message.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(second.payload, json!("second"));
    assert_eq!(second.timetoken, 200);
}

// ---------------------------------------------------------------------------
// Unsubscribe mid-stream: acknowledgment, rewritten URL, leave call
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsubscribe_rewrites_the_poll_and_announces() {
    let server = MockServer::start();
    // Channel list is sorted, so the two-channel path is stable.
    server.mock(|when, then| {
        when.method(GET).path("/v2/subscribe/sub_key/c1,c2/0");
        then.status(200)
            .body(r#"{"t":{"t":"100","r":1},"m":[]}"#)
            .delay(Duration::from_millis(200));
    });
    let single = server.mock(|when, then| {
        when.method(GET).path("/v2/subscribe/sub_key/c1/0");
        then.status(200)
            .body(r#"{"t":{"t":"100","r":1},"m":[]}"#)
            .delay(Duration::from_secs(20));
    });
    let leave = server.mock(|when, then| {
        when.method(GET).path_contains("/leave");
        then.status(200)
            .body(r#"{"status": 200, "message": "OK", "service": "Presence"}"#);
    });

    let client = Client::new(test_config(&server)).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["c1", "c2"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Connected);
    assert_eq!(status.affected_channels, vec!["c1", "c2"]);

    client.unsubscribe().channels(["c2"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Acknowledgment);
    assert_eq!(status.affected_channels, vec!["c2"]);
    assert_eq!(client.subscribed_channels(), vec!["c1"]);

    // The next poll must drop c2 from the URL.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(single.hits() >= 1, "expected a poll without c2");
    assert!(leave.hits() >= 1, "expected a presence leave for c2");

    // unsubscribe_all: one cancelled status covering the remainder.
    client.unsubscribe_all().execute().unwrap();
    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Cancelled);
    assert_eq!(status.affected_channels, vec!["c1"]);
    assert!(client.subscribed_channels().is_empty());
    assert!(client.subscribed_groups().is_empty());
}

// ---------------------------------------------------------------------------
// 403 → access-denied status, subscribed sets emptied
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forbidden_subscribe_reports_access_denied() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_contains("/v2/subscribe/");
        then.status(403)
            .body(r#"{"message":"Forbidden","payload":{"channels":["ch"]},"status":403}"#);
    });

    let client = Client::new(test_config(&server)).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::AccessDenied);
    assert!(status.error);
    assert_eq!(status.affected_channels, vec!["ch"]);
    assert!(client.subscribed_channels().is_empty());
}

// ---------------------------------------------------------------------------
// Recoverable failures: unexpected-disconnect, then retry exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retries_exhaust_after_the_configured_budget() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_contains("/v2/subscribe/");
        then.status(500).body("Internal Server Error");
    });

    let mut config = test_config(&server);
    config.reconnection_policy = ReconnectionPolicy::Exponential;
    config.maximum_reconnection_retries = 2;
    let client = Client::new(config).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::UnexpectedDisconnect);
    assert!(status.error);

    let status = next_status(&mut listener).await;
    assert_eq!(
        status.category,
        StatusCategory::ReconnectionAttemptsExhausted
    );
    assert!(status.error);
}

#[tokio::test]
async fn reconnected_after_a_successful_retry() {
    let server = MockServer::start();
    let mut failing = server.mock(|when, then| {
        when.method(GET).path_contains("/v2/subscribe/");
        then.status(500).body("Internal Server Error");
    });

    let mut config = test_config(&server);
    config.reconnection_policy = ReconnectionPolicy::Exponential;
    let client = Client::new(config).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::UnexpectedDisconnect);

    // Let the server recover before the next backoff expires.
    failing.delete();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v2/subscribe/sub_key/ch/0")
            .query_param("tt", "0");
        then.status(200).body(r#"{"t":{"t":"300","r":1},"m":[]}"#);
    });
    mock_idle_poll(&server, "/v2/subscribe/sub_key/ch/0", "300", "1");

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Reconnected);
    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Connected);
    assert_eq!(status.affected_channels, vec!["ch"]);
}

// ---------------------------------------------------------------------------
// Policy none: a single failure disconnects and halts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn none_policy_disconnects_on_first_failure() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(GET).path_contains("/v2/subscribe/");
        then.status(502).body("Bad Gateway");
    });

    let client = Client::new(test_config(&server)).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    let status = next_status(&mut listener).await;
    assert_eq!(status.category, StatusCategory::Disconnected);
    let hits = failing.hits();

    // Halted: no further polls until the user acts.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(failing.hits(), hits);
}

// ---------------------------------------------------------------------------
// Filter expression and auth key ride on the poll URL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_carries_filter_and_auth() {
    let server = MockServer::start();
    let filtered = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/subscribe/sub_key/ch/0")
            .query_param("tt", "0")
            .query_param_exists("filter-expr")
            .query_param("auth", "my-auth");
        then.status(200).body(r#"{"t":{"t":"100","r":1},"m":[]}"#);
    });
    mock_idle_poll(&server, "/v2/subscribe/sub_key/ch/0", "100", "1");

    let mut config = test_config(&server);
    config.filter_expression = Some("uuid == 'me'".into());
    config.auth_key = Some("my-auth".into());
    let client = Client::new(config).unwrap();
    let mut listener = client.add_listener();
    client.subscribe().channels(["ch"]).execute().unwrap();

    assert_eq!(
        next_status(&mut listener).await.category,
        StatusCategory::Connected
    );
    assert!(filtered.hits() >= 1);
}

// ---------------------------------------------------------------------------
// Presence heartbeat fires on its own timer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_announces_presence() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v2/subscribe/sub_key/hb-ch/0");
        then.status(200)
            .body(r#"{"t":{"t":"100","r":1},"m":[]}"#)
            .delay(Duration::from_secs(20));
    });
    let heartbeat = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/presence/sub-key/sub_key/channel/hb-ch/heartbeat")
            .query_param("heartbeat", "300");
        then.status(200)
            .body(r#"{"status": 200, "message": "OK", "service": "Presence"}"#);
    });

    let mut config = test_config(&server);
    config.heartbeat_interval = 1;
    let client = Client::new(config).unwrap();
    let _listener = client.add_listener();
    client.subscribe().channels(["hb-ch"]).execute().unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(heartbeat.hits() >= 1, "expected at least one heartbeat");
}

// ---------------------------------------------------------------------------
// One-shot operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_returns_the_timetoken() {
    let server = MockServer::start();
    let publish = server.mock(|when, then| {
        when.method(GET).path_contains("/publish/pub_key/sub_key/0/ch/0/");
        then.status(200).body(r#"[1,"Sent","14847286655208610"]"#);
    });

    let client = Client::new(test_config(&server)).unwrap();
    let response = client
        .publish()
        .channel("ch")
        .message(json!({"text": "hi"}))
        .execute()
        .await
        .unwrap();
    assert_eq!(response.timetoken, 14847286655208610);
    publish.assert();
}

#[tokio::test]
async fn publish_via_post_sends_the_body() {
    let server = MockServer::start();
    let publish = server.mock(|when, then| {
        when.method(POST)
            .path("/publish/pub_key/sub_key/0/ch/0")
            .body(r#"{"text":"hi"}"#);
        then.status(200).body(r#"[1,"Sent","14847286655208611"]"#);
    });

    let client = Client::new(test_config(&server)).unwrap();
    let response = client
        .publish()
        .channel("ch")
        .message(json!({"text": "hi"}))
        .use_post(true)
        .execute()
        .await
        .unwrap();
    assert_eq!(response.timetoken, 14847286655208611);
    publish.assert();
}

#[tokio::test]
async fn history_decrypts_with_the_configured_cipher() {
    let server = MockServer::start();
    let history = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/history/sub-key/sub_key/channel/ch")
            .query_param("count", "100")
            .query_param("reverse", "false")
            .query_param("include_token", "false");
        then.status(200)
            .body(r#"[["Wi24KS4pcTzvyuGOHubiXg=="],14991775432719844,14991868111600528]"#);
    });

    let mut config = test_config(&server);
    config.cipher_key = Some("enigma".into());
    let client = Client::new(config).unwrap();
    let response = client.history().channel("ch").execute().await.unwrap();
    assert_eq!(response.start_timetoken, 14991775432719844);
    assert_eq!(response.end_timetoken, 14991868111600528);
    assert_eq!(response.messages[0].message, json!("yay!"));
    history.assert();
}

#[tokio::test]
async fn history_count_is_clamped_to_the_maximum() {
    let server = MockServer::start();
    let history = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/history/sub-key/sub_key/channel/ch")
            .query_param("count", "100");
        then.status(200).body(r#"[["hey"],1,2]"#);
    });

    let client = Client::new(test_config(&server)).unwrap();
    client
        .history()
        .channel("ch")
        .count(5000)
        .execute()
        .await
        .unwrap();
    history.assert();
}

#[tokio::test]
async fn grant_is_signed_and_decodes_permissions() {
    let server = MockServer::start();
    let grant = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/auth/grant/sub-key/sub_key")
            .query_param("r", "0")
            .query_param("w", "0")
            .query_param("m", "0")
            .query_param("auth", "pam-key")
            .query_param("channel", "ch")
            .query_param_exists("timestamp")
            .query_param_exists("signature");
        then.status(200).body(
            r#"{"message":"Success","payload":{"level":"user","subscribe_key":"sub_key","ttl":1440,"channels":{"ch":{"r":0,"w":0,"m":0,"auths":{"pam-key":{"r":0,"w":0,"m":0}}}}},"service":"Access Manager","status":200}"#,
        );
    });

    let mut config = test_config(&server);
    config.secret_key = Some("secret".into());
    let client = Client::new(config).unwrap();
    let response = client
        .grant()
        .read(false)
        .write(false)
        .manage(false)
        .auth_keys(["pam-key"])
        .channels(["ch"])
        .execute()
        .await
        .unwrap();
    assert_eq!(response.level, "user");
    assert_eq!(response.ttl, 1440);
    let key = &response.channels["ch"].auth_keys["pam-key"];
    assert!(!key.read && !key.write && !key.manage);
    grant.assert();
}

#[tokio::test]
async fn grant_validates_ttl_bounds() {
    let server = MockServer::start();
    let mut config = test_config(&server);
    config.secret_key = Some("secret".into());
    let client = Client::new(config).unwrap();

    let err = client.grant().channels(["ch"]).ttl(-1).execute().await;
    assert!(matches!(err, Err(pubnub_client::Error::Validation(_))));

    let err = client.grant().channels(["ch"]).ttl(525_601).execute().await;
    assert!(matches!(err, Err(pubnub_client::Error::Validation(_))));
}

#[tokio::test]
async fn grant_requires_the_secret_key() {
    let server = MockServer::start();
    let client = Client::new(test_config(&server)).unwrap();
    let err = client.grant().channels(["ch"]).execute().await;
    assert!(matches!(err, Err(pubnub_client::Error::Validation(_))));
}

#[tokio::test]
async fn channel_groups_round_trip() {
    let server = MockServer::start();
    let add = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/channel-registration/sub-key/sub_key/channel-group/cg")
            .query_param("add", "a,b");
        then.status(200)
            .body(r#"{"status":200,"message":"OK","service":"channel-registry","error":false}"#);
    });
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/channel-registration/sub-key/sub_key/channel-group/cg-list");
        then.status(200).body(
            r#"{"status":200,"payload":{"channels":["a","b"],"group":"cg-list"},"service":"channel-registry","error":false}"#,
        );
    });

    let client = Client::new(test_config(&server)).unwrap();
    client
        .add_channel_to_channel_group()
        .channels(["a", "b"])
        .channel_group("cg")
        .execute()
        .await
        .unwrap();
    add.assert();

    let response = client
        .list_channels_in_channel_group()
        .channel_group("cg-list")
        .execute()
        .await
        .unwrap();
    assert_eq!(response.group, "cg-list");
    assert_eq!(response.channels, vec!["a", "b"]);
    list.assert();
}

#[tokio::test]
async fn here_now_reports_occupancy() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v2/presence/sub-key/sub_key/channel/ch");
        then.status(200).body(
            r#"{"status":200,"message":"OK","occupancy":2,"uuids":["u-1","u-2"],"service":"Presence"}"#,
        );
    });

    let client = Client::new(test_config(&server)).unwrap();
    let response = client
        .here_now()
        .channels(["ch"])
        .execute()
        .await
        .unwrap();
    assert_eq!(response.total_occupancy, 2);
    assert_eq!(response.channels[0].name, "ch");
    assert_eq!(response.channels[0].occupants[0].uuid, "u-1");
}

#[tokio::test]
async fn time_returns_the_server_timetoken() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/time/0");
        then.status(200).body("[15079041051785708]");
    });

    let client = Client::new(test_config(&server)).unwrap();
    let response = client.time().execute().await.unwrap();
    assert_eq!(response.timetoken, 15079041051785708);
}

// ---------------------------------------------------------------------------
// Validation stays synchronous, before any request is issued
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reserved_channel_names_are_rejected_up_front() {
    let server = MockServer::start();
    let client = Client::new(test_config(&server)).unwrap();

    let err = client.subscribe().channels(["bad,name"]).execute();
    assert!(matches!(err, Err(pubnub_client::Error::Validation(_))));

    let err = client
        .publish()
        .channel("bad/name")
        .message(json!(1))
        .execute()
        .await;
    assert!(matches!(err, Err(pubnub_client::Error::Validation(_))));

    let err = client.history().channel("bad:name").execute().await;
    assert!(matches!(err, Err(pubnub_client::Error::Validation(_))));
}

#[tokio::test]
async fn subscribe_timeout_must_exceed_heartbeat_interval() {
    let mut config = Config::new("pub_key", "sub_key");
    config.subscribe_request_timeout = Duration::from_secs(60);
    assert!(matches!(
        Client::new(config),
        Err(pubnub_client::Error::Validation(_))
    ));
}
