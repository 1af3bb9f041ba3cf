//! Command dispatch tests: authentication, token gating and replies.

use gridbase_service::{FixedClock, GridService, JwtValidator, Reply, Status, TokenService};
use gridbase_test_utils::fixtures::{self, users};
use gridbase_test_utils::{MockPersistence, QueryKind, SqlValue, StorageError, Tuple};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 2024-01-01 00:00:00 UTC
const NOW: i64 = 1704067200;
const ANN: Uuid = Uuid::from_u128(0xa22);

fn tokens(now: i64) -> Arc<JwtValidator> {
    Arc::new(
        JwtValidator::new(SecretString::new("service-secret".into()), Duration::from_secs(3600))
            .with_clock(Arc::new(FixedClock(now))),
    )
}

fn service() -> (GridService, MockPersistence, Arc<JwtValidator>) {
    let mock = fixtures::seeded_mock();
    mock.set_credentials(
        "ann",
        "correct horse",
        Tuple::new(vec![
            SqlValue::Uuid(ANN),
            SqlValue::Text("Ann".to_string()),
            SqlValue::Text("Smith".to_string()),
        ]),
    );
    let tokens = tokens(NOW);
    let service = GridService::new(Arc::new(mock.clone()), tokens.clone());
    (service, mock, tokens)
}

fn valid_jwt(tokens: &JwtValidator) -> String {
    match tokens.issue(ANN, "ann") {
        Ok(jwt) => jwt,
        Err(e) => panic!("cannot issue token: {}", e),
    }
}

async fn send(service: &mut GridService, body: serde_json::Value) -> Reply {
    let body = serde_json::to_vec(&body).unwrap_or_default();
    service.process_body(&body, Some("corr-1".to_string())).await
}

#[tokio::test]
async fn test_heartbeat_and_init_need_no_token() {
    let (mut service, _mock, _tokens) = service();
    for command in ["heartbeat", "init"] {
        let reply = send(&mut service, json!({"command": command, "requestUuid": "r-1"})).await;
        assert_eq!(reply.status, Status::Success);
        assert_eq!(reply.request_uuid.as_deref(), Some("r-1"));
        assert_eq!(reply.correlation_id.as_deref(), Some("corr-1"));
    }
}

#[tokio::test]
async fn test_unknown_command_fails() {
    let (mut service, _mock, _tokens) = service();
    let reply = send(&mut service, json!({"command": "drop"})).await;
    assert_eq!(reply.status, Status::Failed);
    assert_eq!(reply.message.as_deref(), Some("Unknown command"));
}

#[tokio::test]
async fn test_undecodable_body_is_an_error() {
    let (mut service, _mock, _tokens) = service();
    let reply = service.process_body(b"{not json", None).await;
    assert_eq!(reply.status, Status::Error);
    assert!(reply
        .message
        .as_deref()
        .is_some_and(|m| m.starts_with("invalid request: ")));
}

#[tokio::test]
async fn test_authentication_issues_token() {
    let (mut service, _mock, tokens) = service();
    let reply = send(
        &mut service,
        json!({"command": "authentication", "loginId": "ann", "passwordHash": "correct horse"}),
    )
    .await;

    assert_eq!(reply.status, Status::Success);
    assert_eq!(reply.message.as_deref(), Some("Authentication successful"));
    assert_eq!(reply.user_uuid, Some(ANN));
    assert_eq!(reply.first_name.as_deref(), Some("Ann"));
    assert_eq!(reply.last_name.as_deref(), Some("Smith"));

    let principal = tokens.validate(reply.jwt.as_deref());
    assert_eq!(principal.map(|p| p.user_uuid), Ok(Some(ANN)));
}

#[tokio::test]
async fn test_authentication_rejects_bad_password() {
    let (mut service, _mock, _tokens) = service();
    let reply = send(
        &mut service,
        json!({"command": "authentication", "loginId": "ann", "passwordHash": "wrong"}),
    )
    .await;
    assert_eq!(reply.status, Status::Failed);
    assert_eq!(reply.message.as_deref(), Some("Invalid username or passphrase"));
    assert_eq!(reply.login_id.as_deref(), Some("ann"));
    assert!(reply.jwt.is_none());
}

#[tokio::test]
async fn test_invalid_tokens_have_no_side_effects() {
    let (mut service, mock, _tokens) = service();
    let expired = valid_jwt(&tokens(NOW - 7200));
    let change = |jwt: Option<&str>| {
        json!({
            "command": "change",
            "jwt": jwt,
            "changes": [{"changeType": "add", "gridUuid": users::GRID, "rowUuid": Uuid::from_u128(1)}]
        })
    };

    let cases = [
        (change(None), "No JWT provided"),
        (change(Some(&expired)), "Token expired"),
        (change(Some("garbage")), "Invalid JWT"),
    ];
    for (request, expected) in cases {
        let reply = send(&mut service, request).await;
        assert_eq!(reply.status, Status::Failed);
        assert!(
            reply.message.as_deref().is_some_and(|m| m.starts_with(expected)),
            "unexpected message {:?}",
            reply.message
        );
    }

    let load = send(&mut service, json!({"command": "load", "gridUuid": users::GRID})).await;
    assert_eq!(load.status, Status::Failed);

    assert_eq!(service.engine().cache().grid_count(), 0);
    assert!(mock.executed().is_empty());
}

#[tokio::test]
async fn test_load_reply() {
    let (mut service, _mock, tokens) = service();
    let jwt = valid_jwt(&tokens);

    let reply = send(
        &mut service,
        json!({"command": "load", "jwt": jwt, "gridUuid": users::GRID}),
    )
    .await;
    assert_eq!(reply.status, Status::Success);
    assert_eq!(reply.message.as_deref(), Some("'Users' loaded"));
    let data_set = reply.data_set.as_ref();
    assert_eq!(data_set.map(|d| d.count_rows), Some(2));
    assert_eq!(data_set.map(|d| d.grid.columns.len()), Some(3));

    let reply = send(
        &mut service,
        json!({"command": "load", "jwt": jwt, "gridUuid": users::GRID, "rowUuid": users::CAROL}),
    )
    .await;
    let data_set = reply.data_set.as_ref();
    assert_eq!(data_set.and_then(|d| d.row_uuid), Some(users::CAROL));
    assert_eq!(data_set.map(|d| d.rows.len()), Some(1));
    assert_eq!(
        data_set.map(|d| d.rows[0].display_string.clone()),
        Some("Carol".to_string())
    );
}

#[tokio::test]
async fn test_load_reply_wire_format() -> Result<(), serde_json::Error> {
    let (mut service, _mock, tokens) = service();
    let jwt = valid_jwt(&tokens);
    let reply = send(
        &mut service,
        json!({"command": "load", "jwt": jwt, "gridUuid": users::GRID, "rowUuid": users::CAROL}),
    )
    .await;

    let value = serde_json::to_value(&reply)?;
    assert_eq!(value["status"], "success");
    assert_eq!(value["dataSet"]["countRows"], 1);
    assert_eq!(value["dataSet"]["gridUuid"], json!(users::GRID));
    assert_eq!(
        value["dataSet"]["rows"][0]["values"],
        json!(["Carol", 38, [{"uuid": users::BOB, "displayString": "Bob"}]])
    );
    Ok(())
}

#[tokio::test]
async fn test_storage_failure_is_a_failed_reply() {
    let (mut service, mock, tokens) = service();
    let jwt = valid_jwt(&tokens);
    mock.fail_with(
        QueryKind::LoadRows,
        users::GRID,
        StorageError::QueryFailed {
            reason: "relation \"ints\" does not exist".to_string(),
        },
    );

    let reply = send(
        &mut service,
        json!({"command": "load", "jwt": jwt, "gridUuid": users::GRID}),
    )
    .await;
    assert_eq!(reply.status, Status::Failed);
    assert!(
        reply
            .message
            .as_deref()
            .is_some_and(|m| m.contains("relation \"ints\" does not exist")),
        "unexpected message {:?}",
        reply.message
    );
    assert!(reply.data_set.is_none());

    let reply = send(&mut service, json!({"command": "heartbeat"})).await;
    assert_eq!(reply.status, Status::Success);
}

#[tokio::test]
async fn test_change_scenario_through_service() {
    let (mut service, _mock, tokens) = service();
    let jwt = valid_jwt(&tokens);
    let r1 = Uuid::from_u128(0xa1);

    let reply = send(
        &mut service,
        json!({
            "command": "change",
            "jwt": jwt,
            "changes": [
                {"changeType": "add", "gridUuid": users::GRID, "rowUuid": r1},
                {"changeType": "update", "gridUuid": users::GRID, "columnUuid": users::FIRST_NAME, "rowUuid": r1, "changeValue": "Ann"},
                {"changeType": "addRelationship", "gridUuid": users::GRID, "columnUuid": users::MANAGER, "rowUuid": r1,
                 "changeValue": {"uuid": users::BOB.to_string(), "values": ["Bob"]}}
            ]
        }),
    )
    .await;
    assert_eq!(reply.status, Status::Success);
    assert_eq!(reply.user_uuid, Some(ANN));
    assert_eq!(reply.user.as_deref(), Some("ann"));

    let reply = send(
        &mut service,
        json!({
            "command": "change",
            "jwt": jwt,
            "changes": [{"changeType": "load", "gridUuid": users::GRID}]
        }),
    )
    .await;
    let rows = reply.data_set.map(|d| d.rows).unwrap_or_default();
    let added = rows.iter().find(|row| row.uuid == r1);
    assert_eq!(added.map(|row| row.display_string.as_str()), Some("Ann"));
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_change_validation_failure() {
    let (mut service, _mock, tokens) = service();
    let jwt = valid_jwt(&tokens);
    let reply = send(
        &mut service,
        json!({
            "command": "change",
            "jwt": jwt,
            "changes": [{"changeType": "update", "gridUuid": users::GRID, "columnUuid": users::MANAGER, "rowUuid": users::BOB, "changeValue": "x"}]
        }),
    )
    .await;
    assert_eq!(reply.status, Status::Failed);
    assert!(reply
        .message
        .as_deref()
        .is_some_and(|m| m.contains("reference column")));
}

#[tokio::test]
async fn test_locate_and_prompt() {
    let (mut service, _mock, tokens) = service();
    let jwt = valid_jwt(&tokens);

    let reply = send(
        &mut service,
        json!({"command": "locate", "jwt": jwt, "gridUuid": users::GRID, "rowUuid": users::BOB}),
    )
    .await;
    assert_eq!(reply.status, Status::Success);
    assert_eq!(reply.grid_uuid, Some(users::GRID));
    assert_eq!(reply.row_uuid, Some(users::BOB));
    assert_eq!(reply.user_uuid, Some(ANN));

    let reply = send(&mut service, json!({"command": "prompt", "jwt": jwt})).await;
    assert_eq!(reply.status, Status::Failed);
    assert_eq!(reply.message.as_deref(), Some("Not implemented"));
}
