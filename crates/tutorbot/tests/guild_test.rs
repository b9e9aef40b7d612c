//! Guild directory queries and role refresh on ready.

mod common;

use std::sync::Arc;

use tempfile::TempDir;
use tutorbot::config::AccessRole;
use tutorbot::error::EngineError;
use tutorbot::store::FileRecordStore;
use tutorbot_gateway_protocol::{GatewayEvent, RoleId, UserId};

use common::{MockTransport, OPERATOR, admin, engine, member, roles, visitor};

fn ready() -> GatewayEvent {
    GatewayEvent::Ready {
        bot_user_id: UserId(1000),
    }
}

#[tokio::test]
async fn ready_replaces_configured_roles_with_guild_roles() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.add_member(member(7, "eve", Some("Eve")));
    transport.add_guild_role(31, "Admin");
    transport.add_guild_role(33, "Mentor");
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));
    assert_eq!(engine.known_roles(), roles().as_slice());

    engine.handle_event(ready()).await;

    assert_eq!(engine.bot_user(), Some(UserId(1000)));
    assert_eq!(
        engine.known_roles(),
        [
            AccessRole {
                id: 31,
                name: "Admin".to_string()
            },
            AccessRole {
                id: 33,
                name: "Mentor".to_string()
            },
        ]
    );

    let reply = engine
        .give_role(&admin(), UserId(7), RoleId(33))
        .await
        .unwrap();
    assert_eq!(reply, "Successfully gave Mentor to Eve.");
    assert!(transport.direct_texts(OPERATOR).contains(&reply));
}

#[tokio::test]
async fn empty_guild_keeps_configured_roles() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    let (mut engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    engine.handle_event(ready()).await;

    assert_eq!(engine.known_roles(), roles().as_slice());
}

#[tokio::test]
async fn directory_queries_need_privilege() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new();
    transport.add_guild_role(31, "Admin");
    let (engine, _timers) = engine(&transport, Arc::new(FileRecordStore::new(tmp.path())));

    assert_eq!(engine.roles(&admin()).await.unwrap().len(), 1);
    assert!(matches!(
        engine.roles(&visitor()).await,
        Err(EngineError::PermissionDenied)
    ));
    assert!(matches!(
        engine.members(&visitor()).await,
        Err(EngineError::PermissionDenied)
    ));
}
