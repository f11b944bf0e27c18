//! Session lifecycle integration tests.
//!
//! These drive a [`SessionManager`] and the [`Broadcaster`] against the
//! in-memory collaborators in `common`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use session_broadcast::friends::{FriendAccount, FriendOutcome};
use session_broadcast::ping::{FallbackProbe, RakNetProbe};
use session_broadcast::session::{RefreshOutcome, RefreshPolicy};
use tokio_test::{assert_err, assert_ok};

use session_broadcast::{
    BroadcastError, Broadcaster, CycleOutcome, ManagerState, ProbeResult, ScheduleHandle,
    StaticSessionInfo, UpdateOutcome,
};

fn probing(config_fallback: bool) -> session_broadcast::ManagerConfig {
    let mut config = quick_config();
    config.refresh = RefreshPolicy {
        query_server: true,
        config_fallback,
    };
    config.probe_timeout = Duration::from_millis(100);
    config
}

fn my_server() -> StaticSessionInfo {
    StaticSessionInfo {
        host_name: "My Server".to_string(),
        world_name: "Spawn".to_string(),
        players: 0,
        max_players: 20,
        ..StaticSessionInfo::default()
    }
}

// ============================================================================
// Init Tests
// ============================================================================

#[tokio::test]
async fn test_init_becomes_active() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());

    assert_ok!(manager.init(fixture.descriptor(), false).await);

    assert_eq!(manager.state(), ManagerState::Active);
    assert!(manager.session_id().is_some());
    assert_eq!(manager.display_name(), Some(GAMERTAG));
    assert_eq!(fixture.directory.creates(), 1);

    let descriptor = manager.descriptor().unwrap();
    assert_eq!(descriptor.xuid, XUID);
    assert!(!descriptor.connection_id.is_empty());
}

#[tokio::test]
async fn test_init_create_document_carries_identity() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    let request = fixture.directory.last_create().unwrap();
    let custom = &request.properties.custom;
    assert_eq!(custom.owner_id, XUID);
    assert_eq!(custom.member_count, 2);
    assert_eq!(custom.max_member_count, 10);
    assert_eq!(custom.supported_connections.len(), 1);
}

#[tokio::test]
async fn test_init_auth_failure_is_creation_error() {
    let fixture = Fixture::new();
    fixture.authenticator.fail(true);
    let mut manager = fixture.manager(quick_config());

    let err = manager.init(fixture.descriptor(), false).await.unwrap_err();

    assert!(matches!(err, BroadcastError::Creation(_)));
    assert_eq!(manager.state(), ManagerState::Uninitialized);
    assert_eq!(fixture.directory.creates(), 0);
}

#[tokio::test]
async fn test_init_retries_create() {
    let fixture = Fixture::new();
    fixture.directory.fail_creates(2);
    let mut manager = fixture.manager(quick_config());

    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(fixture.directory.creates(), 3);
    assert_eq!(manager.state(), ManagerState::Active);
}

#[tokio::test]
async fn test_init_gives_up_after_allowance() {
    let fixture = Fixture::new();
    fixture.directory.fail_creates(10);
    let mut manager = fixture.manager(quick_config());

    let err = manager.init(fixture.descriptor(), false).await.unwrap_err();

    assert!(matches!(err, BroadcastError::Creation(_)));
    assert_eq!(fixture.directory.creates(), 3);
    assert_ne!(manager.state(), ManagerState::Active);
}

#[tokio::test]
async fn test_init_twice_rejected() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    let err = assert_err!(manager.init(fixture.descriptor(), false).await);

    assert!(matches!(err, BroadcastError::InvalidStateTransition { .. }));
    assert_eq!(fixture.directory.creates(), 1);
}

// ============================================================================
// Refresh Tests
// ============================================================================

#[tokio::test]
async fn test_probe_disabled_fills_host_from_display_name() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(manager.update_cycle().await, CycleOutcome::Updated);

    let descriptor = manager.descriptor().unwrap();
    assert_eq!(descriptor.host_name, "Steve");
    assert_eq!(descriptor.world_name, "Survival World");
    assert_eq!(descriptor.players, 2);
    assert_eq!(descriptor.max_players, 10);
    assert_eq!(fixture.probe.calls(), 0);
}

#[tokio::test]
async fn test_probe_success_applies_live_values() {
    let fixture = Fixture::new();
    fixture.probe.answer(Some(ProbeResult {
        host_name: "Live Host".to_string(),
        world_name: "Live World".to_string(),
        players: 7,
        max_players: 30,
    }));
    let mut manager = fixture.manager(probing(false));
    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(manager.refresh_info().await, RefreshOutcome::Live);

    let descriptor = manager.descriptor().unwrap();
    assert_eq!(descriptor.host_name, "Live Host");
    assert_eq!(descriptor.world_name, "Live World");
    assert_eq!(descriptor.players, 7);
    assert_eq!(descriptor.max_players, 30);
}

#[tokio::test]
async fn test_probe_failure_with_fallback_uses_static_values() {
    let fixture = Fixture::new();
    let mut config = probing(true);
    config.static_info = my_server();
    let mut manager = fixture.manager(config);
    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(manager.refresh_info().await, RefreshOutcome::Fallback);

    let descriptor = manager.descriptor().unwrap();
    assert_eq!(descriptor.host_name, "My Server");
    assert_eq!(descriptor.world_name, "Spawn");
    assert_eq!(descriptor.players, 0);
    assert_eq!(descriptor.max_players, 20);
}

#[tokio::test]
async fn test_probe_failure_without_fallback_leaves_descriptor() {
    let fixture = Fixture::new();
    let mut config = probing(false);
    config.static_info = my_server();
    let mut manager = fixture.manager(config);
    manager.init(fixture.descriptor(), false).await.unwrap();
    let before = manager.descriptor().unwrap().clone();

    assert_eq!(manager.refresh_info().await, RefreshOutcome::Unchanged);
    assert_eq!(manager.descriptor().unwrap(), &before);
}

#[tokio::test]
async fn test_unreachable_server_falls_back_within_timeout() {
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();

    let fixture = Fixture::new();
    let mut config = probing(true);
    config.static_info = my_server();
    let mut services = fixture.services();
    services.probe = Arc::new(RakNetProbe::new());
    let mut manager =
        session_broadcast::SessionManager::new(config, services, fixture.restarts.clone());

    let mut descriptor = fixture.descriptor();
    descriptor.port = port;
    manager.init(descriptor, false).await.unwrap();

    let started = std::time::Instant::now();
    assert_eq!(manager.refresh_info().await, RefreshOutcome::Fallback);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.descriptor().unwrap().host_name, "My Server");
}

/// Direct query fails, the status API answers: live values win over the
/// static fallback.
#[tokio::test]
async fn test_status_api_answers_after_direct_query_fails() {
    let fixture = Fixture::new();
    let web = Arc::new(FakeProbe::default());
    web.answer(Some(ProbeResult {
        host_name: "Web Host".to_string(),
        world_name: "Web World".to_string(),
        players: 4,
        max_players: 12,
    }));

    let mut config = probing(true);
    config.static_info = my_server();
    let mut services = fixture.services();
    services.probe = Arc::new(FallbackProbe::new(fixture.probe.clone(), web.clone()));
    let mut manager =
        session_broadcast::SessionManager::new(config, services, fixture.restarts.clone());
    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(manager.refresh_info().await, RefreshOutcome::Live);
    assert_eq!(fixture.probe.calls(), 2);
    assert_eq!(web.calls(), 2);

    let descriptor = manager.descriptor().unwrap();
    assert_eq!(descriptor.world_name, "Web World");
    assert_eq!(descriptor.players, 4);
}

#[tokio::test]
async fn test_status_api_failure_reaches_static_fallback() {
    let fixture = Fixture::new();
    let web = Arc::new(FakeProbe::default());

    let mut config = probing(true);
    config.static_info = my_server();
    let mut services = fixture.services();
    services.probe = Arc::new(FallbackProbe::new(fixture.probe.clone(), web.clone()));
    let mut manager =
        session_broadcast::SessionManager::new(config, services, fixture.restarts.clone());
    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(manager.refresh_info().await, RefreshOutcome::Fallback);
    assert!(web.calls() >= 1);
    assert_eq!(manager.descriptor().unwrap().world_name, "Spawn");
}

#[tokio::test]
async fn test_direct_query_success_skips_status_api() {
    let fixture = Fixture::new();
    fixture.probe.answer(Some(ProbeResult {
        host_name: "Live Host".to_string(),
        world_name: "Live World".to_string(),
        players: 1,
        max_players: 10,
    }));
    let web = Arc::new(FakeProbe::default());

    let mut services = fixture.services();
    services.probe = Arc::new(FallbackProbe::new(fixture.probe.clone(), web.clone()));
    let mut manager =
        session_broadcast::SessionManager::new(probing(false), services, fixture.restarts.clone());
    manager.init(fixture.descriptor(), false).await.unwrap();

    assert_eq!(manager.refresh_info().await, RefreshOutcome::Live);
    assert_eq!(web.calls(), 0);
}

#[tokio::test]
async fn test_update_document_matches_descriptor() {
    let fixture = Fixture::new();
    fixture.probe.answer(Some(ProbeResult {
        host_name: "Live Host".to_string(),
        world_name: "Live World".to_string(),
        players: 4,
        max_players: 12,
    }));
    let mut manager = fixture.manager(probing(false));
    manager.init(fixture.descriptor(), false).await.unwrap();

    manager.update_cycle().await;

    let request = fixture.directory.last_update().unwrap();
    let custom = &request.properties.custom;
    assert_eq!(custom.member_count, 4);
    assert_eq!(custom.max_member_count, 12);
    assert_eq!(custom.host_name, "Live Host");
    assert_eq!(custom.world_name, "Live World");
}

// ============================================================================
// Update Cycle Tests
// ============================================================================

#[tokio::test]
async fn test_update_cycle_before_init_skipped() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());

    assert_eq!(manager.update_cycle().await, CycleOutcome::Skipped);
    assert_eq!(fixture.directory.updates(), 0);
}

#[tokio::test]
async fn test_transient_error_not_escalated() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    fixture
        .directory
        .push_update(UpdateOutcome::TransientError("connection reset".into()));

    let outcome = manager.update_cycle().await;
    assert_eq!(outcome, CycleOutcome::Transient("connection reset".into()));
    assert_eq!(manager.state(), ManagerState::Active);
    assert_eq!(fixture.restarts.count(), 0);
    assert_eq!(fixture.sink.count(), 0);

    // The next tick simply tries again.
    assert_eq!(manager.update_cycle().await, CycleOutcome::Updated);
}

#[tokio::test]
async fn test_session_gone_restarts_once() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();
    let old_id = manager.session_id().unwrap().to_string();

    fixture.directory.push_update(UpdateOutcome::SessionGone);

    assert_eq!(manager.update_cycle().await, CycleOutcome::Restarting);
    assert_eq!(manager.state(), ManagerState::Restarting);
    assert_eq!(manager.session_id(), None);
    assert_eq!(fixture.restarts.count(), 1);
    assert_eq!(fixture.sink.count(), 1);
    assert!(fixture.sink.messages()[0].contains(&old_id));

    // Nothing more is sent for the dead session.
    assert_eq!(manager.update_cycle().await, CycleOutcome::Skipped);
    assert_eq!(manager.update_cycle().await, CycleOutcome::Skipped);
    assert_eq!(fixture.directory.updates(), 1);
    assert_eq!(fixture.restarts.count(), 1);
    assert_eq!(fixture.sink.count(), 1);
}

#[tokio::test]
async fn test_new_manager_after_session_gone_is_active() {
    let fixture = Fixture::new();
    let mut old = fixture.manager(quick_config());
    old.init(fixture.descriptor(), false).await.unwrap();
    let old_id = old.session_id().unwrap().to_string();

    fixture.directory.push_update(UpdateOutcome::SessionGone);
    old.update_cycle().await;
    let descriptor = old.descriptor().unwrap().clone();
    old.shutdown().await;

    let mut fresh = fixture.manager(quick_config());
    fresh.init(descriptor, false).await.unwrap();

    assert_eq!(fresh.state(), ManagerState::Active);
    assert_ne!(fresh.session_id(), Some(old_id.as_str()));
    assert_eq!(fixture.directory.creates(), 2);
    // The old session was gone already; nothing to leave.
    assert_eq!(fixture.directory.leaves(), 0);
}

// ============================================================================
// Friend Sync Tests
// ============================================================================

#[tokio::test]
async fn test_friend_sync_runs_after_update() {
    let fixture = Fixture::new();
    fixture.friends.set("2", FriendOutcome::Restricted);
    fixture.friends.set("3", FriendOutcome::Failed("500".into()));

    let mut config = quick_config();
    config.friend_accounts = vec![
        FriendAccount {
            xuid: "1".to_string(),
            username: "Alex".to_string(),
        },
        FriendAccount {
            xuid: "2".to_string(),
            username: "Sam".to_string(),
        },
        FriendAccount {
            xuid: "3".to_string(),
            username: "Kai".to_string(),
        },
    ];
    let mut manager = fixture.manager(config);
    manager.init(fixture.descriptor(), true).await.unwrap();

    assert_eq!(manager.update_cycle().await, CycleOutcome::Updated);

    assert_eq!(fixture.friends.calls(), 3);
    assert_eq!(fixture.sink.count(), 1);
    assert!(fixture.sink.messages()[0].contains("Sam"));
    assert_eq!(manager.state(), ManagerState::Active);
}

#[tokio::test]
async fn test_friend_sync_disabled() {
    let fixture = Fixture::new();
    let mut config = quick_config();
    config.friend_accounts = vec![FriendAccount {
        xuid: "1".to_string(),
        username: "Alex".to_string(),
    }];
    let mut manager = fixture.manager(config);
    manager.init(fixture.descriptor(), false).await.unwrap();

    manager.update_cycle().await;

    assert_eq!(fixture.friends.calls(), 0);
}

#[tokio::test]
async fn test_friend_sync_skipped_on_failed_update() {
    let fixture = Fixture::new();
    let mut config = quick_config();
    config.friend_accounts = vec![FriendAccount {
        xuid: "1".to_string(),
        username: "Alex".to_string(),
    }];
    let mut manager = fixture.manager(config);
    manager.init(fixture.descriptor(), true).await.unwrap();

    fixture
        .directory
        .push_update(UpdateOutcome::TransientError("timeout".into()));
    manager.update_cycle().await;

    assert_eq!(fixture.friends.calls(), 0);
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_leaves_once() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    manager.shutdown().await;
    manager.shutdown().await;

    assert_eq!(manager.state(), ManagerState::ShutDown);
    assert_eq!(fixture.directory.leaves(), 1);
    assert_eq!(manager.update_cycle().await, CycleOutcome::Skipped);
}

#[tokio::test]
async fn test_shutdown_uninitialized_makes_no_calls() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());

    manager.shutdown().await;

    assert_eq!(manager.state(), ManagerState::ShutDown);
    assert_eq!(fixture.directory.leaves(), 0);
}

// ============================================================================
// Schedule Tests
// ============================================================================

#[tokio::test]
async fn test_schedule_runs_cycles_until_shutdown() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    let mut schedule = ScheduleHandle::spawn(manager, Duration::from_millis(20));
    assert!(schedule.is_running());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let manager = schedule.shutdown().await.unwrap();

    assert!(fixture.directory.updates() >= 2);
    assert_eq!(manager.state(), ManagerState::ShutDown);
    assert_eq!(fixture.directory.leaves(), 1);
    assert!(!schedule.is_running());
    assert!(schedule.shutdown().await.is_none());
}

#[tokio::test]
async fn test_schedule_first_tick_waits_one_period() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    let mut schedule = ScheduleHandle::spawn(manager, Duration::from_secs(60));
    tokio::time::sleep(Duration::from_millis(50)).await;
    schedule.shutdown().await;

    assert_eq!(fixture.directory.updates(), 0);
}

#[tokio::test]
async fn test_schedule_zero_period_is_raised() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager(quick_config());
    manager.init(fixture.descriptor(), false).await.unwrap();

    let mut schedule = ScheduleHandle::spawn(manager, Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let manager = schedule.shutdown().await;

    // A panicked task would hand back no manager.
    let manager = manager.expect("schedule task should survive a zero period");
    assert_eq!(manager.state(), ManagerState::ShutDown);
    assert!(fixture.directory.updates() >= 1);
}

// ============================================================================
// Broadcaster Tests
// ============================================================================

#[tokio::test]
async fn test_broadcaster_restarts_after_session_gone() {
    let fixture = Fixture::new();
    let mut config = quick_config();
    config.static_info = common::survival_world();
    let mut broadcaster = Broadcaster::with_services(config, false, fixture.services());

    broadcaster.start().await.unwrap();
    assert!(broadcaster.is_running());
    assert_eq!(fixture.directory.creates(), 1);

    fixture.directory.push_update(UpdateOutcome::SessionGone);

    let serviced = tokio::time::timeout(Duration::from_secs(2), broadcaster.handle_next_restart())
        .await
        .unwrap();

    assert!(serviced);
    assert_eq!(broadcaster.restarts(), 1);
    assert_eq!(fixture.directory.creates(), 2);
    assert_eq!(fixture.sink.count(), 1);
    assert!(broadcaster.is_running());

    broadcaster.shutdown().await;
    assert!(!broadcaster.is_running());
    assert_eq!(fixture.directory.leaves(), 1);
}

#[tokio::test]
async fn test_broadcaster_start_failure_is_returned() {
    let fixture = Fixture::new();
    fixture.authenticator.fail(true);
    let mut broadcaster = Broadcaster::with_services(quick_config(), false, fixture.services());

    let err = broadcaster.start().await.unwrap_err();

    assert!(matches!(err, BroadcastError::Creation(_)));
    assert!(!broadcaster.is_running());
}

#[tokio::test]
async fn test_broadcaster_recovers_after_failed_restart() {
    let fixture = Fixture::new();
    let mut config = quick_config();
    config.static_info = common::survival_world();
    let mut broadcaster = Broadcaster::with_services(config, false, fixture.services());
    broadcaster.start().await.unwrap();

    fixture.directory.push_update(UpdateOutcome::SessionGone);
    fixture.authenticator.fail(true);

    // Restart fails: nothing running, the operator hears about it once.
    let serviced = tokio::time::timeout(Duration::from_secs(2), broadcaster.handle_next_restart())
        .await
        .unwrap();
    assert!(serviced);
    assert!(!broadcaster.is_running());
    assert_eq!(broadcaster.restarts(), 0);
    assert_eq!(fixture.sink.count(), 2);
    let messages = fixture.sink.messages();
    assert!(messages[1].contains("Failed to recreate the session for Steve"));
    assert!(messages[1].contains("credential rejected"));

    // The retry queued by the failure fails again without a second message.
    tokio::time::timeout(Duration::from_secs(2), broadcaster.handle_next_restart())
        .await
        .unwrap();
    assert!(!broadcaster.is_running());
    assert_eq!(fixture.sink.count(), 2);

    fixture.authenticator.fail(false);
    tokio::time::timeout(Duration::from_secs(2), broadcaster.handle_next_restart())
        .await
        .unwrap();

    assert!(broadcaster.is_running());
    assert_eq!(broadcaster.restarts(), 1);
    assert_eq!(fixture.sink.count(), 2);

    broadcaster.shutdown().await;
}
