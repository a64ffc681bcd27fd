//! Outgoing call lifecycle driven through the facade and a scripted engine

mod common;

use std::sync::Arc;

use common::{Recorded, RecordingDelegate, access_token, expired_token, sdk};
use uuid::Uuid;
use voxlink_client_core::{
    CallDirection, CallState, ClientError, ConnectOptions, DelegateQueue, ErrorCode, FeedbackIssue,
    FeedbackScore, ReconnectCause, StatsReport, VoiceError,
};

#[tokio::test]
async fn test_outgoing_call_happy_path() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();

    let call = sdk.connect(&access_token("alice"), delegate.clone());
    assert_eq!(call.state(), CallState::Connecting);
    assert_eq!(call.direction(), CallDirection::Outgoing);
    assert_eq!(call.from(), Some("alice"));

    {
        let outgoing = engine.outgoing.lock();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].call_id, call.uuid());
        assert_eq!(outgoing[0].access_token.identity, "alice");
        assert_eq!(outgoing[0].context.edge, "roaming");
    }

    let signals = engine.signals_for(&call);
    signals.sid_assigned("CA1234");
    signals.ringing();
    signals.connected();
    call.delegate_queue().flush().await;

    assert_eq!(call.sid().as_deref(), Some("CA1234"));
    assert_eq!(call.state(), CallState::Connected);
    assert_eq!(delegate.events(), vec![Recorded::Ringing, Recorded::Connected]);

    call.disconnect();
    call.disconnect();
    call.delegate_queue().flush().await;

    assert_eq!(call.state(), CallState::Disconnected);
    assert_eq!(
        delegate.events(),
        vec![Recorded::Ringing, Recorded::Connected, Recorded::Disconnected(None)]
    );
    assert_eq!(engine.hangups.lock().as_slice(), &[call.uuid()]);
    assert_eq!(
        call.state_history(),
        vec![
            CallState::Connecting,
            CallState::Ringing,
            CallState::Connected,
            CallState::Disconnected
        ]
    );
    assert!(call.duration_secs().is_some());
}

#[tokio::test]
async fn test_invalid_token_fails_without_engine() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();

    let call = sdk.connect(&expired_token("alice"), delegate.clone());
    call.delegate_queue().flush().await;

    assert_eq!(call.state(), CallState::Disconnected);
    assert_eq!(delegate.events(), vec![Recorded::FailedToConnect(20104)]);
    assert!(engine.outgoing.lock().is_empty());

    let call = sdk.connect("not-a-token", delegate.clone());
    call.delegate_queue().flush().await;
    assert_eq!(
        delegate.events().last(),
        Some(&Recorded::FailedToConnect(20101))
    );
    assert_eq!(call.state(), CallState::Disconnected);
}

#[tokio::test]
async fn test_engine_start_failure_fails_call() {
    let (sdk, engine) = sdk();
    *engine.fail_start.lock() = Some(VoiceError::new(ErrorCode::ConnectionError));
    let delegate = RecordingDelegate::new();

    let call = sdk.connect(&access_token("alice"), delegate.clone());
    call.delegate_queue().flush().await;

    assert_eq!(call.state(), CallState::Disconnected);
    assert_eq!(delegate.events(), vec![Recorded::FailedToConnect(31005)]);
}

#[tokio::test]
async fn test_reconnect_excursion() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let call = sdk.connect(&access_token("alice"), delegate.clone());
    let signals = engine.signals_for(&call);

    signals.connected();
    signals.reconnecting(ReconnectCause::Media);
    signals.reconnecting(ReconnectCause::Signaling);
    call.delegate_queue().flush().await;

    assert_eq!(call.state(), CallState::Reconnecting);
    assert!(!call.set_muted(true));
    assert!(!call.set_on_hold(true));
    assert!(!call.send_digits("1").unwrap());

    signals.reconnected();
    signals.disconnected(Some(VoiceError::new(ErrorCode::SignalingConnectionDisconnected)));
    call.delegate_queue().flush().await;

    assert_eq!(
        delegate.events(),
        vec![
            Recorded::Connected,
            Recorded::Reconnecting(53405),
            Recorded::Reconnected,
            Recorded::Disconnected(Some(53001)),
        ]
    );
    assert!(engine.mute_requests.lock().is_empty());
    assert!(engine.digits.lock().is_empty());
}

#[tokio::test]
async fn test_disruption_before_connect_fails_call() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let call = sdk.connect(&access_token("alice"), delegate.clone());
    let signals = engine.signals_for(&call);

    signals.ringing();
    signals.reconnecting(ReconnectCause::Signaling);
    signals.connected();
    call.delegate_queue().flush().await;

    assert_eq!(call.state(), CallState::Disconnected);
    assert_eq!(
        delegate.events(),
        vec![Recorded::Ringing, Recorded::FailedToConnect(53001)]
    );
}

#[tokio::test]
async fn test_connect_failure_after_connect_is_a_disconnect() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let call = sdk.connect(&access_token("alice"), delegate.clone());
    let signals = engine.signals_for(&call);

    signals.connected();
    signals.connect_failed(VoiceError::new(ErrorCode::ConnectionError));
    call.delegate_queue().flush().await;

    assert_eq!(
        delegate.events(),
        vec![Recorded::Connected, Recorded::Disconnected(Some(31005))]
    );
}

#[tokio::test]
async fn test_local_disconnect_before_connect() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let call = sdk.connect(&access_token("alice"), delegate.clone());
    let signals = engine.signals_for(&call);

    call.disconnect();
    signals.connected();
    signals.disconnected(None);
    call.delegate_queue().flush().await;

    assert_eq!(call.state(), CallState::Disconnected);
    assert_eq!(delegate.events(), vec![Recorded::Disconnected(None)]);
    assert_eq!(call.duration_secs(), None);
}

#[tokio::test]
async fn test_media_controls_only_apply_when_connected() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let call = sdk.connect(&access_token("alice"), delegate.clone());

    assert!(!call.set_muted(true));
    assert!(!call.is_muted());
    assert!(!call.send_digits("123").unwrap());

    engine.signals_for(&call).connected();

    assert!(call.set_muted(true));
    assert!(call.set_muted(true));
    assert!(call.is_muted());
    assert!(call.set_on_hold(true));
    assert!(call.is_on_hold());
    assert!(call.send_digits("12#w*3").unwrap());
    assert!(!call.send_digits("").unwrap());
    assert!(matches!(
        call.send_digits("12a"),
        Err(ClientError::InvalidDigits { invalid: 'a', .. })
    ));

    assert_eq!(engine.mute_requests.lock().as_slice(), &[(call.uuid(), true)]);
    assert_eq!(engine.hold_requests.lock().as_slice(), &[(call.uuid(), true)]);
    assert_eq!(
        engine.digits.lock().as_slice(),
        &[(call.uuid(), "12#w*3".to_string())]
    );

    call.disconnect();
    assert!(!call.set_muted(false));
    assert!(call.is_muted());
}

#[tokio::test]
async fn test_callbacks_run_on_chosen_queue() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let queue = DelegateQueue::new("ui");
    let uuid = Uuid::new_v4();

    let options = ConnectOptions::builder(access_token("alice"))
        .param("To", "client:bob")
        .with_call_options(|b| b.delegate_queue(queue.clone()).uuid(uuid))
        .build()
        .unwrap();
    let call = sdk.connect_with_options(options, delegate.clone());

    assert_eq!(call.uuid(), uuid);
    assert_eq!(call.to(), "client:bob");
    assert!(call.delegate_queue().same_queue(&queue));
    assert_eq!(
        engine.outgoing.lock()[0].params.get("To").map(String::as_str),
        Some("client:bob")
    );

    let signals = engine.signals_for(&call);
    signals.ringing();
    signals.connected();
    call.disconnect();
    queue.flush().await;

    assert_eq!(delegate.events().len(), 3);
    assert!(delegate.threads.lock().iter().all(|t| t == "voxlink-ui"));
}

#[tokio::test]
async fn test_remote_hangup_reaches_delegate_after_handle_dropped() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let queue = DelegateQueue::new("unheld");
    let options = ConnectOptions::builder(access_token("alice"))
        .with_call_options(|b| b.delegate_queue(queue.clone()))
        .build()
        .unwrap();

    let call = sdk.connect_with_options(options, delegate.clone());
    let signals = engine.signals_for(&call);
    signals.connected();
    drop(call);
    queue.flush().await;

    signals.disconnected(None);
    queue.flush().await;

    assert_eq!(
        delegate.events(),
        vec![Recorded::Connected, Recorded::Disconnected(None)]
    );
    assert!(engine.hangups.lock().is_empty());
}

#[tokio::test]
async fn test_signals_after_disconnect_are_discarded() {
    let (sdk, engine) = sdk();
    let delegate = RecordingDelegate::new();
    let call = sdk.connect(&access_token("alice"), delegate.clone());
    let signals = engine.signals_for(&call);
    assert!(signals.call().is_some());

    signals.connected();
    call.disconnect();
    assert!(signals.call().is_none());

    signals.reconnecting(ReconnectCause::Media);
    signals.disconnected(None);
    call.delegate_queue().flush().await;

    assert_eq!(
        delegate.events(),
        vec![Recorded::Connected, Recorded::Disconnected(None)]
    );
    assert_eq!(call.state(), CallState::Disconnected);
}

#[tokio::test]
async fn test_stats_and_feedback() {
    let (sdk, engine) = sdk();
    engine.stats.lock().push(StatsReport::new("pc-1"));
    let call = sdk.connect(&access_token("alice"), RecordingDelegate::new());

    let reports = call.stats().await.unwrap();
    assert_eq!(reports[0].peer_connection_id, "pc-1");

    let (tx, rx) = tokio::sync::oneshot::channel();
    call.get_stats(move |result| {
        let _ = tx.send(result);
    });
    let reports = rx.await.unwrap().unwrap();
    assert_eq!(reports.len(), 1);

    call.disconnect();
    call.post_feedback(FeedbackScore::FourPoints, FeedbackIssue::Echo);
    assert_eq!(
        engine.feedback.lock().as_slice(),
        &[(call.uuid(), FeedbackScore::FourPoints, FeedbackIssue::Echo)]
    );
}

#[tokio::test]
async fn test_configuration_locks_after_first_call() {
    let (sdk, _engine) = sdk();
    sdk.set_edge("dublin").unwrap();
    sdk.set_insights(false).unwrap();
    assert!(!sdk.is_config_locked());

    let delegate: Arc<RecordingDelegate> = RecordingDelegate::new();
    let _call = sdk.connect(&access_token("alice"), delegate);

    assert!(sdk.is_config_locked());
    assert!(matches!(sdk.set_edge("tokyo"), Err(ClientError::ConfigLocked { .. })));
    assert!(matches!(sdk.set_insights(true), Err(ClientError::ConfigLocked { .. })));
    assert_eq!(sdk.edge(), "dublin");
    assert!(!sdk.is_insights_enabled());
}
