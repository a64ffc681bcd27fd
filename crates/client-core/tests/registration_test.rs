//! Push registration through the facade

mod common;

use common::{access_token, sdk};
use voxlink_client_core::registration::RegistrationStatus;
use voxlink_client_core::{ErrorCode, VoiceError};

const DEVICE: &[u8] = &[0x0a, 0x0b, 0xfe];

#[tokio::test]
async fn test_register_and_unregister() {
    let (sdk, engine) = sdk();
    assert!(sdk.registration().is_none());

    sdk.register(&access_token("alice"), DEVICE).await.unwrap();

    let info = sdk.registration().unwrap();
    assert_eq!(info.identity, "alice");
    assert_eq!(info.device_token, "0a0bfe");
    assert_eq!(info.status, RegistrationStatus::Active);
    assert!(info.matches_device(DEVICE));
    {
        let registrations = engine.registrations.lock();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].device_token, DEVICE);
        assert_eq!(registrations[0].access_token.identity, "alice");
    }
    assert!(sdk.is_config_locked());

    sdk.unregister(&access_token("alice"), DEVICE).await.unwrap();
    assert!(sdk.registration().is_none());
    assert_eq!(engine.unregistrations.lock().len(), 1);
}

#[tokio::test]
async fn test_register_validates_locally() {
    let (sdk, engine) = sdk();

    let error = sdk.register(&access_token("alice"), &[]).await.unwrap_err();
    assert_eq!(error.code(), 31301);

    let error = sdk.register("garbage", DEVICE).await.unwrap_err();
    assert_eq!(error.code(), 20101);

    let error = sdk.unregister(&access_token("bad identity!"), DEVICE).await.unwrap_err();
    assert_eq!(error.code(), 20106);

    assert!(engine.registrations.lock().is_empty());
    assert!(engine.unregistrations.lock().is_empty());
}

#[tokio::test]
async fn test_engine_failure_marks_registration_failed() {
    let (sdk, engine) = sdk();
    sdk.register(&access_token("alice"), DEVICE).await.unwrap();

    *engine.fail_registration.lock() = Some(VoiceError::new(ErrorCode::AuthFailure));
    let error = sdk.register(&access_token("alice"), DEVICE).await.unwrap_err();
    assert_eq!(error.code(), 20151);

    let info = sdk.registration().unwrap();
    assert_eq!(info.status, RegistrationStatus::Failed);
    assert_eq!(info.last_error.map(|e| e.code()), Some(20151));
}

#[tokio::test]
async fn test_completion_variants() {
    let (sdk, _engine) = sdk();

    let (tx, rx) = tokio::sync::oneshot::channel();
    sdk.register_with_completion(access_token("alice"), DEVICE, move |error| {
        let _ = tx.send(error);
    });
    assert!(rx.await.unwrap().is_none());
    assert!(sdk.registration().is_some());

    let (tx, rx) = tokio::sync::oneshot::channel();
    sdk.unregister_with_completion(access_token("alice"), Vec::new(), move |error| {
        let _ = tx.send(error);
    });
    assert_eq!(rx.await.unwrap().map(|e| e.code()), Some(31301));
}
