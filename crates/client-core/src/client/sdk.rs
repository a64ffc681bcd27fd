use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxlink_infra_common::{LogLevel, log_welcome, setup_logging};

use super::config::{LogModule, SdkConfig, validate_edge};
use super::options::ConnectOptions;
use super::types::CallDirection;
use crate::call::{Call, NewCall};
use crate::engine::{EngineContext, OutgoingCallRequest, RegistrationRequest, VoiceEngine};
use crate::error::{ClientError, ClientResult, ErrorCode, VoiceError};
use crate::events::{CallDelegate, NotificationDelegate};
use crate::invite::{CallInvite, CancelledCallInvite, NotificationPayload};
use crate::queue::DelegateQueue;
use crate::registration::{RegistrationInfo, RegistrationStatus, validate_device_token};
use crate::token::AccessToken;

/// How long an invite is remembered, from its resolution or, while it is
/// still pending, from its arrival
const INVITE_RETENTION_MINUTES: i64 = 60;

/// Entry point of the voice client
///
/// Owns the process-scoped [`SdkConfig`] and the engine. Cloning is cheap
/// and every clone shares the same state.
///
/// # Initialization Order
///
/// `set_edge` and `set_insights` must be called before the first network
/// operation (`connect`, `register`, `unregister`, `handle_notification`
/// or accepting an invite). Afterwards they fail with
/// [`ClientError::ConfigLocked`]. Log levels must be set before
/// [`init_logging`](VoiceSdk::init_logging).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voxlink_client_core::{CallDelegate, VoiceEngine, VoiceSdk};
///
/// fn place_call(engine: Arc<dyn VoiceEngine>, delegate: Arc<dyn CallDelegate>, token: &str) {
///     let sdk = VoiceSdk::new(engine);
///     sdk.set_edge("dublin").unwrap();
///     let call = sdk.connect(token, delegate);
///     println!("call {} is {}", call.uuid(), call.state());
/// }
/// ```
#[derive(Clone)]
pub struct VoiceSdk {
    shared: Arc<SdkShared>,
}

struct SdkShared {
    engine: Arc<dyn VoiceEngine>,
    config: RwLock<SdkConfig>,
    network_started: AtomicBool,
    invites: DashMap<String, CallInvite>,
    registration: RwLock<Option<RegistrationInfo>>,
}

impl VoiceSdk {
    /// Create a client with default configuration
    pub fn new(engine: Arc<dyn VoiceEngine>) -> Self {
        Self::build(engine, SdkConfig::default())
    }

    /// Create a client with an explicit configuration
    pub fn with_config(engine: Arc<dyn VoiceEngine>, config: SdkConfig) -> ClientResult<Self> {
        config.validate()?;
        Ok(Self::build(engine, config))
    }

    fn build(engine: Arc<dyn VoiceEngine>, config: SdkConfig) -> Self {
        Self {
            shared: Arc::new(SdkShared {
                engine,
                config: RwLock::new(config),
                network_started: AtomicBool::new(false),
                invites: DashMap::new(),
                registration: RwLock::new(None),
            }),
        }
    }

    /// Version of this crate
    pub fn sdk_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SdkConfig {
        self.shared.config.read().clone()
    }

    pub fn edge(&self) -> String {
        self.shared.config.read().edge.clone()
    }

    pub fn set_edge(&self, edge: impl Into<String>) -> ClientResult<()> {
        let edge = edge.into();
        let mut config = self.shared.config.write();
        self.ensure_unlocked("edge")?;
        validate_edge(&edge)?;
        config.edge = edge;
        Ok(())
    }

    pub fn is_insights_enabled(&self) -> bool {
        self.shared.config.read().insights
    }

    pub fn set_insights(&self, enabled: bool) -> ClientResult<()> {
        let mut config = self.shared.config.write();
        self.ensure_unlocked("insights")?;
        config.insights = enabled;
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        self.shared.config.read().log_level
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.shared.config.write().log_level = level;
    }

    pub fn log_level_for(&self, module: LogModule) -> LogLevel {
        self.shared.config.read().log_level_for(module)
    }

    pub fn set_module_log_level(&self, module: LogModule, level: LogLevel) {
        self.shared.config.write().modules.set(module, level);
    }

    /// Install the global tracing subscriber from the configured levels
    pub fn init_logging(&self) -> ClientResult<()> {
        let logging = self.shared.config.read().logging_config();
        setup_logging(&logging)?;
        log_welcome("voxlink", Self::sdk_version());
        Ok(())
    }

    /// Whether a network operation has started and edge/insights are locked
    pub fn is_config_locked(&self) -> bool {
        self.shared.network_started.load(Ordering::SeqCst)
    }

    fn ensure_unlocked(&self, setting: &str) -> ClientResult<()> {
        if self.is_config_locked() {
            return Err(ClientError::config_locked(setting));
        }
        Ok(())
    }

    /// Lock the configuration and capture what the engine needs
    fn begin_network(&self) -> EngineContext {
        let config = self.shared.config.read();
        if !self.shared.network_started.swap(true, Ordering::SeqCst) {
            info!(edge = %config.edge, insights = config.insights, "first network operation, configuration locked");
        }
        EngineContext {
            edge: config.edge.clone(),
            insights: config.insights,
        }
    }

    /// Place a call with default options
    pub fn connect(&self, access_token: &str, delegate: Arc<dyn CallDelegate>) -> Call {
        self.connect_with_options(ConnectOptions::new(access_token), delegate)
    }

    /// Place a call
    ///
    /// Always returns a call in `Connecting`. A token that fails local
    /// validation ends it through `call_did_fail_to_connect` without
    /// contacting the engine.
    pub fn connect_with_options(&self, options: ConnectOptions, delegate: Arc<dyn CallDelegate>) -> Call {
        let context = self.begin_network();
        let call_options = options.call_options().clone();
        let uuid = call_options.uuid().unwrap_or_else(Uuid::new_v4);
        let token = AccessToken::parse(options.access_token());

        let call = Call::new(NewCall {
            uuid,
            from: token.as_ref().ok().map(|t| t.identity.clone()),
            to: options.params().get("To").cloned().unwrap_or_default(),
            sid: None,
            direction: CallDirection::Outgoing,
            options: call_options.clone(),
            delegate,
            engine: self.shared.engine.clone(),
        });

        match token {
            Ok(access_token) => {
                info!(call = %uuid, identity = %access_token.identity, "connecting");
                let request = OutgoingCallRequest {
                    call_id: uuid,
                    access_token,
                    params: options.params().clone(),
                    options: call_options,
                    context,
                };
                if let Err(error) = self.shared.engine.start_call(request, call.signals()) {
                    call.fail(error);
                }
            }
            Err(error) => call.fail(error),
        }
        call
    }

    /// Bind this device for incoming call pushes
    pub async fn register(&self, access_token: &str, device_token: &[u8]) -> Result<(), VoiceError> {
        let context = self.begin_network();
        let token = AccessToken::parse(access_token)?;
        validate_device_token(device_token)?;
        self.set_registration_status(RegistrationStatus::Pending, None);

        let identity = token.identity.clone();
        let request = RegistrationRequest {
            access_token: token,
            device_token: device_token.to_vec(),
            context,
        };
        match self.shared.engine.register(request).await {
            Ok(()) => {
                info!(%identity, "registered for incoming calls");
                *self.shared.registration.write() =
                    Some(RegistrationInfo::new(identity, device_token, Utc::now()));
                Ok(())
            }
            Err(error) => {
                warn!(%identity, error = %error, "registration failed");
                self.set_registration_status(RegistrationStatus::Failed, Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Remove this device's push binding
    pub async fn unregister(&self, access_token: &str, device_token: &[u8]) -> Result<(), VoiceError> {
        let context = self.begin_network();
        let token = AccessToken::parse(access_token)?;
        validate_device_token(device_token)?;

        let identity = token.identity.clone();
        let request = RegistrationRequest {
            access_token: token,
            device_token: device_token.to_vec(),
            context,
        };
        match self.shared.engine.unregister(request).await {
            Ok(()) => {
                info!(%identity, "unregistered from incoming calls");
                *self.shared.registration.write() = None;
                Ok(())
            }
            Err(error) => {
                warn!(%identity, error = %error, "unregistration failed");
                self.set_registration_status(RegistrationStatus::Failed, Some(error.clone()));
                Err(error)
            }
        }
    }

    /// [`register`](Self::register) with a completion callback
    ///
    /// The completion runs on a tokio task when called inside a runtime,
    /// otherwise on the main delegate queue.
    pub fn register_with_completion<F>(&self, access_token: impl Into<String>, device_token: impl Into<Vec<u8>>, completion: F)
    where
        F: FnOnce(Option<VoiceError>) + Send + 'static,
    {
        let sdk = self.clone();
        let access_token = access_token.into();
        let device_token = device_token.into();
        spawn_detached(async move {
            completion(sdk.register(&access_token, &device_token).await.err());
        });
    }

    /// [`unregister`](Self::unregister) with a completion callback
    pub fn unregister_with_completion<F>(&self, access_token: impl Into<String>, device_token: impl Into<Vec<u8>>, completion: F)
    where
        F: FnOnce(Option<VoiceError>) + Send + 'static,
    {
        let sdk = self.clone();
        let access_token = access_token.into();
        let device_token = device_token.into();
        spawn_detached(async move {
            completion(sdk.unregister(&access_token, &device_token).await.err());
        });
    }

    /// Current push binding, if registered
    pub fn registration(&self) -> Option<RegistrationInfo> {
        self.shared.registration.read().clone()
    }

    fn set_registration_status(&self, status: RegistrationStatus, error: Option<VoiceError>) {
        if let Some(info) = self.shared.registration.write().as_mut() {
            info.status = status;
            if error.is_some() {
                info.last_error = error;
            }
        }
    }

    /// Process a push notification payload
    ///
    /// Returns whether the payload was a valid call or cancel notification.
    /// Invites are handed to `delegate` synchronously before this returns.
    /// Cancellations run on `delegate_queue` (the main queue when `None`),
    /// and only for invites that were still pending or are unknown here.
    /// A cancel for an unknown sid is remembered as a cancelled invite, so
    /// neither a repeated cancel nor a late call notification for that sid
    /// reaches the delegate.
    pub fn handle_notification(
        &self,
        payload: &Value,
        delegate: Arc<dyn NotificationDelegate>,
        delegate_queue: Option<DelegateQueue>,
    ) -> bool {
        let payload = match NotificationPayload::parse(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "ignoring notification");
                return false;
            }
        };
        let context = self.begin_network();
        self.prune_invites_at(Utc::now());

        match payload {
            NotificationPayload::Call(fields) => {
                let invite = match self.shared.invites.entry(fields.call_sid.clone()) {
                    Entry::Occupied(known) => {
                        debug!(call_sid = %fields.call_sid, status = ?known.get().status(), "call notification for known invite");
                        return true;
                    }
                    Entry::Vacant(slot) => {
                        let invite = CallInvite::new(fields, self.shared.engine.clone(), context);
                        slot.insert(invite.clone());
                        invite
                    }
                };
                info!(call_sid = %invite.call_sid(), from = ?invite.from(), "call invite received");
                delegate.call_invite_received(invite);
            }
            NotificationPayload::Cancel(fields) => {
                let deliver = match self.shared.invites.entry(fields.call_sid.clone()) {
                    Entry::Occupied(known) => known.get().cancel(),
                    Entry::Vacant(slot) => {
                        // Remembered as cancelled so a late call notification is not offered
                        let tombstone = CallInvite::new(fields.clone(), self.shared.engine.clone(), context);
                        tombstone.cancel();
                        slot.insert(tombstone);
                        true
                    }
                };
                if deliver {
                    info!(call_sid = %fields.call_sid, "call invite cancelled");
                    let cancelled = CancelledCallInvite::new(fields);
                    let queue = delegate_queue.unwrap_or_else(DelegateQueue::main);
                    queue.dispatch(async move {
                        delegate.cancelled_call_invite_received(cancelled, VoiceError::new(ErrorCode::CallCancelled));
                    });
                }
            }
        }
        true
    }

    /// Invite known for `call_sid`, pending or recently resolved
    pub fn invite(&self, call_sid: &str) -> Option<CallInvite> {
        self.shared
            .invites
            .get(call_sid)
            .map(|entry| entry.value().clone())
    }

    /// Forget invites resolved, or received and never resolved, more than
    /// an hour before `now`
    ///
    /// Runs on every [`handle_notification`](VoiceSdk::handle_notification).
    pub fn prune_invites_at(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::minutes(INVITE_RETENTION_MINUTES);
        self.shared.invites.retain(|call_sid, invite| {
            let keep = invite.resolved_at().unwrap_or_else(|| invite.received_at()) > cutoff;
            if !keep {
                debug!(%call_sid, status = ?invite.status(), "forgetting invite");
            }
            keep
        });
    }
}

fn spawn_detached<F>(job: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(job);
        }
        Err(_) => DelegateQueue::main().dispatch(job),
    }
}
