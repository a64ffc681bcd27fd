//! Call options and their builders
//!
//! Options are immutable once built. Each builder validates in `build()` and
//! returns a [`ClientResult`], so an invalid ICE server or codec is reported
//! before a call is created rather than through a delegate.
//!
//! # Defaults
//!
//! | Option | Default |
//! |---|---|
//! | delegate queue | [`DelegateQueue::main`] |
//! | ICE servers | none (engine defaults) |
//! | ICE transport policy | [`IceTransportPolicy::All`] |
//! | preferred audio codecs | `[Opus]` |
//! | DSCP marking | enabled |
//! | ICE gathering on any address ports | disabled |
//! | call uuid | random for outgoing calls, the invite's uuid when accepting |
//!
//! # Usage Examples
//!
//! ```rust
//! use voxlink_client_core::{AudioCodec, ConnectOptions, IceServer, IceTransportPolicy};
//!
//! let options = ConnectOptions::builder("eyJhbGciOi.e30.sig")
//!     .param("To", "client:bob")
//!     .with_call_options(|call| {
//!         call.ice_server(IceServer::turn("turn:turn.example.com:3478", "user", "secret"))
//!             .ice_transport_policy(IceTransportPolicy::Relay)
//!             .preferred_audio_codecs(vec![AudioCodec::opus_with_bitrate(24_000), AudioCodec::Pcmu])
//!             .enable_dscp(false)
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(options.params().get("To").map(String::as_str), Some("client:bob"));
//! assert!(!options.call_options().enable_dscp());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::invite::CallInvite;
use crate::queue::DelegateQueue;

/// Lowest Opus average bitrate the encoder accepts, in bits per second
pub const OPUS_MIN_BITRATE: u32 = 6_000;
/// Highest Opus average bitrate the encoder accepts, in bits per second
pub const OPUS_MAX_BITRATE: u32 = 510_000;

/// Which ICE candidates may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IceTransportPolicy {
    /// Host, reflexive and relay candidates
    #[default]
    All,
    /// Only TURN relay candidates
    Relay,
}

/// A STUN or TURN server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn turn(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_turn(&self) -> bool {
        self.url.starts_with("turn:") || self.url.starts_with("turns:")
    }

    /// Scheme must be `stun:`, `stuns:`, `turn:` or `turns:`; TURN needs credentials
    pub fn validate(&self) -> ClientResult<()> {
        let scheme_ok = ["stun:", "stuns:", "turn:", "turns:"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme) && self.url.len() > scheme.len());
        if !scheme_ok {
            return Err(ClientError::invalid_config(
                "ice_servers",
                format!("unsupported ICE server url {:?}", self.url),
            ));
        }
        if self.is_turn() {
            let has = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.is_empty());
            if !has(&self.username) || !has(&self.password) {
                return Err(ClientError::invalid_config(
                    "ice_servers",
                    format!("TURN server {} requires a username and password", self.url),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for IceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceServer")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// ICE configuration for a call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceOptions {
    pub servers: Vec<IceServer>,
    pub transport_policy: IceTransportPolicy,
}

impl IceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server: IceServer) -> Self {
        self.servers.push(server);
        self
    }

    pub fn with_transport_policy(mut self, policy: IceTransportPolicy) -> Self {
        self.transport_policy = policy;
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        self.servers.iter().try_for_each(IceServer::validate)
    }
}

/// Audio codec preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    Opus {
        /// Bits per second, encoder default when `None`
        max_average_bitrate: Option<u32>,
    },
    Pcmu,
}

impl AudioCodec {
    pub fn opus() -> Self {
        AudioCodec::Opus {
            max_average_bitrate: None,
        }
    }

    pub fn opus_with_bitrate(bits_per_second: u32) -> Self {
        AudioCodec::Opus {
            max_average_bitrate: Some(bits_per_second),
        }
    }

    /// SDP encoding name
    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Opus { .. } => "opus",
            AudioCodec::Pcmu => "PCMU",
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if let AudioCodec::Opus {
            max_average_bitrate: Some(bitrate),
        } = self
        {
            if !(OPUS_MIN_BITRATE..=OPUS_MAX_BITRATE).contains(bitrate) {
                return Err(ClientError::invalid_config(
                    "preferred_audio_codecs",
                    format!(
                        "opus bitrate {} outside {}..={}",
                        bitrate, OPUS_MIN_BITRATE, OPUS_MAX_BITRATE
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Settings shared by outgoing and accepted calls
#[derive(Debug, Clone)]
pub struct CallOptions {
    delegate_queue: Option<DelegateQueue>,
    ice_options: Option<IceOptions>,
    preferred_audio_codecs: Vec<AudioCodec>,
    enable_dscp: bool,
    enable_ice_gathering_on_any_address_ports: bool,
    uuid: Option<Uuid>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            delegate_queue: None,
            ice_options: None,
            preferred_audio_codecs: vec![AudioCodec::opus()],
            enable_dscp: true,
            enable_ice_gathering_on_any_address_ports: false,
            uuid: None,
        }
    }
}

impl CallOptions {
    /// Queue that receives the call's delegate callbacks
    pub fn delegate_queue(&self) -> DelegateQueue {
        self.delegate_queue.clone().unwrap_or_else(DelegateQueue::main)
    }

    pub fn ice_options(&self) -> Option<&IceOptions> {
        self.ice_options.as_ref()
    }

    pub fn preferred_audio_codecs(&self) -> &[AudioCodec] {
        &self.preferred_audio_codecs
    }

    pub fn enable_dscp(&self) -> bool {
        self.enable_dscp
    }

    pub fn enable_ice_gathering_on_any_address_ports(&self) -> bool {
        self.enable_ice_gathering_on_any_address_ports
    }

    /// Explicit uuid, if one was set
    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    fn validate(&self) -> ClientResult<()> {
        if self.preferred_audio_codecs.is_empty() {
            return Err(ClientError::invalid_config(
                "preferred_audio_codecs",
                "at least one codec is required",
            ));
        }
        self.preferred_audio_codecs.iter().try_for_each(AudioCodec::validate)?;
        if let Some(ice) = &self.ice_options {
            ice.validate()?;
        }
        Ok(())
    }
}

/// Builder for the [`CallOptions`] part of connect and accept options
#[derive(Debug, Clone, Default)]
pub struct CallOptionsBuilder {
    options: CallOptions,
}

impl CallOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delegate_queue(mut self, queue: DelegateQueue) -> Self {
        self.options.delegate_queue = Some(queue);
        self
    }

    pub fn ice_options(mut self, ice: IceOptions) -> Self {
        self.options.ice_options = Some(ice);
        self
    }

    /// Append one ICE server
    pub fn ice_server(mut self, server: IceServer) -> Self {
        self.options
            .ice_options
            .get_or_insert_with(IceOptions::default)
            .servers
            .push(server);
        self
    }

    pub fn ice_transport_policy(mut self, policy: IceTransportPolicy) -> Self {
        self.options
            .ice_options
            .get_or_insert_with(IceOptions::default)
            .transport_policy = policy;
        self
    }

    /// Codecs in order of preference
    pub fn preferred_audio_codecs(mut self, codecs: Vec<AudioCodec>) -> Self {
        self.options.preferred_audio_codecs = codecs;
        self
    }

    pub fn enable_dscp(mut self, enabled: bool) -> Self {
        self.options.enable_dscp = enabled;
        self
    }

    pub fn enable_ice_gathering_on_any_address_ports(mut self, enabled: bool) -> Self {
        self.options.enable_ice_gathering_on_any_address_ports = enabled;
        self
    }

    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.options.uuid = Some(uuid);
        self
    }

    pub fn build(self) -> ClientResult<CallOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Options for placing an outgoing call
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    access_token: String,
    params: BTreeMap<String, String>,
    call: CallOptions,
}

impl ConnectOptions {
    /// Options with every default and no parameters
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            params: BTreeMap::new(),
            call: CallOptions::default(),
        }
    }

    pub fn builder(access_token: impl Into<String>) -> ConnectOptionsBuilder {
        ConnectOptionsBuilder {
            access_token: access_token.into(),
            params: BTreeMap::new(),
            call: CallOptionsBuilder::new(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Parameters forwarded to the application's voice webhook
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn call_options(&self) -> &CallOptions {
        &self.call
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptionsBuilder {
    access_token: String,
    params: BTreeMap<String, String>,
    call: CallOptionsBuilder,
}

impl ConnectOptionsBuilder {
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Configure the shared call options
    pub fn with_call_options<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CallOptionsBuilder) -> CallOptionsBuilder,
    {
        self.call = f(self.call);
        self
    }

    pub fn build(self) -> ClientResult<ConnectOptions> {
        if self.access_token.trim().is_empty() {
            return Err(ClientError::invalid_config("access_token", "must not be empty"));
        }
        if self.params.keys().any(|k| k.trim().is_empty()) {
            return Err(ClientError::invalid_config("params", "parameter names must not be empty"));
        }
        Ok(ConnectOptions {
            access_token: self.access_token,
            params: self.params,
            call: self.call.build()?,
        })
    }
}

/// Options for accepting an invite
#[derive(Debug, Clone)]
pub struct AcceptOptions {
    call_sid: String,
    uuid: Uuid,
    call: CallOptions,
}

impl AcceptOptions {
    /// Defaults for `invite`, reusing its uuid
    pub fn new(invite: &CallInvite) -> Self {
        Self {
            call_sid: invite.call_sid().to_string(),
            uuid: invite.uuid(),
            call: CallOptions::default(),
        }
    }

    pub fn builder(invite: &CallInvite) -> AcceptOptionsBuilder {
        AcceptOptionsBuilder {
            call_sid: invite.call_sid().to_string(),
            invite_uuid: invite.uuid(),
            call: CallOptionsBuilder::new(),
        }
    }

    /// Sid of the invite these options were built for
    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    /// Uuid the accepted call will carry
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn call_options(&self) -> &CallOptions {
        &self.call
    }
}

#[derive(Debug, Clone)]
pub struct AcceptOptionsBuilder {
    call_sid: String,
    invite_uuid: Uuid,
    call: CallOptionsBuilder,
}

impl AcceptOptionsBuilder {
    /// Configure the shared call options
    pub fn with_call_options<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CallOptionsBuilder) -> CallOptionsBuilder,
    {
        self.call = f(self.call);
        self
    }

    pub fn build(self) -> ClientResult<AcceptOptions> {
        let call = self.call.build()?;
        Ok(AcceptOptions {
            call_sid: self.call_sid,
            uuid: call.uuid().unwrap_or(self.invite_uuid),
            call,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_option_defaults() {
        let options = CallOptions::default();
        assert_eq!(options.preferred_audio_codecs(), &[AudioCodec::opus()]);
        assert!(options.enable_dscp());
        assert!(!options.enable_ice_gathering_on_any_address_ports());
        assert!(options.ice_options().is_none());
        assert!(options.uuid().is_none());
        assert!(options.delegate_queue().same_queue(&DelegateQueue::main()));
    }

    #[test]
    fn test_ice_server_validation() {
        assert!(IceServer::stun("stun:global.stun.example.com:3478").validate().is_ok());
        assert!(IceServer::turn("turns:relay.example.com:443", "u", "p").validate().is_ok());
        assert!(IceServer::stun("turn:relay.example.com").validate().is_err());
        assert!(IceServer::stun("http://stun.example.com").validate().is_err());
        assert!(IceServer::stun("stun:").validate().is_err());
        assert!(IceServer::turn("turn:relay.example.com", "u", "").validate().is_err());
    }

    #[test]
    fn test_ice_server_debug_hides_password() {
        let rendered = format!("{:?}", IceServer::turn("turn:r.example.com", "user", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_opus_bitrate_bounds() {
        assert!(AudioCodec::opus_with_bitrate(OPUS_MIN_BITRATE).validate().is_ok());
        assert!(AudioCodec::opus_with_bitrate(OPUS_MAX_BITRATE).validate().is_ok());
        assert!(AudioCodec::opus_with_bitrate(5_999).validate().is_err());
        assert!(AudioCodec::opus_with_bitrate(510_001).validate().is_err());
    }

    #[test]
    fn test_connect_builder_validation() {
        assert!(ConnectOptions::builder("  ").build().is_err());
        assert!(ConnectOptions::builder("token").param("", "x").build().is_err());
        let err = ConnectOptions::builder("token")
            .with_call_options(|c| c.preferred_audio_codecs(Vec::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration { ref field, .. } if field == "preferred_audio_codecs"));
    }

    #[test]
    fn test_connect_builder_collects_settings() {
        let uuid = Uuid::new_v4();
        let queue = DelegateQueue::new("connect-options");
        let options = ConnectOptions::builder("token")
            .params([("a", "1"), ("b", "2")])
            .with_call_options(|c| {
                c.uuid(uuid)
                    .delegate_queue(queue.clone())
                    .ice_transport_policy(IceTransportPolicy::Relay)
                    .ice_server(IceServer::stun("stun:s.example.com"))
                    .enable_ice_gathering_on_any_address_ports(true)
            })
            .build()
            .unwrap();

        let call = options.call_options();
        assert_eq!(options.params().len(), 2);
        assert_eq!(call.uuid(), Some(uuid));
        assert!(call.delegate_queue().same_queue(&queue));
        let ice = call.ice_options().unwrap();
        assert_eq!(ice.transport_policy, IceTransportPolicy::Relay);
        assert_eq!(ice.servers.len(), 1);
        assert!(call.enable_ice_gathering_on_any_address_ports());
    }
}
