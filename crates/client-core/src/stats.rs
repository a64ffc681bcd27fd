//! Call statistics
//!
//! A [`StatsReport`] is a snapshot of one peer connection, produced by the
//! engine on request (see [`Call::stats`](crate::Call::stats)). Consecutive
//! reports can be reduced to a [`QualitySample`] for the quality warning
//! aggregator.

use serde::{Deserialize, Serialize};

use crate::quality::QualitySample;

/// Fields common to every track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseTrackStats {
    pub track_id: String,
    /// Cumulative packets lost
    pub packets_lost: u64,
    pub codec: String,
    pub ssrc: String,
    /// Seconds since the Unix epoch at which the sample was taken
    pub timestamp: f64,
}

/// Outbound microphone track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalAudioTrackStats {
    #[serde(flatten)]
    pub base: BaseTrackStats,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    /// Round trip time in milliseconds
    pub round_trip_time: u64,
    /// Input level, 0 to 32767
    pub audio_level: u32,
    /// Jitter reported by the remote end, in milliseconds
    pub jitter: u32,
}

/// Inbound audio track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteAudioTrackStats {
    #[serde(flatten)]
    pub base: BaseTrackStats,
    pub bytes_received: u64,
    pub packets_received: u64,
    /// Output level, 0 to 32767
    pub audio_level: u32,
    /// Receive jitter in milliseconds
    pub jitter: u32,
    /// Mean opinion score, 1.0 to 5.0
    pub mos: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceCandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidateStats {
    pub transport_id: String,
    pub is_remote: bool,
    pub ip: Option<String>,
    pub port: u16,
    pub protocol: String,
    pub candidate_type: IceCandidateType,
    pub priority: u32,
    /// STUN or TURN server the candidate was gathered from
    pub url: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceCandidatePairState {
    Frozen,
    Waiting,
    InProgress,
    Failed,
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidatePairStats {
    pub transport_id: String,
    pub local_candidate_id: String,
    pub remote_candidate_id: String,
    pub state: IceCandidatePairState,
    pub nominated: bool,
    pub active_candidate_pair: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Seconds
    pub current_round_trip_time: f64,
    /// Bits per second
    pub available_outgoing_bitrate: f64,
}

/// Statistics for one peer connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub peer_connection_id: String,
    pub local_audio_track_stats: Vec<LocalAudioTrackStats>,
    pub remote_audio_track_stats: Vec<RemoteAudioTrackStats>,
    pub ice_candidate_stats: Vec<IceCandidateStats>,
    pub ice_candidate_pair_stats: Vec<IceCandidatePairStats>,
}

impl StatsReport {
    pub fn new(peer_connection_id: impl Into<String>) -> Self {
        Self {
            peer_connection_id: peer_connection_id.into(),
            ..Default::default()
        }
    }

    /// The nominated pair currently carrying media, if any
    pub fn active_candidate_pair(&self) -> Option<&IceCandidatePairStats> {
        self.ice_candidate_pair_stats
            .iter()
            .find(|pair| pair.active_candidate_pair)
    }

    /// Reduce this report to a quality sample
    ///
    /// Packet loss is measured over the interval since `previous`; without a
    /// previous report for the same track it is left out.
    pub fn quality_sample(&self, previous: Option<&StatsReport>) -> QualitySample {
        let mut sample = QualitySample::new();

        if let Some(local) = self.local_audio_track_stats.first() {
            sample.rtt_ms = Some(local.round_trip_time as f64);
            sample.audio_input_level = Some(f64::from(local.audio_level));
        }

        if let Some(remote) = self.remote_audio_track_stats.first() {
            sample.jitter_ms = Some(f64::from(remote.jitter));
            if remote.mos > 0.0 {
                sample.mos = Some(remote.mos);
            }

            let earlier = previous.and_then(|report| {
                report
                    .remote_audio_track_stats
                    .iter()
                    .find(|track| track.base.track_id == remote.base.track_id)
            });
            if let Some(earlier) = earlier {
                sample.packets_lost_percent = interval_loss_percent(earlier, remote);
            }
        }

        sample
    }
}

fn interval_loss_percent(earlier: &RemoteAudioTrackStats, later: &RemoteAudioTrackStats) -> Option<f64> {
    let lost = later.base.packets_lost.checked_sub(earlier.base.packets_lost)?;
    let received = later.packets_received.checked_sub(earlier.packets_received)?;
    let expected = lost + received;
    if expected == 0 {
        return None;
    }
    Some(lost as f64 * 100.0 / expected as f64)
}
