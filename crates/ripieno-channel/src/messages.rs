//! Message catalogue for the plugin↔GUI channel.
//!
//! Kinds occupy a reserved numeric space starting at [`KIND_BASE`] so that
//! `0` stays free as the unused slot. New kinds may be appended; existing
//! values are never renumbered; both peers may be built from different
//! checkouts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// First valid message kind.
pub const KIND_BASE: u32 = 100;

/// Every request/response carried over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Kind {
    DefineParameterRequest = 100,
    ParameterValueRequest = 101,
    UpdateTransportRequest = 102,
    SubscribeToTransportRequest = 103,
    AdjustRequest = 104,
    SizeRequest = 105,
    SizeResponse = 106,
    SetScaleRequest = 107,
    SetScaleResponse = 108,
    AttachX11Request = 109,
    AttachWin32Request = 110,
    AttachCocoaRequest = 111,
    AttachResponse = 112,
    ShowRequest = 113,
    ShowResponse = 114,
    HideRequest = 115,
    HideResponse = 116,
    DestroyRequest = 117,
    DestroyResponse = 118,
}

impl Kind {
    pub fn from_raw(raw: u32) -> Option<Kind> {
        use Kind::*;
        Some(match raw {
            100 => DefineParameterRequest,
            101 => ParameterValueRequest,
            102 => UpdateTransportRequest,
            103 => SubscribeToTransportRequest,
            104 => AdjustRequest,
            105 => SizeRequest,
            106 => SizeResponse,
            107 => SetScaleRequest,
            108 => SetScaleResponse,
            109 => AttachX11Request,
            110 => AttachWin32Request,
            111 => AttachCocoaRequest,
            112 => AttachResponse,
            113 => ShowRequest,
            114 => ShowResponse,
            115 => HideRequest,
            116 => HideResponse,
            117 => DestroyRequest,
            118 => DestroyResponse,
            _ => return None,
        })
    }

    /// Response kinds are routed through the pending-request table; anything
    /// else goes to the channel's message handler.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Kind::SizeResponse
                | Kind::SetScaleResponse
                | Kind::AttachResponse
                | Kind::ShowResponse
                | Kind::HideResponse
                | Kind::DestroyResponse
        )
    }
}

/// A serializable body bound to a fixed wire kind.
pub trait Payload: Serialize + DeserializeOwned {
    const KIND: Kind;
}

/// A request whose peer answers with exactly one response kind.
///
/// The request→response pairing is a bijection declared here; matching on the
/// wire is by cookie, never by position.
pub trait Request: Payload {
    type Response: Payload;
}

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: u32,
    pub cookie: u32,
    pub payload: Vec<u8>,
}

impl Message {
    /// Decode the payload as `P`, checking that the wire kind matches.
    pub fn decode<P: Payload>(&self) -> Result<P> {
        match Kind::from_raw(self.kind) {
            Some(kind) if kind == P::KIND => Ok(bincode::deserialize(&self.payload)?),
            Some(kind) => Err(ChannelError::KindMismatch {
                expected: P::KIND,
                found: kind,
            }),
            None => Err(ChannelError::UnknownKind(self.kind)),
        }
    }
}

macro_rules! impl_payload {
    ($ty:ty, $kind:expr) => {
        impl Payload for $ty {
            const KIND: Kind = $kind;
        }
    };
}

macro_rules! impl_request {
    ($req:ty, $resp:ty) => {
        impl Request for $req {
            type Response = $resp;
        }
    };
}

// ---------------------------------------------------------------------------
// Payload schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamFlags {
    pub automatable: bool,
    pub read_only: bool,
    pub wrap: bool,
    pub is_bypass: bool,
    pub hidden: bool,
}

/// Parameter descriptor pushed to the GUI model.
///
/// `id` is the host-facing parameter identifier; `module` is the `/`-separated
/// grouping path skins use to build sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub id: u32,
    pub name: String,
    pub module: String,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
    pub flags: ParamFlags,
}

impl ParamInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            module: String::new(),
            min_value: 0.0,
            max_value: 1.0,
            default_value: 0.0,
            flags: ParamFlags::default(),
        }
    }
}

/// Musical-timeline state, distinct from the byte transport underneath the
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportEvent {
    pub playing: bool,
    pub recording: bool,
    pub loop_active: bool,
    pub tempo: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    pub song_pos_samples: i64,
    pub song_pos_beats: f64,
    pub bar_start_beats: f64,
    pub loop_start_beats: f64,
    pub loop_end_beats: f64,
}

impl Default for TransportEvent {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            loop_active: false,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            song_pos_samples: 0,
            song_pos_beats: 0.0,
            bar_start_beats: 0.0,
            loop_start_beats: 0.0,
            loop_end_beats: 0.0,
        }
    }
}

/// `AdjustRequest::flags` bit marking the start of a user gesture.
pub const ADJUST_GESTURE_BEGIN: u32 = 1 << 0;
/// `AdjustRequest::flags` bit marking the end of a user gesture.
pub const ADJUST_GESTURE_END: u32 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefineParameterRequest {
    pub info: ParamInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterValueRequest {
    pub param_id: u32,
    pub value: f64,
    pub modulation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateTransportRequest {
    pub has_transport: bool,
    pub transport: TransportEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeToTransportRequest {
    pub is_subscribed: bool,
}

/// User-driven parameter change, GUI → plugin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub param_id: u32,
    pub value: f64,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeResponse {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetScaleRequest {
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetScaleResponse {
    pub succeed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachX11Request {
    pub display: String,
    pub window: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachWin32Request {
    pub hwnd: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachCocoaRequest {
    pub ns_view: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachResponse {
    pub succeed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyResponse;

impl_payload!(DefineParameterRequest, Kind::DefineParameterRequest);
impl_payload!(ParameterValueRequest, Kind::ParameterValueRequest);
impl_payload!(UpdateTransportRequest, Kind::UpdateTransportRequest);
impl_payload!(SubscribeToTransportRequest, Kind::SubscribeToTransportRequest);
impl_payload!(AdjustRequest, Kind::AdjustRequest);
impl_payload!(SizeRequest, Kind::SizeRequest);
impl_payload!(SizeResponse, Kind::SizeResponse);
impl_payload!(SetScaleRequest, Kind::SetScaleRequest);
impl_payload!(SetScaleResponse, Kind::SetScaleResponse);
impl_payload!(AttachX11Request, Kind::AttachX11Request);
impl_payload!(AttachWin32Request, Kind::AttachWin32Request);
impl_payload!(AttachCocoaRequest, Kind::AttachCocoaRequest);
impl_payload!(AttachResponse, Kind::AttachResponse);
impl_payload!(ShowRequest, Kind::ShowRequest);
impl_payload!(ShowResponse, Kind::ShowResponse);
impl_payload!(HideRequest, Kind::HideRequest);
impl_payload!(HideResponse, Kind::HideResponse);
impl_payload!(DestroyRequest, Kind::DestroyRequest);
impl_payload!(DestroyResponse, Kind::DestroyResponse);

impl_request!(SizeRequest, SizeResponse);
impl_request!(SetScaleRequest, SetScaleResponse);
impl_request!(AttachX11Request, AttachResponse);
impl_request!(AttachWin32Request, AttachResponse);
impl_request!(AttachCocoaRequest, AttachResponse);
impl_request!(ShowRequest, ShowResponse);
impl_request!(HideRequest, HideResponse);
impl_request!(DestroyRequest, DestroyResponse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_raw_covers_all_kinds() {
        for raw in KIND_BASE..=Kind::DestroyResponse as u32 {
            let kind = Kind::from_raw(raw).expect("contiguous kind space");
            assert_eq!(kind as u32, raw);
        }
        assert!(Kind::from_raw(0).is_none());
        assert!(Kind::from_raw(KIND_BASE - 1).is_none());
        assert!(Kind::from_raw(Kind::DestroyResponse as u32 + 1).is_none());
    }

    #[test]
    fn test_response_kinds() {
        assert!(Kind::SizeResponse.is_response());
        assert!(Kind::AttachResponse.is_response());
        assert!(Kind::DestroyResponse.is_response());
        assert!(!Kind::SizeRequest.is_response());
        assert!(!Kind::AdjustRequest.is_response());
        assert!(!Kind::SubscribeToTransportRequest.is_response());
    }

    #[test]
    fn test_message_decode_checks_kind() {
        let body = bincode::serialize(&SizeResponse {
            width: 500,
            height: 300,
        })
        .unwrap();
        let msg = Message {
            kind: Kind::SizeResponse as u32,
            cookie: 1,
            payload: body,
        };

        let rp: SizeResponse = msg.decode().unwrap();
        assert_eq!((rp.width, rp.height), (500, 300));

        match msg.decode::<ShowResponse>() {
            Err(ChannelError::KindMismatch { expected, found }) => {
                assert_eq!(expected, Kind::ShowResponse);
                assert_eq!(found, Kind::SizeResponse);
            }
            other => panic!("expected KindMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_param_info_payload_roundtrip() {
        let rq = DefineParameterRequest {
            info: ParamInfo {
                id: 7,
                name: "gain".into(),
                module: "mix/output".into(),
                min_value: -60.0,
                max_value: 12.0,
                default_value: 0.0,
                flags: ParamFlags {
                    automatable: true,
                    ..ParamFlags::default()
                },
            },
        };

        let bytes = bincode::serialize(&rq).unwrap();
        let back: DefineParameterRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, rq);
    }

    #[test]
    fn test_transport_event_defaults() {
        let t = TransportEvent::default();
        assert_eq!(t.tempo, 120.0);
        assert_eq!(t.time_sig_numerator, 4);
        assert_eq!(t.time_sig_denominator, 4);
        assert!(!t.playing);
    }

    #[test]
    fn test_empty_payload_kinds_encode_to_nothing() {
        assert!(bincode::serialize(&SizeRequest).unwrap().is_empty());
        assert!(bincode::serialize(&DestroyRequest).unwrap().is_empty());
        assert!(bincode::serialize(&ShowResponse).unwrap().is_empty());
    }
}
