//! Wire codec for the session protocol.
//!
//! [`encode`] and [`decode`] turn any of the five `proto.djtool` messages into
//! bytes and back. [`WireCodec`] plugs the same rules into tonic, so a frame
//! that fails to decode reaches the caller as `DATA_LOSS` instead of a generic
//! internal error and can be told apart from transport failures.
//!
//! [`Update`] is the typed view of `proto::Update` that the rest of the crate
//! works with. An update without a payload, or with a variant this build does
//! not know, is [`Update::NotSet`].

use std::marker::PhantomData;

use prost::Message;
use prost::bytes::Buf;
use serde::Serialize;
use thiserror::Error;
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};

use crate::proto;

/// Errors produced while decoding wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are not a valid encoding of the expected message.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

/// Serialize a wire message.
pub fn encode<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

/// Deserialize a wire message.
///
/// # Errors
///
/// Returns [`CodecError::MalformedMessage`] if `bytes` is not a valid encoding
/// of `M`. No partially decoded value is ever returned.
pub fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M, CodecError> {
    M::decode(bytes).map_err(|e| CodecError::MalformedMessage(e.to_string()))
}

/// Discriminator of an [`Update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateCase {
    Heartbeat,
    UpdateNotSet,
}

/// A typed update pushed by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "case", rename_all = "snake_case")]
pub enum Update {
    /// Liveness beacon carrying the daemon's per-connection counter.
    Heartbeat { seq: u64 },
    /// No payload was sent, or the payload is a variant this build does not know.
    NotSet,
}

impl Update {
    #[must_use]
    pub const fn case(&self) -> UpdateCase {
        match self {
            Self::Heartbeat { .. } => UpdateCase::Heartbeat,
            Self::NotSet => UpdateCase::UpdateNotSet,
        }
    }

    /// Heartbeat sequence number, if this is a heartbeat.
    #[must_use]
    pub const fn heartbeat_seq(&self) -> Option<u64> {
        match self {
            Self::Heartbeat { seq } => Some(*seq),
            Self::NotSet => None,
        }
    }

    /// Serialize to the `proto.djtool.Update` wire format.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        encode(&proto::Update::from(self))
    }

    /// Deserialize from the `proto.djtool.Update` wire format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedMessage`] on invalid bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode::<proto::Update>(bytes).map(Self::from)
    }
}

impl From<proto::Update> for Update {
    fn from(update: proto::Update) -> Self {
        match update.update {
            Some(proto::update::Update::Heartbeat(heartbeat)) => {
                Self::Heartbeat { seq: heartbeat.seq }
            }
            None => Self::NotSet,
        }
    }
}

impl From<Update> for proto::Update {
    fn from(update: Update) -> Self {
        let update = match update {
            Update::Heartbeat { seq } => {
                Some(proto::update::Update::Heartbeat(proto::Heartbeat { seq }))
            }
            Update::NotSet => None,
        };
        Self { update }
    }
}

/// tonic codec for `proto.djtool` messages.
///
/// `E` is the message written to the wire, `D` the message read from it.
#[derive(Debug)]
pub struct WireCodec<E, D>(PhantomData<(E, D)>);

impl<E, D> Default for WireCodec<E, D> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<E, D> Codec for WireCodec<E, D>
where
    E: Message + Send + 'static,
    D: Message + Default + Send + 'static,
{
    type Encode = E;
    type Decode = D;
    type Encoder = WireEncoder<E>;
    type Decoder = WireDecoder<D>;

    fn encoder(&mut self) -> Self::Encoder {
        WireEncoder(PhantomData)
    }

    fn decoder(&mut self) -> Self::Decoder {
        WireDecoder(PhantomData)
    }
}

#[derive(Debug)]
pub struct WireEncoder<E>(PhantomData<E>);

impl<E: Message> Encoder for WireEncoder<E> {
    type Item = E;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, buf: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(buf).map_err(|e| Status::internal(format!("failed to encode message: {e}")))
    }
}

#[derive(Debug)]
pub struct WireDecoder<D>(PhantomData<D>);

impl<D: Message + Default> Decoder for WireDecoder<D> {
    type Item = D;
    type Error = Status;

    fn decode(&mut self, buf: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(buf).map(Some)
    }
}

/// Decode one gRPC message body. Corrupt bytes become `DATA_LOSS`.
fn decode_frame<D: Message + Default>(buf: impl Buf) -> Result<D, Status> {
    D::decode(buf).map_err(|e| Status::data_loss(format!("malformed message: {e}")))
}
