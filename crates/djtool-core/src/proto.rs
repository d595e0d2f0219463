//! Wire messages of the `proto.djtool` package.
//!
//! The daemon and the UI agree on these protobuf shapes:
//!
//! ```text
//! message Empty {}
//! message ConnectRequest {}
//! message DisconnectRequest {}
//! message Heartbeat { uint64 seq = 1; }
//! message Update { oneof update { Heartbeat heartbeat = 1; } }
//!
//! service Djtool {
//!   rpc Connect(ConnectRequest) returns (stream Update);
//!   rpc Disconnect(DisconnectRequest) returns (Empty);
//! }
//! ```

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConnectRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DisconnectRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Heartbeat {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Update {
    #[prost(oneof = "update::Update", tags = "1")]
    pub update: ::core::option::Option<update::Update>,
}

/// Nested message and enum types in `Update`.
pub mod update {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Update {
        #[prost(message, tag = "1")]
        Heartbeat(super::Heartbeat),
    }
}

/// Generated client and server stubs for the `Djtool` service.
#[allow(clippy::similar_names)]
#[allow(clippy::doc_markdown)]
#[allow(clippy::pedantic, clippy::nursery)]
mod service {
    include!(concat!(env!("OUT_DIR"), "/proto.djtool.Djtool.rs"));
}

pub use service::{djtool_client, djtool_server};
