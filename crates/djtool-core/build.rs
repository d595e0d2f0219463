//! Build script for djtool-core.
//!
//! Generates the `proto.djtool.Djtool` client and server stubs. The message
//! types are written by hand in `src/proto.rs`, so the service is described
//! with the manual builder and no `protoc` is needed.
//!
//! Note: Build scripts require `println!` for cargo integration,
//! so we allow these disallowed items here.
#![allow(clippy::disallowed_macros)]

use tonic_build::manual::{Builder, Method, Service};

fn main() {
    let djtool = Service::builder()
        .name("Djtool")
        .package("proto.djtool")
        // Server-streaming session channel
        .method(
            Method::builder()
                .name("connect")
                .route_name("Connect")
                .input_type("crate::proto::ConnectRequest")
                .output_type("crate::proto::Update")
                .codec_path("crate::codec::WireCodec")
                .server_streaming()
                .build(),
        )
        // Best-effort unary teardown
        .method(
            Method::builder()
                .name("disconnect")
                .route_name("Disconnect")
                .input_type("crate::proto::DisconnectRequest")
                .output_type("crate::proto::Empty")
                .codec_path("crate::codec::WireCodec")
                .build(),
        )
        .build();

    // The transport helper is an associated `connect(dst)`, which clashes with
    // the `connect` rpc. Clients are built from a `Channel` instead.
    Builder::new()
        .build_client(true)
        .build_server(true)
        .build_transport(false)
        .compile(&[djtool]);

    println!("cargo:rerun-if-changed=build.rs");
}
