//! Build script for compiling the vendored gNMI protocol definition.
//!
//! Uses tonic-prost-build to generate the gNMI client stub and message
//! types this transport dispatches against.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/gnmi.proto");

    tonic_prost_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/gnmi.proto"], &["proto"])?;

    Ok(())
}
