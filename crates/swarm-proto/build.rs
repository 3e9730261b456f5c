//! Build script for compiling protobuf definitions.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    let proto_files = ["../../proto/swarm/v1/analyzer.proto"];
    let includes = ["../../proto"];

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&proto_files, &includes)?;

    for file in &proto_files {
        println!("cargo:rerun-if-changed={file}");
    }

    Ok(())
}
