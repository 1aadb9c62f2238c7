fn main() -> Result<(), Box<dyn std::error::Error>> {
    // protox parses the schema in-process, so no system protoc is needed
    let descriptors = protox::compile(["proto/overlay.proto"], ["proto/"])?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(descriptors)?;

    println!("cargo:rerun-if-changed=proto/overlay.proto");
    Ok(())
}
