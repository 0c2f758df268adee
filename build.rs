use std::env;
use std::error::Error;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    let descriptor_path = PathBuf::from(env::var("OUT_DIR")?).join("chord_descriptor.bin");
    tonic_build::configure()
        .file_descriptor_set_path(descriptor_path)
        .compile(&["proto/chord.proto"], &["proto"])?;
    Ok(())
}
