use std::io::prelude::*;
use std::{env, error::Error, fs, fs::File, path::Path};

// Stamp the GLSL version onto the shaders at build time.
//
// The shaders are written in GLSL ES 1.00, which both WebGL 2 and WebGL 1
// contexts accept. The define preamble for shader variants is inserted right
// after this line when the programs are compiled.
const GLSL_VERSION: &str = "100";

fn main() -> Result<(), Box<dyn Error>> {
    let out_dir = env::var_os("OUT_DIR").ok_or("missing output directory")?;

    println!("cargo:rerun-if-changed=shaders");

    for entry in fs::read_dir("shaders")? {
        let shader_file = entry?;
        let path = shader_file.path();
        let mut shader_source = File::open(&path)?;

        let mut version_shader_source = format!("#version {}\n", GLSL_VERSION);
        shader_source.read_to_string(&mut version_shader_source)?;

        let out_path = Path::new(&out_dir).join(&path);
        fs::create_dir_all(Path::new(&out_dir).join(Path::new("shaders")))?;
        fs::write(&out_path, version_shader_source.as_bytes())?;
    }

    Ok(())
}
