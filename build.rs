fn main(){
    println!("cargo:rerun-if-changed=src/ffi/mod.rs");

    let crate_dir = match std::env::var("CARGO_MANIFEST_DIR"){
        Ok(dir) => dir,
        Err(_) => return,
    };

    let mut config = cbindgen::Config::default();
    config.language = cbindgen::Language::C;
    config.include_guard = Some("PIUS_LINK_H".to_string());

    //header generation is a convenience for C hosts, never a build blocker
    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) =>{
            bindings.write_to_file("include/pius_link.h");
        }
        Err(e) =>{
            println!("cargo:warning=Unable to generate C bindings: {}", e);
        }
    }
}
