fn main() {
    #[cfg(feature = "libtiepie")]
    libtiepie::generate_bindings();
}

#[cfg(feature = "libtiepie")]
mod libtiepie {
    use std::{env, path::PathBuf};

    pub fn generate_bindings() {
        println!("cargo:rustc-link-lib=tiepie");
        println!("cargo:rerun-if-changed=wrapper.h");

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .allowlist_function("(Lib|Lst|Obj|Dev|Scp)[A-Z][A-Za-z]*")
            .allowlist_item("BLOCKSPEED_.*")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .generate()
            .expect("Unable to generate libtiepie bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");
    }
}
