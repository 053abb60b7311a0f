use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=QUILL_LIB_DIR");

    // With the stub engine compiled in, the ABI symbols are defined in this
    // crate and no native library is linked.
    if env::var("CARGO_FEATURE_STUB_ENGINE").is_ok() {
        return;
    }

    let lib_dir = match env::var("QUILL_LIB_DIR") {
        Ok(dir) => {
            let lib_dir = PathBuf::from(dir);
            if !lib_dir.exists() {
                panic!(
                    "QUILL_LIB_DIR is set to '{}' but that directory does not exist. \
                     Point it at the directory containing libquill.",
                    lib_dir.display()
                );
            }
            lib_dir
        }
        Err(_) => {
            panic!(
                "quill-sys was built without the `stub-engine` feature, which requires \
                 the native engine. Set QUILL_LIB_DIR to the directory containing \
                 libquill, or build with default features for the in-process stub."
            );
        }
    };

    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=dylib=quill");

    // DEP_QUILL_LIB_DIR: downstream build scripts read this to embed an
    // rpath in their binaries and tests (links = "quill" -> DEP_QUILL_LIB_DIR).
    println!("cargo:lib_dir={}", lib_dir.display());
}
