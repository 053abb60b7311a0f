use std::env;
use std::path::PathBuf;

fn main() {
    // Only relevant when quill-sys linked the real engine; with the stub
    // engine there is no shared library to locate.
    let lib_dir = match env::var("DEP_QUILL_LIB_DIR") {
        Ok(d) => PathBuf::from(d),
        Err(_) => return,
    };

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    // OUT_DIR is e.g. target/debug/build/quill-<hash>/out.
    // Test binaries live in target/<profile>/deps/.
    let deps_dir = out_dir
        .ancestors()
        .nth(3)
        .expect("could not resolve target profile dir from OUT_DIR")
        .join("deps");

    let lib_name = if cfg!(target_os = "macos") {
        "libquill.dylib"
    } else if cfg!(target_os = "windows") {
        "quill.dll"
    } else {
        "libquill.so"
    };

    let src = lib_dir.join(lib_name);
    let dst = deps_dir.join(lib_name);

    if src.exists() {
        let needs_copy = !dst.exists() || {
            let src_meta = std::fs::metadata(&src).ok();
            let dst_meta = std::fs::metadata(&dst).ok();
            match (src_meta, dst_meta) {
                (Some(s), Some(d)) => s.modified().ok() > d.modified().ok(),
                _ => true,
            }
        };
        if needs_copy {
            std::fs::copy(&src, &dst).expect("failed to copy libquill into deps/");
        }
    }

    // $ORIGIN: the dynamic linker looks next to the executable, so test
    // binaries find the library wherever the checkout lives.
    if cfg!(target_os = "linux") {
        println!("cargo:rustc-link-arg-tests=-Wl,-rpath,$ORIGIN");
    } else if cfg!(target_os = "macos") {
        println!("cargo:rustc-link-arg-tests=-Wl,-rpath,@executable_path");
    }
}
