use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=TOR_LIB_DIR");
    println!("cargo:rerun-if-env-changed=TOR_STATIC_LIBS");

    if env::var_os("CARGO_FEATURE_TOR").is_none() {
        return;
    }

    if let Ok(dir) = env::var("TOR_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
    }

    let libs = env::var("TOR_STATIC_LIBS").unwrap_or_else(|_| "tor".to_string());
    for lib in libs.split(',').map(str::trim).filter(|lib| !lib.is_empty()) {
        println!("cargo:rustc-link-lib=static={lib}");
    }
}
