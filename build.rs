//! Build script for vidpane
//!
//! libmpv is loaded at runtime, so nothing is linked here. When pkg-config
//! knows where libmpv lives, that directory is baked in as an extra place to
//! look before the platform's default search path.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "windows" {
        // pkg-config is rarely present; rely on the DLL search path
        return;
    }

    match pkg_config::Config::new()
        .cargo_metadata(false)
        .env_metadata(false)
        .probe("mpv")
    {
        Ok(library) => {
            if let Some(dir) = library.link_paths.first() {
                println!("cargo:rustc-env=VIDPANE_MPV_LIBDIR={}", dir.display());
            }
        }
        Err(e) => {
            let reason = e.to_string();
            println!(
                "cargo:warning=libmpv not found by pkg-config ({}); using runtime lookup only",
                reason.lines().next().unwrap_or_default()
            );
        }
    }
}
