//! Build script for DAQ firmware
//!
//! Handles:
//! - Memory layout configuration
//! - cortex-m-rt and defmt linker scripts for the target build

use std::env;

fn main() {
    // Tell Cargo to re-run this if the linker script changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
    let target = env::var("TARGET").unwrap_or_default();

    // Host test builds link normally
    if !target.starts_with("thumb") {
        return;
    }

    // Link memory.x from project directory
    println!("cargo:rustc-link-search={manifest_dir}");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
