use std::env;
use std::process::Command;

/// Short commit hash for `--version`, or empty outside a git checkout.
/// Packagers building from a tarball can set `CAMERA_INGEST_GIT_HASH`.
fn commit_hash() -> String {
    if let Ok(hash) = env::var("CAMERA_INGEST_GIT_HASH") {
        return hash.trim().to_string();
    }

    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_default()
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", commit_hash());
    println!("cargo:rerun-if-env-changed=CAMERA_INGEST_GIT_HASH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
