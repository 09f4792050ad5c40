use std::env;
use std::process::Command;

/// Stamp `CONFIGO_VERSION`: the package version, plus the commit on debug builds
fn main() {
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    let stamped = match env::var("PROFILE").as_deref() {
        Ok("debug") => format!("{}-dev+{}", version, commit().as_deref().unwrap_or("unknown")),
        _ => version,
    };

    println!("cargo:rustc-env=CONFIGO_VERSION={}", stamped);
    println!("cargo:rerun-if-changed=.git/HEAD");
}

fn commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}
