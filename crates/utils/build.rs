use std::process::Command;

/// Exposes `ENCORE_GIT_COMMIT`, `ENCORE_GIT_BRANCH` and `ENCORE_BUILD_TIMESTAMP`
/// to `build_info`. Values already present in the environment win over git.
fn main() {
    println!("cargo:rerun-if-env-changed=ENCORE_GIT_COMMIT");
    println!("cargo:rerun-if-env-changed=ENCORE_GIT_BRANCH");

    emit("ENCORE_GIT_COMMIT", || run("git", &["rev-parse", "--short", "HEAD"]));
    emit("ENCORE_GIT_BRANCH", || {
        run("git", &["rev-parse", "--abbrev-ref", "HEAD"])
    });
    emit("ENCORE_BUILD_TIMESTAMP", || {
        run("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"])
    });
}

fn emit(key: &str, fallback: impl FnOnce() -> Option<String>) {
    let value = std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty() && v != "unknown")
        .or_else(fallback);
    if let Some(value) = value {
        println!("cargo:rustc-env={key}={value}");
    }
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
