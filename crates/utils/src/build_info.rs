use serde::Serialize;

/// Version and provenance of the running binary, reported by `/api/health`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_branch: &'static str,
    pub build_timestamp: &'static str,
}

const UNKNOWN: &str = "unknown";

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => UNKNOWN,
    }
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    git_commit: or_unknown(option_env!("ENCORE_GIT_COMMIT")),
    git_branch: or_unknown(option_env!("ENCORE_GIT_BRANCH")),
    build_timestamp: or_unknown(option_env!("ENCORE_BUILD_TIMESTAMP")),
};

impl BuildInfo {
    /// `0.1.0 (abc1234)`, or just the version outside a git checkout.
    pub fn describe(&self) -> String {
        if self.git_commit == UNKNOWN {
            self.version.to_string()
        } else {
            format!("{} ({})", self.version, self.git_commit)
        }
    }
}
