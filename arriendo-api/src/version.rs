// Version information module

use std::fs;

/// Version from a VERSION file, falling back to the crate version.
pub fn get_backend_version() -> String {
    for path in ["VERSION", "../VERSION"] {
        if let Ok(contents) = fs::read_to_string(path) {
            return contents.trim().to_string();
        }
    }
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct VersionInfo {
    pub backend_version: String,
    pub build_time: String,
}

pub fn get_version_info() -> VersionInfo {
    VersionInfo {
        backend_version: get_backend_version(),
        build_time: chrono::Utc::now()
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    }
}
