//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Full version string: `mimir {version}`.
pub fn version_string() -> String {
    format!("mimir {PKG_VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_contains_pkg_version() {
        let version = version_string();
        assert!(
            version.ends_with(PKG_VERSION),
            "version should end with pkg version"
        );
    }
}
