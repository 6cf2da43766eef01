//! Helm major version detection
//!
//! The plugin runs under either Helm 2 or Helm 3, which disagree on where
//! dependencies are declared and where the repository list lives.

use std::fmt;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelmMajorVersion {
    V2,
    V3,
}

impl HelmMajorVersion {
    /// Detect the Helm version driving this process
    pub fn detect() -> Self {
        Self::detect_with(
            |key| std::env::var(key).ok(),
            |helm_bin| {
                Command::new(helm_bin)
                    .args(["version", "--client", "--short"])
                    .output()
                    .ok()
                    .map(|out| String::from_utf8_lossy(&out.stdout).into_owned())
            },
        )
    }

    /// Detection with injectable environment and `helm version` runner
    ///
    /// `TILLER_HOST` only exists in Helm 2 environments. Otherwise the Helm
    /// binary (`HELM_BIN`, default `helm`) is asked for its client version;
    /// anything that is not a `v2.` release counts as Helm 3.
    pub fn detect_with<E, R>(lookup: E, run_helm: R) -> Self
    where
        E: Fn(&str) -> Option<String>,
        R: FnOnce(&str) -> Option<String>,
    {
        if lookup("TILLER_HOST").is_some_and(|v| !v.is_empty()) {
            return HelmMajorVersion::V2;
        }

        let helm_bin = lookup("HELM_BIN")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "helm".to_string());

        match run_helm(&helm_bin) {
            Some(output) if output.contains("v2.") => HelmMajorVersion::V2,
            Some(_) => HelmMajorVersion::V3,
            None => {
                tracing::debug!(helm_bin = %helm_bin, "could not run helm, assuming Helm 3");
                HelmMajorVersion::V3
            }
        }
    }

    pub fn as_number(self) -> u8 {
        match self {
            HelmMajorVersion::V2 => 2,
            HelmMajorVersion::V3 => 3,
        }
    }
}

impl fmt::Display for HelmMajorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiller_host_means_v2() {
        let version = HelmMajorVersion::detect_with(
            |key| (key == "TILLER_HOST").then(|| "localhost:44134".to_string()),
            |_| panic!("helm must not be executed"),
        );
        assert_eq!(version, HelmMajorVersion::V2);
    }

    #[test]
    fn test_helm_client_version() {
        let v2 = HelmMajorVersion::detect_with(|_| None, |_| Some("Client: v2.16.1+gbbdfe5e\n".into()));
        assert_eq!(v2, HelmMajorVersion::V2);

        let v3 = HelmMajorVersion::detect_with(|_| None, |_| Some("v3.14.0+g3fc9f4b\n".into()));
        assert_eq!(v3, HelmMajorVersion::V3);
    }

    #[test]
    fn test_helm_bin_override_and_fallback() {
        let version = HelmMajorVersion::detect_with(
            |key| (key == "HELM_BIN").then(|| "/usr/local/bin/helm2".to_string()),
            |bin| {
                assert_eq!(bin, "/usr/local/bin/helm2");
                None
            },
        );
        assert_eq!(version, HelmMajorVersion::V3);
        assert_eq!(version.to_string(), "3");
    }
}
