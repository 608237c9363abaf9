use std::fmt;

use serde::{Deserialize, Serialize};

/// Native package managers yoink knows how to drive.
///
/// The declaration order is the detection order: on hosts with more than one
/// manager installed the first one found wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// APT - Debian/Ubuntu family
    Apt,
    /// DNF - Fedora/RHEL family
    Dnf,
    /// Pacman - Arch Linux family
    Pacman,
}

impl Backend {
    pub const DETECTION_ORDER: [Backend; 3] = [Backend::Apt, Backend::Dnf, Backend::Pacman];

    /// Directory name used under the cache root. Part of the on-disk layout,
    /// so it must never change.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    /// Executable probed on `PATH` to decide whether this manager is present.
    pub fn probe_binary(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Apt => "APT",
            Self::Dnf => "DNF",
            Self::Pacman => "Pacman",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_order_is_apt_dnf_pacman() {
        assert_eq!(
            Backend::DETECTION_ORDER,
            [Backend::Apt, Backend::Dnf, Backend::Pacman]
        );
    }

    #[test]
    fn dir_names_are_stable() {
        assert_eq!(Backend::Apt.dir_name(), "apt");
        assert_eq!(Backend::Dnf.dir_name(), "dnf");
        assert_eq!(Backend::Pacman.dir_name(), "pacman");
        assert_eq!(Backend::Pacman.to_string(), "pacman");
    }

    #[test]
    fn apt_is_probed_through_apt_get() {
        assert_eq!(Backend::Apt.probe_binary(), "apt-get");
        assert_eq!(Backend::Apt.display_name(), "APT");
    }
}
