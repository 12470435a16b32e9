//! CPU architecture to published asset naming.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    X86,
    Arm64,
}

/// Naming conventions for one architecture
struct ArchNames {
    arch: Arch,
    /// Rust `target_arch` values that map here
    targets: &'static [&'static str],
    /// Node.js MSI suffix, as in `node-v22.13.1-x64.msi`
    node: &'static str,
    /// Git for Windows installer marker, as in `Git-2.47.1-64-bit.exe`
    git: &'static str,
}

const ARCH_TABLE: &[ArchNames] = &[
    ArchNames {
        arch: Arch::X64,
        targets: &["x86_64"],
        node: "x64",
        git: "64-bit",
    },
    ArchNames {
        arch: Arch::X86,
        targets: &["x86", "i386", "i586", "i686"],
        node: "x86",
        git: "32-bit",
    },
    ArchNames {
        arch: Arch::Arm64,
        targets: &["aarch64", "arm64"],
        node: "arm64",
        git: "arm64",
    },
];

impl Arch {
    /// Architecture of the running binary; unknown targets use the 64-bit
    /// default.
    pub fn current() -> Self {
        Self::from_target(std::env::consts::ARCH).unwrap_or(Arch::X64)
    }

    pub fn from_target(target: &str) -> Option<Self> {
        ARCH_TABLE
            .iter()
            .find(|row| row.targets.contains(&target))
            .map(|row| row.arch)
    }

    fn names(self) -> &'static ArchNames {
        // Every variant has a row.
        ARCH_TABLE
            .iter()
            .find(|row| row.arch == self)
            .unwrap_or(&ARCH_TABLE[0])
    }

    pub fn node_name(self) -> &'static str {
        self.names().node
    }

    pub fn git_name(self) -> &'static str {
        self.names().git
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_name())
    }
}
