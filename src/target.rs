//! Target configuration for the executor: operating system, architecture,
//! endianness, and pointer width. The accepted OS/arch pairs form a closed
//! list; everything else is rejected by the driver loop.

use std::fmt;

/// Operating systems the engine can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Android,
    Darwin,
    Dragonfly,
    Freebsd,
    Js,
    Linux,
    Nacl,
    Netbsd,
    Openbsd,
    Plan9,
    Solaris,
    Windows,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Os::Android => "android",
            Os::Darwin => "darwin",
            Os::Dragonfly => "dragonfly",
            Os::Freebsd => "freebsd",
            Os::Js => "js",
            Os::Linux => "linux",
            Os::Nacl => "nacl",
            Os::Netbsd => "netbsd",
            Os::Openbsd => "openbsd",
            Os::Plan9 => "plan9",
            Os::Solaris => "solaris",
            Os::Windows => "windows",
        };
        f.write_str(s)
    }
}

/// Architectures the engine can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    I386,
    Amd64,
    Amd64p32,
    Arm,
    Arm64,
    Mips,
    Mips64,
    Mips64le,
    Mipsle,
    Ppc64,
    Ppc64le,
    Riscv64,
    S390x,
    Wasm,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arch::I386 => "386",
            Arch::Amd64 => "amd64",
            Arch::Amd64p32 => "amd64p32",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Mips64 => "mips64",
            Arch::Mips64le => "mips64le",
            Arch::Mipsle => "mipsle",
            Arch::Ppc64 => "ppc64",
            Arch::Ppc64le => "ppc64le",
            Arch::Riscv64 => "riscv64",
            Arch::S390x => "s390x",
            Arch::Wasm => "wasm",
        };
        f.write_str(s)
    }
}

/// An OS/architecture pair. Endianness and pointer width derive from the
/// architecture; the pair itself gates execution through `is_valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub os: Os,
    pub arch: Arch,
}

impl Default for Target {
    fn default() -> Self {
        Target { os: Os::Linux, arch: Arch::Amd64 }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl Target {
    pub fn new(os: Os, arch: Arch) -> Self {
        Target { os, arch }
    }

    /// Reports whether the OS/arch combination is one of the accepted pairs.
    pub fn is_valid(&self) -> bool {
        use Arch::*;
        use Os::*;
        matches!(
            (self.os, self.arch),
            (Android, I386)
                | (Android, Amd64)
                | (Android, Arm)
                | (Android, Arm64)
                | (Darwin, I386)
                | (Darwin, Amd64)
                | (Darwin, Arm)
                | (Darwin, Arm64)
                | (Dragonfly, Amd64)
                | (Freebsd, I386)
                | (Freebsd, Amd64)
                | (Freebsd, Arm)
                | (Js, Wasm)
                | (Linux, I386)
                | (Linux, Amd64)
                | (Linux, Arm)
                | (Linux, Arm64)
                | (Linux, Mips)
                | (Linux, Mips64)
                | (Linux, Mips64le)
                | (Linux, Mipsle)
                | (Linux, Ppc64)
                | (Linux, Ppc64le)
                | (Linux, Riscv64)
                | (Linux, S390x)
                | (Nacl, I386)
                | (Nacl, Amd64p32)
                | (Nacl, Arm)
                | (Netbsd, I386)
                | (Netbsd, Amd64)
                | (Netbsd, Arm)
                | (Openbsd, I386)
                | (Openbsd, Amd64)
                | (Openbsd, Arm)
                | (Plan9, I386)
                | (Plan9, Amd64)
                | (Plan9, Arm)
                | (Solaris, Amd64)
                | (Windows, I386)
                | (Windows, Amd64)
        )
    }

    /// True unless the architecture is one of the big-endian targets.
    pub fn is_little_endian(&self) -> bool {
        !matches!(self.arch, Arch::Ppc64 | Arch::Mips | Arch::Mips64)
    }

    /// Pointer width in bits.
    pub fn pointer_width(&self) -> u32 {
        self.pointer_bytes() * 8
    }

    /// Pointer width in bytes.
    pub fn pointer_bytes(&self) -> u32 {
        match self.arch {
            Arch::I386 | Arch::Amd64p32 | Arch::Arm | Arch::Mips | Arch::Mipsle => 4,
            _ => 8,
        }
    }

    /// Maximum allocation size in bytes. Exceeding it is fatal.
    pub fn max_alloc_size(&self) -> u64 {
        if self.pointer_width() == 32 {
            1 << 20 // 1 MiB
        } else {
            256 << 20 // 256 MiB
        }
    }
}
