//! Runtime facts about the host used by `system` predicates and templates.
use std::fs;
use std::path::Path;

/// Detected facts about the current host.
///
/// Names follow the release-asset convention: `os` is `linux`, `darwin` or
/// `windows`, and `arch` is `amd64`, `arm64`, `386`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Distribution id (`ubuntu`, `arch`, ...), or `os` when unknown.
    pub platform: String,
    /// Distribution family (`debian`, `rhel`, ...), or `platform` when unknown.
    pub family: String,
    /// `glibc` or `musl` on Linux, empty elsewhere.
    pub libc: String,
    /// Human-readable distribution name.
    pub distro: String,
    /// Running as uid 0.
    pub is_root: bool,
    /// Running inside Windows Subsystem for Linux.
    pub is_wsl: bool,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub fn detect() -> Self {
        let os = normalize_os(std::env::consts::OS);
        let release = OsRelease::read();
        let platform = release.id.clone().unwrap_or_else(|| os.clone());
        let family = release.id_like.clone().unwrap_or_else(|| platform.clone());
        Self {
            arch: normalize_arch(std::env::consts::ARCH),
            platform,
            family,
            libc: detect_libc(&os),
            distro: release.pretty_name.unwrap_or_else(|| os.clone()),
            is_root: detect_root(),
            is_wsl: detect_wsl(),
            os,
        }
    }

    /// Create a platform with explicit `os` and `arch`; all other facts are
    /// derived from those two or left empty.
    #[must_use]
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            platform: os.to_string(),
            family: os.to_string(),
            libc: String::new(),
            distro: os.to_string(),
            is_root: false,
            is_wsl: false,
        }
    }

    /// Override the distribution name.
    #[must_use]
    pub fn with_distro(mut self, distro: &str) -> Self {
        self.distro = distro.to_string();
        self
    }

    /// Override the distribution id and family.
    #[must_use]
    pub fn with_platform(mut self, platform: &str, family: &str) -> Self {
        self.platform = platform.to_string();
        self.family = family.to_string();
        self
    }

    /// Override the C library.
    #[must_use]
    pub fn with_libc(mut self, libc: &str) -> Self {
        self.libc = libc.to_string();
        self
    }

    /// Override the root flag.
    #[must_use]
    pub const fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Override the WSL flag.
    #[must_use]
    pub const fn with_wsl(mut self, is_wsl: bool) -> Self {
        self.is_wsl = is_wsl;
        self
    }

    /// `true` on Windows.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Case-insensitive comparison of `name` against the start of the
    /// distribution name, over the shorter of the two lengths.
    #[must_use]
    pub fn match_distro(&self, name: &str) -> bool {
        let len = self.distro.len().min(name.len());
        match (self.distro.get(..len), name.get(..len)) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    /// Shell used for `shell` directives: `powershell` on Windows, otherwise
    /// the first of `bash`, `ash` and `sh` found on `PATH`.
    #[must_use]
    pub fn default_shell(&self) -> String {
        if self.is_windows() {
            return "powershell".to_string();
        }
        ["bash", "ash"]
            .into_iter()
            .find(|shell| which::which(shell).is_ok())
            .unwrap_or("sh")
            .to_string()
    }
}

/// Map Rust's `std::env::consts::OS` onto release-asset names.
#[must_use]
pub fn normalize_os(os: &str) -> String {
    match os {
        "macos" => "darwin",
        other => other,
    }
    .to_string()
}

/// Map Rust's `std::env::consts::ARCH` onto release-asset names.
#[must_use]
pub fn normalize_arch(arch: &str) -> String {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Default)]
struct OsRelease {
    id: Option<String>,
    id_like: Option<String>,
    pretty_name: Option<String>,
}

impl OsRelease {
    fn read() -> Self {
        ["/etc/os-release", "/usr/lib/os-release"]
            .iter()
            .find_map(|path| fs::read_to_string(path).ok())
            .map(|text| Self::parse(&text))
            .unwrap_or_default()
    }

    fn parse(text: &str) -> Self {
        let mut release = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "ID" => release.id = Some(value),
                "ID_LIKE" => {
                    release.id_like = value.split_whitespace().next().map(String::from);
                }
                "PRETTY_NAME" => release.pretty_name = Some(value),
                _ => {}
            }
        }
        release
    }
}

fn detect_libc(os: &str) -> String {
    if os != "linux" {
        return String::new();
    }
    let musl = ["/lib", "/usr/lib"].iter().any(|dir| {
        fs::read_dir(dir).is_ok_and(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().starts_with("ld-musl-"))
        })
    });
    if musl { "musl" } else { "glibc" }.to_string()
}

#[cfg(unix)]
fn detect_root() -> bool {
    use std::os::unix::fs::MetadataExt as _;
    if let Ok(meta) = fs::metadata("/proc/self") {
        return meta.uid() == 0;
    }
    std::process::Command::new("id")
        .arg("-u")
        .output()
        .is_ok_and(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
}

#[cfg(not(unix))]
const fn detect_root() -> bool {
    false
}

fn detect_wsl() -> bool {
    std::env::var_os("WSL_DISTRO_NAME").is_some()
        || fs::read_to_string(Path::new("/proc/sys/kernel/osrelease"))
            .is_ok_and(|s| s.to_ascii_lowercase().contains("microsoft"))
}
