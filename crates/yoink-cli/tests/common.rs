#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::{symlink, PermissionsExt},
    path::{Path, PathBuf},
};

use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
use serde_json::Value;
use tempfile::TempDir;

/// Host tools the fake package managers shell out to.
const HOST_TOOLS: &[&str] = &["mkdir", "cp", "chmod", "cat", "tar", "gzip"];

/// A throwaway `PATH`, cache root and package repository.
///
/// Only the fake managers written into `bin` are visible to yoink, so the
/// host's real package manager is never detected.
pub struct Sandbox {
    _temp: TempDir,
    pub bin: PathBuf,
    pub cache: PathBuf,
    pub payload: PathBuf,
    pub mirror: PathBuf,
    pub log: PathBuf,
}

impl Sandbox {
    pub fn new(prefix: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("tempdir");
        let root = temp.path().to_path_buf();
        let sandbox = Self {
            bin: root.join("bin"),
            cache: root.join("cache"),
            payload: root.join("payload"),
            mirror: root.join("mirror"),
            log: root.join("calls.log"),
            _temp: temp,
        };
        fs::create_dir_all(&sandbox.bin).expect("bin dir");
        fs::create_dir_all(&sandbox.payload).expect("payload dir");
        for tool in HOST_TOOLS {
            link_host_tool(&sandbox.bin, tool);
        }
        sandbox
    }

    /// Installs fake `apt-get` and `dpkg-deb` backed by the payload dir.
    pub fn with_apt(self) -> Self {
        let apt_get = format!(
            r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "apt 2.7.14 (amd64)"
  exit 0
fi
echo "apt-get $*" >> "{log}"
pin="$2"
name="${{pin%%=*}}"
if [ ! -f "{payload}/$name" ]; then
  echo "E: Unable to locate package $name" >&2
  exit 100
fi
if [ "$name" != "$pin" ] && [ -f "{payload}/$name.versions" ]; then
  version="${{pin#*=}}"
  found=no
  while IFS= read -r line; do
    [ "$line" = "$version" ] && found=yes
  done < "{payload}/$name.versions"
  if [ "$found" = no ]; then
    echo "E: Version '$version' for '$name' was not found" >&2
    exit 100
  fi
fi
printf '%s' "$name" > "${{name}}_1.0-1_amd64.deb"
"#,
            log = self.log.display(),
            payload = self.payload.display(),
        );
        let dpkg_deb = format!(
            r#"#!/bin/sh
echo "dpkg-deb $*" >> "{log}"
IFS= read -r name < "$2" || true
mkdir -p "$3/usr/bin"
cp "{payload}/$name" "$3/usr/bin/$name"
chmod 755 "$3/usr/bin/$name"
"#,
            log = self.log.display(),
            payload = self.payload.display(),
        );
        write_script(&self.bin.join("apt-get"), &apt_get);
        write_script(&self.bin.join("dpkg-deb"), &dpkg_deb);
        self
    }

    /// Installs fake `dnf`, `rpm2cpio` and `cpio`; `repoquery` knows every
    /// package in the payload dir.
    pub fn with_dnf(self) -> Self {
        let dnf = format!(
            r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "4.18.0"
  exit 0
fi
echo "dnf $*" >> "{log}"
case "$1" in
  repoquery)
    name="$3"
    if [ -f "{payload}/$name" ]; then
      echo "$name-0:1.0-1.x86_64"
    fi
    exit 0
    ;;
  download)
    for arg in "$@"; do
      case "$arg" in
        --destdir=*) dest="${{arg#--destdir=}}" ;;
      esac
      pin="$arg"
    done
    name="$pin"
    if [ ! -f "{payload}/$pin" ]; then
      name="${{pin%-*}}"
      version="${{pin##*-}}"
      found=no
      if [ "$name" != "$pin" ] && [ -f "{payload}/$name.versions" ]; then
        while IFS= read -r line; do
          [ "$line" = "$version" ] && found=yes
        done < "{payload}/$name.versions"
      fi
      if [ "$found" = no ]; then
        echo "No match for argument: $pin" >&2
        echo "Error: No packages available for download" >&2
        exit 1
      fi
    fi
    printf '%s' "$name" > "$dest/$name-1.0-1.x86_64.rpm"
    exit 0
    ;;
esac
exit 1
"#,
            log = self.log.display(),
            payload = self.payload.display(),
        );
        let rpm2cpio = format!(
            "#!/bin/sh\necho \"rpm2cpio $*\" >> \"{}\"\ncat \"$1\"\n",
            self.log.display()
        );
        let cpio = format!(
            r#"#!/bin/sh
echo "cpio $*" >> "{log}"
IFS= read -r name || true
mkdir -p usr/bin
cp "{payload}/$name" "usr/bin/$name"
chmod 755 "usr/bin/$name"
"#,
            log = self.log.display(),
            payload = self.payload.display(),
        );
        write_script(&self.bin.join("dnf"), &dnf);
        write_script(&self.bin.join("rpm2cpio"), &rpm2cpio);
        write_script(&self.bin.join("cpio"), &cpio);
        self
    }

    /// Installs a fake `pacman` whose `-Sddp` builds a real `.pkg.tar.gz`
    /// (with a `.PKGINFO` member) in the mirror dir and prints its
    /// `file://` URL.
    pub fn with_pacman(self) -> Self {
        let pacman = format!(
            r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "Pacman v6.1.0 - libalpm v14.0.0"
  exit 0
fi
echo "pacman $*" >> "{log}"
name="$3"
if [ ! -f "{payload}/$name" ]; then
  echo "error: target not found: $name" >&2
  exit 1
fi
pkg="{mirror}/build/$name"
mkdir -p "$pkg/usr/bin"
cp "{payload}/$name" "$pkg/usr/bin/$name"
chmod 755 "$pkg/usr/bin/$name"
printf 'pkgname = %s
' "$name" > "$pkg/.PKGINFO"
archive="{mirror}/$name-1.0-1-x86_64.pkg.tar.gz"
tar -czf "$archive" -C "$pkg" .PKGINFO usr
echo "file://$archive"
"#,
            log = self.log.display(),
            payload = self.payload.display(),
            mirror = self.mirror.display(),
        );
        write_script(&self.bin.join("pacman"), &pacman);
        self
    }

    /// Makes `name` available in the fake repository; `body` becomes the
    /// package's `usr/bin/<name>`.
    pub fn package(&self, name: &str, body: &str) -> &Self {
        fs::write(self.payload.join(name), body).expect("write payload");
        self
    }

    /// Restricts which versions the fake repository offers for `name`.
    pub fn versions(&self, name: &str, versions: &[&str]) -> &Self {
        let mut listing = versions.join("\n");
        listing.push('\n');
        fs::write(self.payload.join(format!("{name}.versions")), listing)
            .expect("write versions");
        self
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("yoink");
        cmd.env_clear()
            .env("PATH", &self.bin)
            .env("YOINK_CACHE_DIR", &self.cache)
            .env("YOINK_PROGRESS", "0")
            .env("NO_COLOR", "1");
        cmd
    }

    /// Backend invocations recorded by the fake managers.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn download_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|line| {
                line.starts_with("apt-get download")
                    || line.starts_with("dnf download")
                    || line.starts_with("pacman -Sddp")
            })
            .count()
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

fn link_host_tool(bin: &Path, tool: &str) {
    let host = ["/usr/bin", "/bin"]
        .iter()
        .map(|dir| Path::new(dir).join(tool))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| panic!("host tool {tool} not found"));
    symlink(host, bin.join(tool)).expect("link host tool");
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stderr(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).to_string()
}

pub fn stdout(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).to_string()
}
