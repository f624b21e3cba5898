//! Project manifest (`Rachet.toml`) and project scaffolding

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RachetError, RachetResult};

pub const MANIFEST_FILE: &str = "Rachet.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub package: PackageInfo,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_entry")]
    pub entry: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub keep_intermediates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_assembler")]
    pub assembler: String,
    #[serde(default = "default_linker")]
    pub linker: String,
    #[serde(default = "default_iso_tool")]
    pub iso_tool: String,
    #[serde(default = "default_load_address")]
    pub load_address: u32,
    /// Replacement for the embedded kernel preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<PathBuf>,
    #[serde(default = "default_iso_title")]
    pub iso_title: String,
}

fn default_version() -> String { "0.1.0".to_string() }
fn default_entry() -> PathBuf { PathBuf::from("src/main.rx") }
fn default_output() -> PathBuf { PathBuf::from("build") }
fn default_assembler() -> String { "nasm".to_string() }
fn default_linker() -> String { "ld".to_string() }
fn default_iso_tool() -> String { "grub-mkrescue".to_string() }
fn default_load_address() -> u32 { 0x100000 }
fn default_iso_title() -> String { "Rachet OS".to_string() }

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            output: default_output(),
            keep_intermediates: false,
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            assembler: default_assembler(),
            linker: default_linker(),
            iso_tool: default_iso_tool(),
            load_address: default_load_address(),
            kernel: None,
            iso_title: default_iso_title(),
        }
    }
}

impl Manifest {
    /// Defaults for a project called `name`
    pub fn new(name: &str) -> Self {
        Self {
            package: PackageInfo {
                name: name.to_string(),
                version: default_version(),
                authors: vec![],
                description: None,
            },
            build: BuildConfig::default(),
            toolchain: ToolchainConfig::default(),
        }
    }

    /// Names end up in file names and in grub.cfg
    pub fn validate(&self) -> RachetResult<()> {
        let name = &self.package.name;
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(RachetError::config(format!("invalid package name `{}`", name)));
        }
        if self.toolchain.iso_title.contains('"') {
            return Err(RachetError::config("iso_title may not contain `\"`"));
        }
        Ok(())
    }
}

/// Read and validate the manifest at `path`, or `path/Rachet.toml` for a directory.
pub fn load_manifest(path: &Path) -> RachetResult<Manifest> {
    let manifest_path = if path.ends_with(MANIFEST_FILE) {
        path.to_path_buf()
    } else {
        path.join(MANIFEST_FILE)
    };

    if !manifest_path.exists() {
        return Err(RachetError::config(format!("manifest not found at {}", manifest_path.display())));
    }

    let content = fs::read_to_string(&manifest_path)?;
    let manifest: Manifest = toml::from_str(&content)
        .map_err(|e| RachetError::config(format!("failed to parse {}: {}", manifest_path.display(), e)))?;
    manifest.validate()?;
    debug!(path = %manifest_path.display(), name = %manifest.package.name, "loaded manifest");
    Ok(manifest)
}

/// Walk up from `start` to the nearest directory holding a manifest.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(MANIFEST_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Scaffold a project in `path`; returns the project name.
pub fn init_project(path: &Path, name: Option<String>) -> RachetResult<String> {
    fs::create_dir_all(path)?;

    let manifest_path = path.join(MANIFEST_FILE);
    if manifest_path.exists() {
        return Err(RachetError::config(format!("{} already exists", manifest_path.display())));
    }

    let name = name.unwrap_or_else(|| {
        path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("rachet_project")
            .to_string()
    });

    let manifest = Manifest::new(&name);
    manifest.validate()?;
    let toml = toml::to_string_pretty(&manifest)
        .map_err(|e| RachetError::config(format!("failed to serialize manifest: {}", e)))?;
    fs::write(&manifest_path, toml)?;

    let entry = path.join(&manifest.build.entry);
    if let Some(dir) = entry.parent() {
        fs::create_dir_all(dir)?;
    }
    let main_src = format!(
        r#"// {} - entry point
use crate::iso;

fn main() {{
    print("Hello from Rachet!\n");
    os(halt);
}}
"#,
        name
    );
    fs::write(&entry, main_src)?;

    fs::write(path.join(".gitignore"), "build/\niso/\n*.o\n*.elf\n")?;

    debug!(name = %name, path = %path.display(), "initialized project");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_fill_missing_tables() {
        let manifest: Manifest = toml::from_str("[package]\nname = \"demo\"\n").unwrap();
        assert_eq!(manifest.build.entry, PathBuf::from("src/main.rx"));
        assert_eq!(manifest.build.output, PathBuf::from("build"));
        assert!(!manifest.build.keep_intermediates);
        assert_eq!(manifest.toolchain, ToolchainConfig::default());
        assert_eq!(manifest.toolchain.load_address, 0x100000);
    }

    #[test]
    fn test_toolchain_overrides() {
        let manifest: Manifest = toml::from_str(
            r#"
[package]
name = "demo"

[toolchain]
assembler = "/opt/nasm/bin/nasm"
load_address = 0x200000
kernel = "kernel/custom.asm"
"#,
        )
        .unwrap();
        assert_eq!(manifest.toolchain.assembler, "/opt/nasm/bin/nasm");
        assert_eq!(manifest.toolchain.load_address, 0x200000);
        assert_eq!(manifest.toolchain.kernel, Some(PathBuf::from("kernel/custom.asm")));
        assert_eq!(manifest.toolchain.linker, "ld");
    }

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("hello_os");
        let name = init_project(&root, None).unwrap();
        assert_eq!(name, "hello_os");

        let manifest = load_manifest(&root).unwrap();
        assert_eq!(manifest, Manifest::new("hello_os"));
        assert!(root.join("src/main.rx").is_file());
        assert!(root.join(".gitignore").is_file());
        assert_eq!(find_project_root(&root.join("src")), Some(root.clone()));
    }

    #[test]
    fn test_init_refuses_existing_project() {
        let dir = tempfile::tempdir().unwrap();
        init_project(dir.path(), Some("first".into())).unwrap();
        assert!(matches!(init_project(dir.path(), None), Err(RachetError::Config { .. })));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_manifest(dir.path()), Err(RachetError::Config { .. })));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "[package]\nname = \"../evil\"\n").unwrap();
        assert!(matches!(load_manifest(dir.path()), Err(RachetError::Config { .. })));
    }
}
