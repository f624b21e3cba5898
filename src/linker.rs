//! Toolchain driver: assembler, linker and ISO builder
//!
//! Linking is planned first and executed second. The plan is plain data so
//! `--dry-run` can print it and tests can inspect it without any tool
//! installed.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::ast::CrateTarget;
use crate::codegen::Generated;
use crate::config::ToolchainConfig;
use crate::error::{RachetError, RachetResult};
use crate::runtime;

pub const UNIT_FILE: &str = "rachet.asm";
pub const OBJECT_FILE: &str = "rachet.o";
pub const ELF_FILE: &str = "kernel.elf";
pub const ISO_DIR: &str = "iso";

#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Where intermediates and the artifact are written
    pub out_dir: PathBuf,
    /// Artifact stem, `<name>.bin` or `<name>.iso`
    pub name: String,
    pub target: CrateTarget,
    pub toolchain: ToolchainConfig,
    pub keep_intermediates: bool,
}

impl LinkOptions {
    pub fn artifact(&self) -> PathBuf {
        self.out_dir.join(format!("{}.{}", self.name, self.target.extension()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CreateDir(PathBuf),
    Write { path: PathBuf, contents: String },
    Run { tool: String, args: Vec<OsString> },
    Rename { from: PathBuf, to: PathBuf },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CreateDir(path) => write!(f, "mkdir -p {}", path.display()),
            Step::Write { path, contents } => write!(f, "write {} ({} bytes)", path.display(), contents.len()),
            Step::Run { tool, args } => {
                write!(f, "{}", tool)?;
                for arg in args {
                    write!(f, " {}", arg.to_string_lossy())?;
                }
                Ok(())
            }
            Step::Rename { from, to } => write!(f, "mv {} {}", from.display(), to.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkPlan {
    pub steps: Vec<Step>,
    pub artifact: PathBuf,
    /// Removed after a successful run unless intermediates are kept
    pub intermediates: Vec<PathBuf>,
}

impl LinkPlan {
    pub fn execute(&self) -> RachetResult<PathBuf> {
        for step in &self.steps {
            debug!(step = %step, "link step");
            match step {
                Step::CreateDir(path) => fs::create_dir_all(path)?,
                Step::Write { path, contents } => fs::write(path, contents)?,
                Step::Run { tool, args } => run_tool(tool, args)?,
                Step::Rename { from, to } => fs::rename(from, to)?,
            }
        }

        for path in &self.intermediates {
            remove_path(path)?;
        }

        info!(artifact = %self.artifact.display(), "created artifact");
        Ok(self.artifact.clone())
    }
}

/// Kernel preamble followed by the data and text sections of the program
pub fn render_unit(kernel: &str, data: &str, text: &str) -> String {
    format!("{}\n\nsection .data\n{}\n\nsection .text\n{}", kernel.trim_end(), data, text)
}

pub fn grub_config(title: &str) -> String {
    format!(
        "set timeout=0\nset default=0\n\nmenuentry \"{}\" {{\n    multiboot /boot/{}\n    boot\n}}\n",
        title, ELF_FILE
    )
}

pub fn plan(opts: &LinkOptions, unit: String) -> LinkPlan {
    let tc = &opts.toolchain;
    let unit_path = opts.out_dir.join(UNIT_FILE);
    let object = opts.out_dir.join(OBJECT_FILE);
    let elf = opts.out_dir.join(ELF_FILE);
    let artifact = opts.artifact();

    let mut steps = vec![
        Step::CreateDir(opts.out_dir.clone()),
        Step::Write { path: unit_path.clone(), contents: unit },
        Step::Run {
            tool: tc.assembler.clone(),
            args: vec![
                unit_path.clone().into(),
                "-f".into(),
                "elf32".into(),
                "-o".into(),
                object.clone().into(),
            ],
        },
        Step::Run {
            tool: tc.linker.clone(),
            args: vec![
                "-m".into(),
                "elf_i386".into(),
                "-Ttext".into(),
                format!("{:#x}", tc.load_address).into(),
                object.clone().into(),
                "-o".into(),
                elf.clone().into(),
            ],
        },
    ];
    let mut intermediates = vec![unit_path, object];

    match opts.target {
        CrateTarget::Bin => steps.push(Step::Rename { from: elf, to: artifact.clone() }),
        CrateTarget::Iso => {
            let iso_root = opts.out_dir.join(ISO_DIR);
            let boot = iso_root.join("boot");
            let grub = boot.join("grub");
            steps.extend([
                Step::CreateDir(grub.clone()),
                Step::Write { path: grub.join("grub.cfg"), contents: grub_config(&tc.iso_title) },
                Step::Rename { from: elf, to: boot.join(ELF_FILE) },
                Step::Run {
                    tool: tc.iso_tool.clone(),
                    args: vec![
                        format!("--output={}", artifact.display()).into(),
                        iso_root.clone().into(),
                    ],
                },
            ]);
            intermediates.push(iso_root);
        }
    }

    if opts.keep_intermediates {
        intermediates.clear();
    }
    LinkPlan { steps, artifact, intermediates }
}

/// Assemble, link and package a generated unit.
pub fn link(generated: &Generated, opts: &LinkOptions) -> RachetResult<PathBuf> {
    let kernel = runtime::load_preamble(opts.toolchain.kernel.as_deref())?;
    let unit = render_unit(&kernel, &generated.data_asm(), &generated.text_asm());
    plan(opts, unit).execute()
}

fn run_tool(tool: &str, args: &[OsString]) -> RachetResult<()> {
    let path = which::which(tool)
        .map_err(|e| RachetError::toolchain(tool, format!("not found on PATH: {}", e)))?;
    let output = Command::new(&path)
        .args(args)
        .output()
        .map_err(|e| RachetError::toolchain(tool, format!("failed to start: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RachetError::toolchain(
            tool,
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }
    Ok(())
}

fn remove_path(path: &Path) -> RachetResult<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Delete intermediates, the staged ISO tree and both artifacts for `name`.
pub fn clean(out_dir: &Path, name: &str) -> RachetResult<Vec<PathBuf>> {
    let candidates = [
        out_dir.join(UNIT_FILE),
        out_dir.join(OBJECT_FILE),
        out_dir.join(ELF_FILE),
        out_dir.join(ISO_DIR),
        out_dir.join(format!("{}.{}", name, CrateTarget::Bin.extension())),
        out_dir.join(format!("{}.{}", name, CrateTarget::Iso.extension())),
    ];

    let mut removed = Vec::new();
    for path in candidates {
        if path.exists() {
            remove_path(&path)?;
            removed.push(path);
        }
    }
    debug!(count = removed.len(), dir = %out_dir.display(), "cleaned build outputs");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn options(target: CrateTarget) -> LinkOptions {
        LinkOptions {
            out_dir: PathBuf::from("build"),
            name: "hello".into(),
            target,
            toolchain: ToolchainConfig::default(),
            keep_intermediates: false,
        }
    }

    fn commands(plan: &LinkPlan) -> Vec<String> {
        plan.steps
            .iter()
            .filter(|s| matches!(s, Step::Run { .. }))
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_unit_layout() {
        let unit = render_unit("bits 32\n", "msg: db \"hi\", 0\n", "global main\n");
        assert_eq!(unit, "bits 32\n\nsection .data\nmsg: db \"hi\", 0\n\n\nsection .text\nglobal main\n");
    }

    #[test]
    fn test_bin_plan() {
        let plan = plan(&options(CrateTarget::Bin), String::new());
        assert_eq!(
            commands(&plan),
            vec![
                "nasm build/rachet.asm -f elf32 -o build/rachet.o",
                "ld -m elf_i386 -Ttext 0x100000 build/rachet.o -o build/kernel.elf",
            ]
        );
        assert_eq!(
            plan.steps.last(),
            Some(&Step::Rename { from: "build/kernel.elf".into(), to: "build/hello.bin".into() })
        );
        assert_eq!(plan.artifact, PathBuf::from("build/hello.bin"));
        assert_eq!(plan.intermediates, vec![PathBuf::from("build/rachet.asm"), PathBuf::from("build/rachet.o")]);
    }

    #[test]
    fn test_iso_plan() {
        let plan = plan(&options(CrateTarget::Iso), String::new());
        assert_eq!(
            commands(&plan).last().map(String::as_str),
            Some("grub-mkrescue --output=build/hello.iso build/iso")
        );
        assert!(plan.steps.contains(&Step::Rename {
            from: "build/kernel.elf".into(),
            to: "build/iso/boot/kernel.elf".into(),
        }));
        assert!(plan.intermediates.contains(&PathBuf::from("build/iso")));
    }

    #[test]
    fn test_keep_intermediates() {
        let mut opts = options(CrateTarget::Iso);
        opts.keep_intermediates = true;
        assert!(plan(&opts, String::new()).intermediates.is_empty());
    }

    #[test]
    fn test_custom_load_address() {
        let mut opts = options(CrateTarget::Bin);
        opts.toolchain.load_address = 0x200000;
        assert!(commands(&plan(&opts, String::new()))[1].contains("-Ttext 0x200000"));
    }

    #[test]
    fn test_grub_config() {
        let cfg = grub_config("Rachet OS");
        assert!(cfg.starts_with("set timeout=0\nset default=0\n"));
        assert!(cfg.contains("menuentry \"Rachet OS\" {"));
        assert!(cfg.contains("multiboot /boot/kernel.elf"));
    }

    #[test]
    fn test_missing_tool_is_toolchain_error() {
        let err = run_tool("rachet-no-such-assembler", &[]).unwrap_err();
        assert!(matches!(err, RachetError::Toolchain { ref tool, .. } if tool == "rachet-no-such-assembler"));
    }

    #[test]
    fn test_clean_removes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        fs::write(out.join(UNIT_FILE), "x").unwrap();
        fs::write(out.join("hello.iso"), "x").unwrap();
        fs::create_dir_all(out.join("iso/boot/grub")).unwrap();
        fs::write(out.join("keep.txt"), "x").unwrap();

        let removed = clean(out, "hello").unwrap();
        assert_eq!(removed.len(), 3);
        assert!(!out.join(ISO_DIR).exists());
        assert!(out.join("keep.txt").exists());
    }

    #[test]
    fn test_link_reports_missing_assembler() {
        let dir = tempfile::tempdir().unwrap();
        let generated = crate::compile("fn main() { }").unwrap();
        let mut opts = options(CrateTarget::Bin);
        opts.out_dir = dir.path().to_path_buf();
        opts.toolchain.assembler = "rachet-no-such-assembler".into();
        let err = link(&generated, &opts).unwrap_err();
        assert!(matches!(err, RachetError::Toolchain { .. }));
        let unit = fs::read_to_string(dir.path().join(UNIT_FILE)).unwrap();
        assert!(unit.starts_with("; Rachet kernel runtime"));
        assert!(unit.ends_with("    ret\n"));
    }

    #[test]
    fn test_execute_stages_files_before_tools() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(CrateTarget::Bin);
        opts.out_dir = dir.path().join("out");
        opts.toolchain.assembler = "rachet-no-such-assembler".into();
        let err = plan(&opts, "bits 32\n".into()).execute().unwrap_err();
        assert!(matches!(err, RachetError::Toolchain { .. }));
        assert_eq!(fs::read_to_string(opts.out_dir.join(UNIT_FILE)).unwrap(), "bits 32\n");
    }
}
