// build.rs
// Compiles the demo shaders under resources/shaders to SPIR-V in target/shaders

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 2] = ["vert", "frag"];

/// `resources/shaders/a/b.vert` -> `target/shaders/a/b.vert.spv`
fn output_path(source: &Path, shader_root: &Path, target_root: &Path) -> Option<PathBuf> {
    let relative = source.strip_prefix(shader_root).ok()?;
    let mut file_name = relative.file_name()?.to_os_string();
    file_name.push(".spv");
    Some(target_root.join(relative).with_file_name(file_name))
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|m| m.modified()),
        std::fs::metadata(output).and_then(|m| m.modified()),
    ) {
        (Ok(source_time), Ok(output_time)) => source_time > output_time,
        _ => true,
    }
}

/// Recursively compile every shader stage file below `dir`
fn compile_shaders_recursive(dir: &Path, shader_root: &Path, target_root: &Path, glslc: &Path, compiled: &mut u32) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", dir);
            return;
        }
    };

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                eprintln!("warning: Error reading shader directory entry: {}", e);
                continue;
            }
        };

        if path.is_dir() {
            compile_shaders_recursive(&path, shader_root, target_root, glslc, compiled);
            continue;
        }

        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| SHADER_STAGES.contains(&ext));
        if !is_stage {
            continue;
        }

        let Some(output) = output_path(&path, shader_root, target_root) else {
            eprintln!("warning: Skipping shader outside {:?}: {:?}", shader_root, path);
            continue;
        };
        if !needs_compile(&path, &output) {
            continue;
        }
        if let Some(parent) = output.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("warning: Failed to create {:?}: {}", parent, e);
                continue;
            }
        }

        let status = Command::new(glslc)
            .arg("-I")
            .arg(shader_root)
            .arg(&path)
            .arg("-o")
            .arg(&output)
            .status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {:?} -> {:?}", path, output);
                *compiled += 1;
            }
            Ok(s) => panic!("glslc failed for {:?} with exit code {}", path, s.code().unwrap_or(-1)),
            Err(e) => panic!("Failed to run glslc for {:?}: {}", path, e),
        }
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").map(PathBuf::from).unwrap_or_default();
    let workspace_root = manifest_dir.parent().map(Path::to_path_buf).unwrap_or(manifest_dir);
    let shader_root = workspace_root.join("resources").join("shaders");
    let target_root = workspace_root.join("target").join("shaders");
    println!("cargo:rerun-if-changed={}", shader_root.display());

    if env::var_os("SKIP_SHADERS").is_some() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Some(vulkan_sdk) = env::var_os("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, shader compilation skipped");
        return;
    };
    let glslc = if cfg!(target_os = "windows") {
        Path::new(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        Path::new(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        println!("cargo:warning=glslc not found at {}, shader compilation skipped", glslc.display());
        return;
    }

    let mut compiled = 0;
    compile_shaders_recursive(&shader_root, &shader_root, &target_root, &glslc, &mut compiled);
    if compiled > 0 {
        eprintln!("info: Compiled {} shader(s)", compiled);
    } else {
        eprintln!("info: All shaders are up to date");
    }
}
