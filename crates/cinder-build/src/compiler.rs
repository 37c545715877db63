//! Shared library builds
//!
//! Compiles the binding shim and the unit's sources into a single shared
//! library with the system C compiler. Library files are named
//! `lib<name>-<fingerprint>.<ext>`, where the fingerprint covers the build
//! inputs and the bytes the compiler produced, so a library with different
//! content never reuses a path the dynamic loader has already seen in this
//! process.
//!
//! The compiler runs with the unit's working directory as its current
//! directory, which is where `-save-temps` output lands. Builds block until
//! the compiler exits; there is no timeout.

use cinder_core::{Fingerprint, Fingerprinter};
use cinder_parser::MacroDefinition;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while building a shared library
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{compiler} exited with {status}: {diagnostic}")]
    Failed {
        compiler: String,
        status: String,
        diagnostic: String,
    },

    #[error("failed to run {compiler}: {source}")]
    Spawn {
        compiler: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BuildError> for cinder_core::Error {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Io(e) => cinder_core::Error::Io(e),
            other => cinder_core::Error::Build(other.to_string()),
        }
    }
}

/// Everything needed to build one unit's library
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Unit name
    pub name: &'a str,
    /// Unit working directory
    pub work_dir: &'a Path,
    /// Binding shim source text
    pub shim: &'a str,
    /// Unit source files, compiled after the shim
    pub sources: &'a [PathBuf],
    /// Flags passed verbatim, in order
    pub compiler_flags: &'a [String],
    /// Macros passed as `-D` arguments, in order
    pub macros: &'a [MacroDefinition],
    /// Fingerprint of the build inputs
    pub fingerprint: &'a Fingerprint,
}

impl BuildRequest<'_> {
    /// Path the shim source is written to
    pub fn shim_path(&self) -> PathBuf {
        self.work_dir.join(format!("lib{}.c", self.name))
    }

    /// Library path for a given content fingerprint
    pub fn library_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.work_dir.join(library_file_name(self.name, fingerprint))
    }

    /// Path the compiler writes to before the library is named
    pub fn scratch_path(&self) -> PathBuf {
        self.work_dir.join(format!(
            "lib{}-{}.partial.{}",
            self.name,
            self.fingerprint,
            std::env::consts::DLL_EXTENSION
        ))
    }

    fn is_stale_library(&self, path: &Path, current: &Path) -> bool {
        path != current && is_library_of(self.name, path)
    }
}

/// `lib<name>-<fingerprint>.<ext>`
pub fn library_file_name(name: &str, fingerprint: &Fingerprint) -> String {
    format!("lib{}-{}.{}", name, fingerprint, std::env::consts::DLL_EXTENSION)
}

/// True for a finished library of unit `name`; scratch outputs excluded
pub fn is_library_of(name: &str, path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(rest) = file_name.strip_prefix(&format!("lib{}-", name)) else {
        return false;
    };
    match rest.strip_suffix(&format!(".{}", std::env::consts::DLL_EXTENSION)) {
        Some(fingerprint) => !fingerprint.is_empty() && fingerprint.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// A successfully built library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltLibrary {
    pub path: PathBuf,
    pub shim_path: PathBuf,
}

/// Builds shared libraries with a C compiler driver
#[derive(Debug, Clone)]
pub struct NativeBuilder {
    compiler: PathBuf,
    extra_args: Vec<String>,
}

impl NativeBuilder {
    pub fn new(compiler: PathBuf) -> Self {
        Self {
            compiler,
            extra_args: Vec::new(),
        }
    }

    /// Arguments appended after the unit's own flags
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    /// Arguments for building `output` from `request`
    fn build_args(&self, request: &BuildRequest, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-shared".to_string(),
            "-fPIC".to_string(),
            "-o".to_string(),
            output.display().to_string(),
            request.shim_path().display().to_string(),
        ];
        args.extend(request.sources.iter().map(|s| s.display().to_string()));
        args.extend(request.compiler_flags.iter().cloned());
        args.extend(self.extra_args.iter().cloned());
        args.extend(request.macros.iter().map(MacroDefinition::to_arg));
        args
    }

    /// Fingerprint of the request's inputs and this builder's command line
    fn input_fingerprint(&self, request: &BuildRequest) -> Fingerprint {
        let mut fingerprinter = Fingerprinter::new();
        fingerprinter
            .update(request.fingerprint.0.as_bytes())
            .update(self.compiler.to_string_lossy().as_bytes())
            .update(request.shim);
        for arg in self.build_args(request, Path::new("")) {
            fingerprinter.update(arg);
        }
        fingerprinter.finish()
    }

    /// Write the shim and compile the library.
    ///
    /// The compiler writes to a scratch file. On success the scratch file is
    /// named after its content, and a library already at that path is kept
    /// as is, so a library mapped by this process is never rewritten. Older
    /// libraries of the same unit are removed.
    pub fn build(&self, request: &BuildRequest) -> Result<BuiltLibrary, BuildError> {
        let shim_path = request.shim_path();
        fs::write(&shim_path, request.shim)?;

        let scratch = request.scratch_path();
        remove_if_exists(&scratch)?;

        let args = self.build_args(request, &scratch);
        debug!("Building '{}' with {:?} {:?}", request.name, self.compiler, args);

        let output = Command::new(&self.compiler)
            .args(&args)
            .current_dir(request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| BuildError::Spawn {
                compiler: self.compiler.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            remove_if_exists(&scratch)?;
            let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(BuildError::Failed {
                compiler: self.compiler.display().to_string(),
                status: output.status.to_string(),
                diagnostic: diagnostic.trim().to_string(),
            });
        }

        let mut fingerprinter = Fingerprinter::new();
        fingerprinter.update(self.input_fingerprint(request).0.as_bytes());
        fingerprinter.update(fs::read(&scratch)?);
        let library_path = request.library_path(&fingerprinter.finish());

        if library_path.is_file() {
            debug!("{:?} is unchanged", library_path);
            remove_if_exists(&scratch)?;
        } else {
            fs::rename(&scratch, &library_path)?;
        }
        self.remove_stale(request, &library_path);

        Ok(BuiltLibrary {
            path: library_path,
            shim_path,
        })
    }

    /// Remove libraries left by earlier builds of the same unit
    fn remove_stale(&self, request: &BuildRequest, current: &Path) {
        let Ok(entries) = fs::read_dir(request.work_dir) else {
            return;
        };
        for path in entries.flatten().map(|e| e.path()) {
            if request.is_stale_library(&path, current) {
                debug!("Removing stale library {:?}", path);
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove stale library {:?}: {}", path, e);
                }
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_parser::preprocessor::find_compiler;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fingerprint() -> Fingerprint {
        Fingerprint("0123456789abcdef".to_string())
    }

    fn answer_request<'a>(work_dir: &'a Path, fingerprint: &'a Fingerprint) -> BuildRequest<'a> {
        BuildRequest {
            name: "unit",
            work_dir,
            shim: "int cinder_answer(void) { return 42; }\n",
            sources: &[],
            compiler_flags: &[],
            macros: &[],
            fingerprint,
        }
    }

    #[test]
    fn test_library_path_uses_fingerprint() {
        let work_dir = PathBuf::from("/tmp/cinder/unit");
        let fp = fingerprint();
        let request = BuildRequest {
            name: "unit",
            work_dir: &work_dir,
            shim: "",
            sources: &[],
            compiler_flags: &[],
            macros: &[],
            fingerprint: &fp,
        };

        let ext = std::env::consts::DLL_EXTENSION;
        let current = request.library_path(&fp);
        assert_eq!(request.shim_path(), work_dir.join("libunit.c"));
        assert_eq!(current, work_dir.join(format!("libunit-0123456789abcdef.{ext}")));
        assert_eq!(request.scratch_path(), work_dir.join(format!("libunit-0123456789abcdef.partial.{ext}")));

        assert!(request.is_stale_library(&work_dir.join(format!("libunit-ffffffffffffffff.{ext}")), &current));
        assert!(!request.is_stale_library(&current, &current));
        assert!(!request.is_stale_library(&request.scratch_path(), &current));
        assert!(!request.is_stale_library(&work_dir.join(format!("libother-ffffffffffffffff.{ext}")), &current));
        assert!(!request.is_stale_library(&work_dir.join("libunit.c"), &current));
    }

    #[test]
    fn test_build_args_order() {
        let work_dir = PathBuf::from("/w");
        let fp = fingerprint();
        let sources = vec![PathBuf::from("/src/a.c")];
        let flags = vec!["-O2".to_string()];
        let macros = vec![MacroDefinition::with_value("NAME", "foo7")];
        let request = BuildRequest {
            name: "unit",
            work_dir: &work_dir,
            shim: "",
            sources: &sources,
            compiler_flags: &flags,
            macros: &macros,
            fingerprint: &fp,
        };
        let builder = NativeBuilder::new("cc".into()).with_extra_args(vec!["-g".to_string()]);

        let args = builder.build_args(&request, Path::new("/w/out.so"));

        assert_eq!(
            args,
            vec!["-shared", "-fPIC", "-o", "/w/out.so", "/w/libunit.c", "/src/a.c", "-O2", "-g", "-DNAME=foo7"]
        );
    }

    #[test]
    fn test_failed_build_leaves_no_library() {
        let Ok(compiler) = find_compiler(None) else {
            eprintln!("no C compiler, skipping");
            return;
        };
        let temp = TempDir::new().unwrap();
        let fp = fingerprint();
        let request = BuildRequest {
            name: "broken",
            work_dir: temp.path(),
            shim: "this is not C",
            sources: &[],
            compiler_flags: &[],
            macros: &[],
            fingerprint: &fp,
        };

        let err = NativeBuilder::new(compiler).build(&request).unwrap_err();

        assert!(matches!(err, BuildError::Failed { .. }));
        assert!(!request.scratch_path().exists());
        assert!(!temp.path().read_dir().unwrap().flatten().any(|e| is_library_of("broken", &e.path())));
        assert!(matches!(cinder_core::Error::from(err), cinder_core::Error::Build(_)));
    }

    #[test]
    fn test_rebuild_replaces_stale_library() {
        let Ok(compiler) = find_compiler(None) else {
            eprintln!("no C compiler, skipping");
            return;
        };
        let temp = TempDir::new().unwrap();
        let builder = NativeBuilder::new(compiler);

        let old = Fingerprint("aaaaaaaaaaaaaaaa".to_string());
        let new = Fingerprint("bbbbbbbbbbbbbbbb".to_string());

        let first = builder.build(&answer_request(temp.path(), &old)).unwrap();
        assert!(first.path.exists());

        let second = builder.build(&answer_request(temp.path(), &new)).unwrap();
        assert!(second.path.exists());
        assert!(!first.path.exists());
        assert_eq!(second.shim_path, temp.path().join("libunit.c"));
    }

    #[test]
    fn test_library_name_follows_command_line() {
        let Ok(compiler) = find_compiler(None) else {
            eprintln!("no C compiler, skipping");
            return;
        };
        let temp = TempDir::new().unwrap();
        let fp = fingerprint();

        let plain = NativeBuilder::new(compiler.clone());
        let first = plain.build(&answer_request(temp.path(), &fp)).unwrap();
        let again = plain.build(&answer_request(temp.path(), &fp)).unwrap();
        assert_eq!(first.path, again.path);
        assert!(!answer_request(temp.path(), &fp).scratch_path().exists());

        let tuned = NativeBuilder::new(compiler).with_extra_args(vec!["-O2".to_string()]);
        let changed = tuned.build(&answer_request(temp.path(), &fp)).unwrap();
        assert_ne!(changed.path, first.path);
        assert!(!first.path.exists());
    }

    #[test]
    fn test_is_library_of() {
        let ext = std::env::consts::DLL_EXTENSION;
        assert!(is_library_of("unit", Path::new(&format!("/w/libunit-00ff.{ext}"))));
        assert!(!is_library_of("unit", Path::new(&format!("/w/libunit-00ff.partial.{ext}"))));
        assert!(!is_library_of("unit", Path::new(&format!("/w/libunit-extra-00ff.{ext}"))));
        assert!(!is_library_of("unit", Path::new("/w/libunit.c")));
    }
}
