//! Dynamic loading
//!
//! Opens a built library with immediate binding and reads back the symbol
//! and layout tables exported by the binding shim.

use libloading::Library;
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::shim::{LAYOUT_TABLE, SYMBOL_TABLE};

/// Errors raised while loading a library
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("{} does not export {table}: {reason}", path.display())]
    MissingTable {
        path: PathBuf,
        table: &'static str,
        reason: String,
    },
}

impl From<LoadError> for cinder_core::Error {
    fn from(err: LoadError) -> Self {
        cinder_core::Error::Load(err.to_string())
    }
}

/// Size and alignment of a C type, as compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeLayout {
    pub size: usize,
    pub align: usize,
}

#[repr(C)]
struct RawSymbolEntry {
    name: *const c_char,
    address: *mut c_void,
}

#[repr(C)]
struct RawLayoutEntry {
    name: *const c_char,
    size: usize,
    align: usize,
}

/// A loaded library and the contents of its tables.
///
/// Addresses stay valid for as long as this value is alive.
#[derive(Debug)]
pub struct LoadedLibrary {
    path: PathBuf,
    symbols: HashMap<String, usize>,
    symbol_order: Vec<String>,
    layouts: HashMap<String, TypeLayout>,
    _library: Library,
}

impl LoadedLibrary {
    /// Load `path` and read its tables
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        debug!("Loading {:?}", path);
        let library = open_library(path).map_err(|e| LoadError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut symbols = HashMap::new();
        let mut symbol_order = Vec::new();
        // SAFETY: the table is an array of `cinder_symbol_entry` terminated
        // by a null name, as emitted by the shim generator.
        unsafe {
            let mut entry = table_start::<RawSymbolEntry>(&library, path, SYMBOL_TABLE)?;
            while !(*entry).name.is_null() {
                let name = CStr::from_ptr((*entry).name).to_string_lossy().into_owned();
                symbols.insert(name.clone(), (*entry).address as usize);
                symbol_order.push(name);
                entry = entry.add(1);
            }
        }

        let mut layouts = HashMap::new();
        // SAFETY: as above, for `cinder_layout_entry`.
        unsafe {
            let mut entry = table_start::<RawLayoutEntry>(&library, path, LAYOUT_TABLE)?;
            while !(*entry).name.is_null() {
                let name = CStr::from_ptr((*entry).name).to_string_lossy().into_owned();
                layouts.insert(
                    name,
                    TypeLayout {
                        size: (*entry).size,
                        align: (*entry).align,
                    },
                );
                entry = entry.add(1);
            }
        }

        debug!(
            "Loaded {:?}: {} symbols, {} layouts",
            path,
            symbols.len(),
            layouts.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            symbols,
            symbol_order,
            layouts,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Address of a declared symbol
    pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
        self.symbols.get(name).map(|&address| address as *mut c_void)
    }

    /// Declared symbol names, in table order
    pub fn symbol_names(&self) -> &[String] {
        &self.symbol_order
    }

    /// Layout of a sized type, by C name (`struct s_t`, `my_typedef`)
    pub fn layout(&self, type_name: &str) -> Option<TypeLayout> {
        self.layouts.get(type_name).copied()
    }

    pub fn layouts(&self) -> &HashMap<String, TypeLayout> {
        &self.layouts
    }
}

/// Address of the first entry of an exported table
unsafe fn table_start<T>(library: &Library, path: &Path, table: &'static str) -> Result<*const T, LoadError> {
    let mut symbol_name = table.as_bytes().to_vec();
    symbol_name.push(0);
    let symbol = library
        .get::<*const T>(&symbol_name)
        .map_err(|e| LoadError::MissingTable {
            path: path.to_path_buf(),
            table,
            reason: e.to_string(),
        })?;
    Ok(*symbol)
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    // SAFETY: loading runs the library's initializers; the library is built
    // from the unit's own sources.
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL)? };
    Ok(library.into())
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: see the unix variant.
    unsafe { Library::new(path) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{BuildRequest, NativeBuilder};
    use crate::shim::generate_shim;
    use cinder_core::Fingerprint;
    use cinder_parser::preprocessor::find_compiler;
    use cinder_parser::InterfaceDeclaration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Build a sample library, or `None` when no compiler is installed
    fn build(temp: &TempDir, preamble: &str, cdef: &str) -> Option<PathBuf> {
        let compiler = find_compiler(None).ok()?;
        let decl = InterfaceDeclaration::parse(cdef).unwrap();
        let shim = generate_shim(preamble, &decl);
        let fingerprint = Fingerprint("feedfacefeedface".to_string());
        let request = BuildRequest {
            name: "sample",
            work_dir: temp.path(),
            shim: &shim,
            sources: &[],
            compiler_flags: &[],
            macros: &[],
            fingerprint: &fingerprint,
        };
        Some(NativeBuilder::new(compiler).build(&request).unwrap().path)
    }

    #[test]
    fn test_reads_symbols_and_layouts() {
        let temp = TempDir::new().unwrap();
        let preamble = r#"
struct pair { char tag; double value; };
int counter = 7;
int add2(int a, int b) { return a + b; }
"#;
        let cdef = "struct pair { char tag; double value; };\nint add2(int a, int b);\nextern int counter;";
        let Some(path) = build(&temp, preamble, cdef) else {
            eprintln!("no C compiler, skipping");
            return;
        };

        let library = LoadedLibrary::open(&path).unwrap();

        assert_eq!(library.symbol_names(), &["add2".to_string(), "counter".to_string()]);
        let layout = library.layout("struct pair").unwrap();
        assert_eq!(layout.align, std::mem::align_of::<f64>());
        assert_eq!(layout.size, 2 * std::mem::align_of::<f64>().max(std::mem::size_of::<f64>()));

        let add2 = library.symbol("add2").unwrap();
        let add2: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(add2) };
        assert_eq!(add2(2, 3), 5);

        let counter = library.symbol("counter").unwrap() as *const i32;
        assert_eq!(unsafe { *counter }, 7);
        assert!(library.symbol("missing").is_none());
    }

    #[test]
    fn test_undefined_symbol_fails_to_load() {
        let temp = TempDir::new().unwrap();
        let Some(path) = build(&temp, "int nowhere(void);", "int nowhere(void);") else {
            eprintln!("no C compiler, skipping");
            return;
        };

        let err = LoadedLibrary::open(&path).unwrap_err();

        assert!(matches!(err, LoadError::Open { .. }));
        assert!(matches!(cinder_core::Error::from(err), cinder_core::Error::Load(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = LoadedLibrary::open(Path::new("/nonexistent/libnothing.so")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
