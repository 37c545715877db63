//! Loaded modules
//!
//! [`ModuleProxy`] is the caller's view of a built library: every declared
//! function and global variable resolved to an address, allocation helpers
//! sized from the compiled layout table, and the parsed interface
//! declaration for introspection.

use cinder_build::{LoadedLibrary, TypeLayout};
use cinder_core::{Error, Result};
use cinder_parser::InterfaceDeclaration;
use std::alloc::{self, Layout};
use std::ffi::{c_char, c_void, CStr};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    name: String,
    library: LoadedLibrary,
    declaration: InterfaceDeclaration,
}

/// A loaded module. Cheap to clone; the library stays loaded while any
/// clone is alive.
#[derive(Debug, Clone)]
pub struct ModuleProxy {
    inner: Arc<Inner>,
}

impl ModuleProxy {
    pub(crate) fn new(name: &str, library: LoadedLibrary, declaration: InterfaceDeclaration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                library,
                declaration,
            }),
        }
    }

    /// Unit name the module was built from
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn library_path(&self) -> &Path {
        self.inner.library.path()
    }

    /// True when both proxies share one loaded library
    pub fn same_module(&self, other: &ModuleProxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // Symbols

    pub fn address(&self, name: &str) -> Option<*mut c_void> {
        self.inner.library.symbol(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.address(name).is_some()
    }

    /// Declared functions and variables, in declaration order
    pub fn symbol_names(&self) -> &[String] {
        self.inner.library.symbol_names()
    }

    fn require(&self, name: &str) -> Result<*mut c_void> {
        self.address(name).ok_or_else(|| {
            Error::InvalidArgument(format!("module '{}' has no symbol `{}`", self.name(), name))
        })
    }

    /// Typed pointer to a declared function.
    ///
    /// `F` must be an `extern "C" fn` type.
    ///
    /// # Safety
    ///
    /// `F` must match the C signature of `name`.
    pub unsafe fn function<F: Copy>(&self, name: &str) -> Result<F> {
        if std::mem::size_of::<F>() != std::mem::size_of::<*mut c_void>() {
            return Err(Error::InvalidArgument(format!(
                "`{}` cannot be viewed as a {}",
                name,
                std::any::type_name::<F>()
            )));
        }
        let address = self.require(name)?;
        Ok(std::mem::transmute_copy::<*mut c_void, F>(&address))
    }

    /// Pointer to a declared global variable
    pub fn variable<T>(&self, name: &str) -> Result<*mut T> {
        Ok(self.require(name)?.cast::<T>())
    }

    // Allocation

    /// Compiled size and alignment of a sized type
    pub fn layout(&self, type_name: &str) -> Option<TypeLayout> {
        self.inner.library.layout(&normalize_type_name(type_name))
    }

    /// Zero-initialized instance of `type_name`: `struct x`, `union x`,
    /// `enum x`, a typedef name or a builtin scalar such as `int`, `double`
    /// or `uint32_t`
    pub fn allocate(&self, type_name: &str) -> Result<NativeBox> {
        let layout = self.layout(type_name).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "module '{}' has no sized type `{}`",
                self.name(),
                type_name
            ))
        })?;
        NativeBox::zeroed(&normalize_type_name(type_name), layout)
    }

    /// Byte buffer holding NUL-terminated text, or `n` zero bytes
    pub fn allocate_buffer(&self, source: impl Into<BufferSource>) -> Result<NativeBuffer> {
        match source.into() {
            BufferSource::Text(text) => {
                if text.contains('\0') {
                    return Err(Error::InvalidArgument(
                        "buffer text contains an interior NUL".to_string(),
                    ));
                }
                let mut bytes = text.into_bytes();
                bytes.push(0);
                Ok(NativeBuffer { bytes })
            }
            BufferSource::Length(len) => Ok(NativeBuffer { bytes: vec![0; len] }),
        }
    }

    /// Text up to the first NUL, trailing whitespace trimmed
    pub fn read_string(&self, buffer: &NativeBuffer) -> String {
        buffer.to_string_lossy()
    }

    /// Copy a NUL-terminated string returned by native code
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a valid NUL-terminated string.
    pub unsafe fn read_c_str(&self, ptr: *const c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        Some(CStr::from_ptr(ptr).to_string_lossy().trim_end().to_string())
    }

    // Metadata

    /// Preprocessed interface declaration the module was bound from
    pub fn cdef(&self) -> &str {
        self.inner.declaration.text()
    }

    pub fn declaration(&self) -> &InterfaceDeclaration {
        &self.inner.declaration
    }

    pub fn struct_names(&self) -> Vec<String> {
        self.inner.declaration.struct_names()
    }

    pub fn union_names(&self) -> Vec<String> {
        self.inner.declaration.union_names()
    }

    pub fn enum_names(&self) -> Vec<String> {
        self.inner.declaration.enum_names()
    }

    pub fn typedef_names(&self) -> Vec<String> {
        self.inner.declaration.typedef_names()
    }

    /// C declaration of typedef `name`, declaring `alias` (or a bare type)
    pub fn typedef_declaration(&self, name: &str, alias: Option<&str>) -> Result<String> {
        self.inner
            .declaration
            .typedef(name)
            .map(|t| t.rendered.render(alias))
            .ok_or_else(|| Error::InvalidArgument(format!("no typedef `{}`", name)))
    }

    /// C declaration of function `name`, declaring `alias` (or a bare type)
    pub fn function_declaration(&self, name: &str, alias: Option<&str>) -> Result<String> {
        self.inner
            .declaration
            .function(name)
            .map(|f| f.rendered.render(alias))
            .ok_or_else(|| Error::InvalidArgument(format!("no function `{}`", name)))
    }
}

fn normalize_type_name(type_name: &str) -> String {
    type_name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Input to [`ModuleProxy::allocate_buffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferSource {
    Text(String),
    Length(usize),
}

impl From<&str> for BufferSource {
    fn from(text: &str) -> Self {
        BufferSource::Text(text.to_string())
    }
}

impl From<String> for BufferSource {
    fn from(text: String) -> Self {
        BufferSource::Text(text)
    }
}

impl From<usize> for BufferSource {
    fn from(len: usize) -> Self {
        BufferSource::Length(len)
    }
}

/// Caller-owned byte buffer for passing `char *` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBuffer {
    bytes: Vec<u8>,
}

impl NativeBuffer {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.bytes.as_ptr().cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_char {
        self.bytes.as_mut_ptr().cast()
    }

    /// Text up to the first NUL, trailing whitespace trimmed
    pub fn to_string_lossy(&self) -> String {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end]).trim_end().to_string()
    }
}

/// Caller-owned, zero-initialized instance of a C type. Freed on drop.
#[derive(Debug)]
pub struct NativeBox {
    ptr: NonNull<u8>,
    layout: Layout,
    type_name: String,
}

impl NativeBox {
    fn zeroed(type_name: &str, type_layout: TypeLayout) -> Result<Self> {
        // Zero-sized C types (GNU empty structs) still get a unique address.
        let layout = Layout::from_size_align(type_layout.size.max(1), type_layout.align.max(1))
            .map_err(|e| Error::InvalidArgument(format!("bad layout for `{}`: {}", type_name, e)))?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Ok(Self {
            ptr,
            layout,
            type_name: type_name.to_string(),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Allocated size in bytes
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// The instance viewed as `T`
    pub fn cast<T>(&self) -> *mut T {
        self.ptr.as_ptr().cast()
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the allocation is `layout.size()` initialized bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for NativeBox {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
