//! Declaration synthesis through a native library

use cinder_core::Result;
use cinder_parser::{DeclarationSynthesizer, SynthesisError};
use std::ffi::{c_char, c_int, CString};

use crate::proxy::ModuleProxy;

/// Exported entry point of a native synthesizer library
pub const MAKE_HEADER: &str = "make_header";

type MakeHeaderFn = unsafe extern "C" fn(*const c_char, *mut c_char) -> c_int;

/// Synthesizer calling `int make_header(char const *source, char *header)`
/// in a loaded module.
///
/// The header buffer is one byte longer than the source, so the native side
/// may write at most as many bytes as it was given plus the terminator.
#[derive(Debug, Clone)]
pub struct NativeSynthesizer {
    module: ModuleProxy,
    make_header: MakeHeaderFn,
}

impl NativeSynthesizer {
    pub fn new(module: ModuleProxy) -> Result<Self> {
        // SAFETY: the module declares `make_header` with exactly this signature.
        let make_header = unsafe { module.function::<MakeHeaderFn>(MAKE_HEADER)? };
        Ok(Self { module, make_header })
    }

    pub fn module(&self) -> &ModuleProxy {
        &self.module
    }

    /// Declarations for `source`, trimmed
    pub fn make(&self, source: &str) -> std::result::Result<String, SynthesisError> {
        let source_buffer = CString::new(source)
            .map_err(|_| SynthesisError::Native("source contains an interior NUL".to_string()))?;
        let mut header_buffer = self
            .module
            .allocate_buffer(source.len() + 1)
            .map_err(|e| SynthesisError::Native(e.to_string()))?;

        // SAFETY: both buffers are NUL-terminated and outlive the call; the
        // header buffer has room for `source.len()` bytes plus a terminator.
        let status = unsafe { (self.make_header)(source_buffer.as_ptr(), header_buffer.as_mut_ptr()) };
        if status != 0 {
            return Err(SynthesisError::Native(format!("{} returned {}", MAKE_HEADER, status)));
        }

        Ok(self.module.read_string(&header_buffer).trim().to_string())
    }
}

impl DeclarationSynthesizer for NativeSynthesizer {
    fn name(&self) -> &str {
        "native"
    }

    fn synthesize(&self, source: &str) -> std::result::Result<String, SynthesisError> {
        self.make(source)
    }
}
