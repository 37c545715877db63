//! Binding shim generation
//!
//! The shim is compiled into the shared library next to the unit's own
//! sources. It includes the unit's headers and exports two tables the
//! loader reads back:
//!
//! - `cinder_symbol_table`: name and address of every declared symbol
//! - `cinder_layout_table`: name, size and alignment of every sized type
//!
//! The standard `<stddef.h>`, `<stdint.h>` and `<stdbool.h>` headers come
//! before the unit's headers, since synthesized headers use their types
//! without including them. Builtin scalar types are always in the layout
//! table.
//!
//! Both end with an all-zero sentinel. Taking the address of each symbol
//! forces the dynamic linker to resolve it when the library is loaded, so a
//! declaration without a definition fails at load time instead of at call
//! time.

use cinder_parser::InterfaceDeclaration;
use std::fmt::Write;

/// Exported symbol table name
pub const SYMBOL_TABLE: &str = "cinder_symbol_table";
/// Exported layout table name
pub const LAYOUT_TABLE: &str = "cinder_layout_table";

/// Standard headers included ahead of the preamble
const STANDARD_HEADERS: [&str; 3] = ["stddef.h", "stdint.h", "stdbool.h"];

/// Scalar types every library can allocate
pub const BUILTIN_TYPES: &[&str] = &[
    "char",
    "signed char",
    "unsigned char",
    "short",
    "unsigned short",
    "int",
    "unsigned int",
    "long",
    "unsigned long",
    "long long",
    "unsigned long long",
    "float",
    "double",
    "long double",
    "bool",
    "size_t",
    "ptrdiff_t",
    "int8_t",
    "uint8_t",
    "int16_t",
    "uint16_t",
    "int32_t",
    "uint32_t",
    "int64_t",
    "uint64_t",
    "intptr_t",
    "uintptr_t",
];

/// Generate the shim source for `decl`, placed after `preamble`
pub fn generate_shim(preamble: &str, decl: &InterfaceDeclaration) -> String {
    let mut out = String::new();

    out.push_str("/* Generated by cinder. Do not edit. */\n");
    for header in STANDARD_HEADERS {
        let _ = writeln!(out, "#include <{}>", header);
    }
    out.push_str(preamble.trim_end());
    out.push_str("\n\n");

    let declared = decl.sized_types();
    let builtins = BUILTIN_TYPES
        .iter()
        .map(|ty| ty.to_string())
        .filter(|ty| !declared.contains(ty));

    out.push_str("struct cinder_layout_entry { const char *name; size_t size; size_t align; };\n\n");
    let _ = writeln!(out, "const struct cinder_layout_entry {}[] = {{", LAYOUT_TABLE);
    for ty in builtins.chain(declared.iter().cloned()) {
        let _ = writeln!(
            out,
            "    {{ \"{ty}\", sizeof({ty}), _Alignof({ty}) }},",
            ty = ty
        );
    }
    out.push_str("    { 0, 0, 0 }\n};\n\n");

    out.push_str("struct cinder_symbol_entry { const char *name; void *address; };\n\n");
    let _ = writeln!(out, "const struct cinder_symbol_entry {}[] = {{", SYMBOL_TABLE);
    for symbol in decl.symbols() {
        let _ = writeln!(out, "    {{ \"{0}\", (void *)&{0} }},", symbol);
    }
    out.push_str("    { 0, 0 }\n};\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_declaration() {
        let decl = InterfaceDeclaration::parse("").unwrap();
        let shim = generate_shim("#include \"/tmp/x.h\"\n", &decl);

        let builtin_rows: String = BUILTIN_TYPES
            .iter()
            .map(|ty| format!("    {{ \"{ty}\", sizeof({ty}), _Alignof({ty}) }},\n"))
            .collect();
        assert_eq!(
            shim,
            format!(
                r#"/* Generated by cinder. Do not edit. */
#include <stddef.h>
#include <stdint.h>
#include <stdbool.h>
#include "/tmp/x.h"

struct cinder_layout_entry {{ const char *name; size_t size; size_t align; }};

const struct cinder_layout_entry cinder_layout_table[] = {{
{builtin_rows}    {{ 0, 0, 0 }}
}};

struct cinder_symbol_entry {{ const char *name; void *address; }};

const struct cinder_symbol_entry cinder_symbol_table[] = {{
    {{ 0, 0 }}
}};
"#
            )
        );
    }

    #[test]
    fn test_tables_list_types_and_symbols() {
        let decl = InterfaceDeclaration::parse(
            "struct s_t { int a; };\ntypedef struct s_t s_alias;\nint add2(int a, int b);\nextern int counter;\nstatic int hidden(void);",
        )
        .unwrap();
        let shim = generate_shim("", &decl);

        assert!(shim.contains("{ \"struct s_t\", sizeof(struct s_t), _Alignof(struct s_t) },"));
        assert!(shim.contains("{ \"s_alias\", sizeof(s_alias), _Alignof(s_alias) },"));
        assert!(shim.contains("{ \"add2\", (void *)&add2 },"));
        assert!(shim.contains("{ \"counter\", (void *)&counter },"));
        assert!(!shim.contains("hidden"));
    }

    #[test]
    fn test_standard_headers_precede_preamble() {
        let decl = InterfaceDeclaration::parse("size_t len(const char *s);\nuint32_t mix(uint32_t x);").unwrap();
        let shim = generate_shim("#include \"/tmp/gen.h\"", &decl);

        let stdint = shim.find("#include <stdint.h>").unwrap();
        let preamble = shim.find("#include \"/tmp/gen.h\"").unwrap();
        assert!(stdint < preamble);
        assert!(shim.find("#include <stddef.h>").unwrap() < preamble);
        assert!(shim.find("#include <stdbool.h>").unwrap() < preamble);
    }

    #[test]
    fn test_declared_typedef_shadows_builtin_row() {
        let decl = InterfaceDeclaration::parse("typedef unsigned int uint32_t;").unwrap();
        let shim = generate_shim("", &decl);

        assert_eq!(shim.matches("{ \"uint32_t\", sizeof(uint32_t)").count(), 1);
        assert!(shim.contains("{ \"double\", sizeof(double), _Alignof(double) },"));
    }
}
