//! Source dictionaries ("dex files") embedded in the container.
//!
//! A source dictionary names the classes and methods whose compiled units the
//! container holds, and records each method's source instruction size, which
//! the size report needs for code expansion ratios.

use super::reader::ByteReader;
use crate::core::error::{ContainerError, ContainerResult};

/// Leading magic of an embedded source dictionary.
pub const DEX_MAGIC: &[u8; 4] = b"dex\n";

pub const ACC_STATIC: u32 = 0x0008;
pub const ACC_NATIVE: u32 = 0x0100;
pub const ACC_ABSTRACT: u32 = 0x0400;
pub const ACC_CONSTRUCTOR: u32 = 0x1_0000;

/// One method as described by the source dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub dex_method_idx: u32,
    /// Source instruction size in 16-bit code units.
    pub insns_size_in_code_units: u32,
    pub access_flags: u32,
}

impl MethodDef {
    pub fn dex_instruction_bytes(&self) -> usize {
        self.insns_size_in_code_units as usize * 2
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.access_flags & ACC_CONSTRUCTOR != 0
    }
}

/// One class as described by the source dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub descriptor: String,
    pub type_idx: u32,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// `Lfoo/Bar;` + `baz` -> `foo.Bar.baz`.
    pub fn pretty_method(&self, method: &MethodDef) -> String {
        format!("{}.{}", pretty_descriptor(&self.descriptor), method.name)
    }
}

/// Parsed source dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexSource {
    pub classes: Vec<ClassDef>,
}

impl DexSource {
    pub fn parse(data: &[u8], offset: u32) -> ContainerResult<Self> {
        let mut reader = ByteReader::at(data, offset as usize, "dex header")?;
        let magic = reader.bytes(4, "dex magic")?;
        if magic != DEX_MAGIC {
            return Err(ContainerError::BadMagic {
                expected: DEX_MAGIC,
                found: magic.to_vec(),
            });
        }
        let class_count = reader.u32("dex class count")?;
        let mut classes = Vec::with_capacity(class_count.min(4096) as usize);
        for _ in 0..class_count {
            let descriptor = reader.string("class descriptor")?;
            let type_idx = reader.u32("class type_idx")?;
            let method_count = reader.u32("class method count")?;
            let mut methods = Vec::with_capacity(method_count.min(4096) as usize);
            for _ in 0..method_count {
                methods.push(MethodDef {
                    name: reader.string("method name")?,
                    dex_method_idx: reader.u32("dex_method_idx")?,
                    insns_size_in_code_units: reader.u32("insns size")?,
                    access_flags: reader.u32("access flags")?,
                });
            }
            classes.push(ClassDef {
                descriptor,
                type_idx,
                methods,
            });
        }
        Ok(Self { classes })
    }
}

/// Convert a type descriptor to its source-level spelling.
///
/// `Ljava/lang/String;` -> `java.lang.String`, `[I` -> `int[]`. Strings that
/// are not descriptors come back unchanged.
pub fn pretty_descriptor(descriptor: &str) -> String {
    let dims = descriptor.bytes().take_while(|&b| b == b'[').count();
    let element = &descriptor[dims..];
    let base = match element {
        "Z" => "boolean".to_string(),
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "S" => "short".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "F" => "float".to_string(),
        "D" => "double".to_string(),
        "V" => "void".to_string(),
        _ => match element.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
            Some(name) => name.replace('/', "."),
            None => element.to_string(),
        },
    };
    let mut pretty = base;
    for _ in 0..dims {
        pretty.push_str("[]");
    }
    pretty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_descriptors() {
        assert_eq!(pretty_descriptor("Ljava/lang/Object;"), "java.lang.Object");
        assert_eq!(pretty_descriptor("[[I"), "int[][]");
        assert_eq!(pretty_descriptor("[Ljava/lang/String;"), "java.lang.String[]");
        assert_eq!(pretty_descriptor("plain"), "plain");
    }

    #[test]
    fn method_flags() {
        let m = MethodDef {
            name: "<clinit>".into(),
            dex_method_idx: 3,
            insns_size_in_code_units: 10,
            access_flags: ACC_STATIC | ACC_CONSTRUCTOR,
        };
        assert!(m.is_static() && m.is_constructor());
        assert!(!m.is_native() && !m.is_abstract());
        assert_eq!(m.dex_instruction_bytes(), 20);
    }
}
