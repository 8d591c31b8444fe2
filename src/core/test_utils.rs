//! Test utilities for arena-based report sessions.
//!
//! A session borrows both an arena and a closed extent registry, so tests run
//! inside a closure that owns both for exactly the session's lifetime.

#[cfg(test)]
pub mod test {
    use super::super::extent::{ExtentRegistry, RegionKind};
    use super::super::registers::SpillMasks;
    use super::super::session::ReportSession;
    use crate::codec::{encode_gc_map, encode_mapping_table, encode_vmap_table};
    use crate::container::{
        ClassLayout, ContainerWriter, DexFileLayout, InstructionSet, MethodLayout, ACC_ABSTRACT,
        ACC_CONSTRUCTOR, ACC_NATIVE, ACC_STATIC,
    };
    use bumpalo::Bump;

    /// Owns the arena and registry a session borrows.
    pub struct TestContext {
        arena: Bump,
        registry: ExtentRegistry,
    }

    impl TestContext {
        /// Context over an empty container `[0, end)` with only the end
        /// sentinel and the header start registered.
        pub fn new(end: u32) -> Self {
            let mut registry = ExtentRegistry::new(0, end);
            registry
                .register(RegionKind::Header, 0)
                .expect("header offset lies inside the container");
            registry.close();
            Self::with_registry(registry)
        }

        pub fn with_registry(registry: ExtentRegistry) -> Self {
            Self {
                arena: Bump::new(),
                registry,
            }
        }

        pub fn create_session(&self) -> ReportSession<'_, '_> {
            ReportSession::new(&self.arena, &self.registry)
        }

        pub fn registry(&self) -> &ExtentRegistry {
            &self.registry
        }

        /// Bytes the arena has handed out so far.
        pub fn memory_used(&self) -> usize {
            self.arena.allocated_bytes()
        }
    }

    /// Run `f` with a fresh session over a container of `end` bytes.
    pub fn with_session<F, R>(end: u32, f: F) -> R
    where
        F: FnOnce(&mut ReportSession<'_, '_>) -> R,
    {
        let ctx = TestContext::new(end);
        let mut session = ctx.create_session();
        f(&mut session)
    }

    /// A small x86-64 container exercising every region kind:
    ///
    /// - `LFoo;.<init>`: constructor with code and all three tables
    /// - `LFoo;.get`: shares `<init>`'s code and vmap table
    /// - `LFoo;.nativeCall`: native, invoke stub only
    /// - `LFoo;.abs`: abstract, nothing compiled
    /// - `LBar;.<clinit>`: static initializer with its own code
    pub fn sample_writer() -> ContainerWriter {
        let shared_code = vec![0x55, 0x48, 0x89, 0xe5, 0x5d, 0xc3, 0x90, 0x90];
        let vmap = encode_vmap_table(&[5, 7]);
        ContainerWriter::new(InstructionSet::X86_64)
            .checksum(0xdead_beef)
            .image_file_location("/system/framework/boot.art", 0x0bad_cafe)
            .dex_file(
                DexFileLayout::new("/system/framework/core.jar", 0x1357_9bdf)
                    .class(
                        ClassLayout::new("LFoo;", 2)
                            .method(
                                MethodLayout::new("<init>", 0, 4, ACC_CONSTRUCTOR)
                                    .frame(48, SpillMasks::new(0b11, 0))
                                    .code(shared_code.clone())
                                    .mapping_table(encode_mapping_table(&[(0, 0), (4, 2)], &[(0, 0), (2, 4)]))
                                    .vmap_table(vmap.clone())
                                    .gc_map(encode_gc_map(1, 1, &[(4, vec![0b101])]))
                                    .invoke_stub(vec![0xc3; 4]),
                            )
                            .method(
                                MethodLayout::new("get", 1, 2, 0)
                                    .frame(48, SpillMasks::new(0b11, 0))
                                    .code(shared_code)
                                    .vmap_table(vmap),
                            )
                            .method(
                                MethodLayout::new("nativeCall", 2, 0, ACC_NATIVE | ACC_STATIC)
                                    .code(vec![0xcc; 12])
                                    .invoke_stub(vec![0x90; 8]),
                            )
                            .method(MethodLayout::new("abs", 3, 0, ACC_ABSTRACT)),
                    )
                    .class(
                        ClassLayout::new("LBar;", 3).status(6).method(
                            MethodLayout::new("<clinit>", 4, 6, ACC_CONSTRUCTOR | ACC_STATIC)
                                .frame(16, SpillMasks::new(0b1, 0b10))
                                .code(vec![0x31, 0xc0, 0xc3, 0x90])
                                .gc_map(encode_gc_map(1, 1, &[])),
                        ),
                    ),
            )
    }
}
