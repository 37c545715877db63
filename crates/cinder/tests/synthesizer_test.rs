//! Integration tests for declaration synthesizers and the module cache

mod common;

use cinder::{CommandSynthesizer, Config, DeclarationSynthesizer, Error, Factory};
use pretty_assertions::assert_eq;

type BinaryFn = extern "C" fn(i32, i32) -> i32;

#[test]
fn test_native_synthesizer_contract() {
    let Some((mut factory, temp)) = common::factory() else {
        return;
    };

    let synthesizer = factory
        .native_synthesizer(false, temp.path().join("support"), common::fixture("make_header.c"))
        .unwrap();

    assert_eq!(synthesizer.make("int a();").unwrap(), "int a();");
    assert_eq!(synthesizer.make("void b() { return 1; }").unwrap(), "void b();");
    assert_eq!(synthesizer.make("int c() { return 1; }").unwrap(), "int c();");
    assert_eq!(
        synthesizer.make("int d() { return 1; } int e() { return 1; }").unwrap(),
        "int d();\nint e();"
    );
    assert_eq!(synthesizer.module().name(), "cinder_release");
    assert!(matches!(synthesizer.make("a\0b"), Err(cinder::SynthesisError::Native(_))));
}

#[test]
fn test_native_synthesizer_is_cached_per_profile() {
    let Some((mut factory, temp)) = common::factory() else {
        return;
    };
    let source = common::fixture("make_header.c");
    let folder = temp.path().join("support");

    let first = factory.native_synthesizer(true, &folder, &source).unwrap();
    let second = factory.native_synthesizer(true, &folder, &source).unwrap();
    assert!(first.module().same_module(second.module()));
    assert_eq!(first.module().name(), "cinder_debug");
    assert_eq!(factory.cache().build_count(), 1);

    factory.native_synthesizer(false, &folder, &source).unwrap();
    assert_eq!(factory.cache().build_count(), 2);

    let moved = temp.path().join("moved");
    factory.native_synthesizer(true, &moved, &source).unwrap();
    factory.native_synthesizer(false, &moved, &source).unwrap();
    factory.native_synthesizer(false, &moved, &source).unwrap();
    assert_eq!(factory.cache().build_count(), 4);
    assert!(moved.join("cinder_debug").is_dir());
    assert!(moved.join("cinder_release").is_dir());
}

#[test]
fn test_pipeline_with_native_synthesizer() {
    let Some((mut factory, temp)) = common::factory() else {
        return;
    };
    let synthesizer = factory
        .native_synthesizer(false, temp.path().join("support"), common::fixture("make_header.c"))
        .unwrap();
    factory.set_synthesizer(Box::new(synthesizer));

    let module = factory
        .create_unit("native_add2")
        .add_source_text("int add2(int a, int b) { return a + b; }")
        .finalize()
        .unwrap();

    assert_eq!(factory.pipeline().synthesizer().name(), "native");
    let add2 = unsafe { module.function::<BinaryFn>("add2").unwrap() };
    assert_eq!(add2(20, 22), 42);
}

#[test]
fn test_failing_synthesizer_degrades_to_empty_header() {
    let Some((mut factory, _temp)) = common::factory() else {
        return;
    };
    factory.set_synthesizer(Box::new(CommandSynthesizer::new("false", vec![])));

    // Synthesis failure leaves an empty header, which binds nothing.
    let module = factory
        .create_unit("no_header")
        .add_source_text("int lonely(void) { return 1; }")
        .finalize()
        .unwrap();

    assert!(module.symbol_names().is_empty());
    assert_eq!(module.cdef(), "");
}

#[test]
fn test_command_synthesizer_in_pipeline() {
    let Some((mut factory, _temp)) = common::factory() else {
        return;
    };
    let header = CommandSynthesizer::new("sh", vec!["-c".to_string(), "echo 'int seven(void);'".to_string()]);
    assert_eq!(header.synthesize("ignored").unwrap(), "int seven(void);");
    factory.set_synthesizer(Box::new(header));

    let module = factory
        .create_unit("seven")
        .add_source_text("int seven(void) { return 7; }")
        .finalize()
        .unwrap();

    let seven = unsafe { module.function::<extern "C" fn() -> i32>("seven").unwrap() };
    assert_eq!(seven(), 7);
}

#[test]
fn test_missing_synthesizer_source() {
    let Some((mut factory, temp)) = common::factory() else {
        return;
    };

    let result = factory.native_synthesizer(false, temp.path(), temp.path().join("absent.c"));

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(factory.cache().build_count(), 0);
}

#[test]
fn test_debug_factory_builds_debug_synthesizer() {
    let Some((_factory, temp)) = common::factory() else {
        return;
    };
    let mut config = Config::default();
    config.generation.gen_root = temp.path().join("gen");
    let mut factory = Factory::debug(config);

    let synthesizer = factory
        .synthesizer(temp.path().join("support"), common::fixture("make_header.c"))
        .unwrap();

    assert_eq!(synthesizer.module().name(), "cinder_debug");
    assert_eq!(synthesizer.make("int z() { return 0; }").unwrap(), "int z();");
}
