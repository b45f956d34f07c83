//! Integration tests exercising `Framework::init` against real temporary
//! directory trees. We cannot ship a real compiled `.so` fixture, so these
//! cover the parts of the pipeline reachable without one: root resolution
//! by directory layout, and the fatal rejection of a non-ELF file that
//! merely has the right extension.

use std::fs;

use cpf_core::Framework;

#[test]
fn empty_plugin_directory_yields_empty_framework() {
    let dir = tempfile::tempdir().unwrap();
    let framework = Framework::init(Some(dir.path().to_str().unwrap())).unwrap();
    assert_eq!(framework.plugin_count(), 0);
}

#[test]
fn non_elf_file_with_so_extension_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("fake.so"), b"not an elf file at all").unwrap();

    let result = Framework::init(Some(dir.path().to_str().unwrap()));
    assert!(result.is_err());
}

#[test]
fn missing_root_directory_is_fatal() {
    let result = Framework::init(Some("/nonexistent/path/that/does/not/exist"));
    assert!(result.is_err());
}
