//! Shipped frida-core patches against a fixture of `lib/base/linux.vala`

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use vendor_patcher::config::load_from_path;
use vendor_patcher::{apply, check, PatchSpec, SourceTree};

const LINUX_VALA: &str = r#"namespace Frida {
	public sealed class MemoryFileDescriptor : Object {
		public static bool is_supported () {
			return Linux.syscall (SYS_memfd_create, "frida-memfd", 0) != -1;
		}

		public static FileDescriptor from_bytes (string name, Bytes bytes) {
			assert (is_supported ());

			var fd = new FileDescriptor (memfd_create (name, 0));
			return fd;
		}

		private static int memfd_create (string name, uint flags) {
			return Linux.syscall (LinuxSyscall.MEMFD_CREATE, name, flags);
		}
	}
}
"#;

fn patch_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("patches/frida-core/0009-memfd-name-jit-cache.toml")
}

fn setup_frida_core(contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("lib/base")).unwrap();
    fs::write(dir.path().join("lib/base/linux.vala"), contents).unwrap();
    dir
}

fn memfd_spec(dir: &TempDir) -> PatchSpec {
    let tree = SourceTree::new(dir.path()).unwrap();
    let config = load_from_path(patch_file()).unwrap();
    let mut specs = config.specs(&tree).unwrap();
    assert_eq!(specs.len(), 1);
    specs.remove(0)
}

#[test]
fn test_memfd_patch_applies() {
    let dir = setup_frida_core(LINUX_VALA);
    let spec = memfd_spec(&dir);

    let result = apply(&spec).unwrap();
    assert!(result.matched, "{:?}", result.error_detail);

    let patched = fs::read_to_string(dir.path().join("lib/base/linux.vala")).unwrap();
    assert!(patched
        .contains(r#"return Linux.syscall (LinuxSyscall.MEMFD_CREATE, "jit-cache", flags);"#));
    // The is_supported() probe uses a different syscall constant and stays put
    assert!(patched.contains(r#"Linux.syscall (SYS_memfd_create, "frida-memfd", 0)"#));
}

#[test]
fn test_memfd_patch_is_not_reapplied() {
    let dir = setup_frida_core(LINUX_VALA);
    let spec = memfd_spec(&dir);

    assert!(apply(&spec).unwrap().matched);
    let second = apply(&spec).unwrap();

    assert!(!second.matched);
    assert!(second
        .error_detail
        .unwrap()
        .contains("lib/base/linux.vala"));
}

#[test]
fn test_memfd_patch_detects_upstream_drift() {
    // Upstream renamed the parameter to `flags_value`; the pattern must not
    // silently succeed on the changed call site.
    let drifted = LINUX_VALA.replace("name, flags)", "name, flags_value)");
    let dir = setup_frida_core(&drifted);
    let spec = memfd_spec(&dir);

    let preview = check(&spec).unwrap();
    assert!(!preview.result.matched);
    assert!(preview.patched.is_none());

    let result = apply(&spec).unwrap();
    assert!(!result.matched);
    assert_eq!(
        fs::read_to_string(dir.path().join("lib/base/linux.vala")).unwrap(),
        drifted
    );
}

#[test]
fn test_memfd_patch_refuses_duplicate_call_sites() {
    let duplicated = LINUX_VALA.replace(
        "\t\t\treturn Linux.syscall (LinuxSyscall.MEMFD_CREATE, name, flags);\n",
        "\t\t\tLinux.syscall (LinuxSyscall.MEMFD_CREATE, name, flags);\n\t\t\treturn Linux.syscall (LinuxSyscall.MEMFD_CREATE, name, flags);\n",
    );
    let dir = setup_frida_core(&duplicated);
    let spec = memfd_spec(&dir);

    let result = apply(&spec).unwrap();
    assert!(!result.matched);
    assert!(result
        .error_detail
        .unwrap()
        .contains("matched 2 locations"));
}
