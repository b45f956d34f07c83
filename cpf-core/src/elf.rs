//! Low-level dl*/ELF64 FFI surface.
//!
//! Hand-written `#[repr(C)]` + raw `extern "C"` glue for the parts of the
//! dynamic linker and the ELF64 image layout no safe wrapper crate
//! exposes: the link-map entry for a `dlopen`ed handle (its load base and
//! dynamic-section pointer) and the raw symbol/string tables.
//!
//! Pinned to the host's native ELF class; `EM_X86_64` below is the one
//! place that assumption is named, rather than a literal scattered
//! elsewhere.

use libc::{c_char, c_int, c_void};

use crate::error::CoreError;

// ---- dl* bindings -----------------------------------------------------
//
// `dlopen`/`dlclose`/`dlerror` come straight from `libc`. `dlinfo` and
// `RTLD_DI_LINKMAP` are a glibc extension `libc` doesn't expose on every
// target, so we declare those ourselves.

pub use libc::{RTLD_GLOBAL, RTLD_NOW};

const RTLD_DI_LINKMAP: c_int = 2;

extern "C" {
    fn dlinfo(handle: *mut c_void, request: c_int, info: *mut c_void) -> c_int;
}

/// Safe-ish wrapper around `dlopen(path, RTLD_NOW | RTLD_GLOBAL)`.
///
/// # Safety
/// The caller must ensure `path` names a file suitable for the dynamic
/// linker; loading arbitrary untrusted code is inherently unsafe, which is
/// why this whole module is `unsafe fn`-only. `RTLD_GLOBAL` is required so
/// later-loaded plugins can resolve symbols exported by earlier ones.
pub unsafe fn dl_open(path: &std::path::Path) -> Result<*mut c_void, String> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| e.to_string())?;
    let handle = libc::dlopen(c_path.as_ptr(), RTLD_NOW | RTLD_GLOBAL);
    if handle.is_null() {
        Err(last_dl_error())
    } else {
        Ok(handle)
    }
}

/// # Safety
/// `handle` must be a live handle returned by [`dl_open`] that has not
/// already been closed.
pub unsafe fn dl_close(handle: *mut c_void) {
    libc::dlclose(handle);
}

fn last_dl_error() -> String {
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            "unknown dlopen/dlinfo error".to_string()
        } else {
            std::ffi::CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Mirrors glibc's `struct link_map` -- only the prefix we need
/// (`l_addr`, `l_name`, `l_ld`) is declared; the real struct has more
/// trailing fields we never touch.
#[repr(C)]
struct LinkMap {
    l_addr: usize,
    l_name: *const c_char,
    l_ld: *mut Elf64Dyn,
    l_next: *mut LinkMap,
    l_prev: *mut LinkMap,
}

/// Load base address and dynamic-section pointer for a live `dlopen`
/// handle.
///
/// # Safety
/// `handle` must be a live handle from [`dl_open`].
pub unsafe fn link_map_info(handle: *mut c_void) -> Result<(usize, *mut Elf64Dyn), String> {
    let mut map: *mut LinkMap = std::ptr::null_mut();
    let rc = dlinfo(
        handle,
        RTLD_DI_LINKMAP,
        &mut map as *mut *mut LinkMap as *mut c_void,
    );
    if rc == -1 || map.is_null() {
        return Err(last_dl_error());
    }
    Ok(((*map).l_addr, (*map).l_ld))
}

// ---- ELF64 layout -------------------------------------------------------

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const EM_X86_64: u16 = 62;
pub const ET_DYN: u16 = 3;
const STT_FUNC: u8 = 2;

const DT_NULL: i64 = 0;
const DT_SYMTAB: i64 = 6;
const DT_STRTAB: i64 = 5;
const DT_SYMENT: i64 = 11;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Elf64Dyn {
    pub d_tag: i64,
    pub d_val: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Elf64Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl Elf64Sym {
    fn symbol_type(&self) -> u8 {
        self.st_info & 0x0f
    }
}

/// Shared by the tested, slice-based [`scan_symbols`] and the real
/// loader's raw-memory walk, so both agree on exactly which symbols
/// count as "defined functions".
fn is_function_symbol(sym: &Elf64Sym) -> bool {
    sym.symbol_type() == STT_FUNC && sym.st_value != 0
}

/// Read a NUL-terminated name directly out of process memory at
/// `strtab_addr + offset`. Used by the real loader, which cannot bound a
/// safe slice over a string table of unknown length; the synthetic-slice
/// [`scan_symbols`] path used in tests does not need this.
///
/// # Safety
/// `strtab_addr + offset` must point into a live, NUL-terminated C
/// string, as guaranteed by a well-formed ELF dynamic symbol table.
pub unsafe fn read_c_str_at(strtab_addr: usize, offset: u32) -> Option<String> {
    if offset == 0 {
        return None;
    }
    let ptr = (strtab_addr + offset as usize) as *const c_char;
    if *ptr == 0 {
        return None;
    }
    Some(std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Validate the mapped image's ELF header: magic, machine, file type.
/// Pure function over raw bytes, independent of any live `dlopen` handle.
pub fn validate_elf_header(bytes: &[u8], path: &std::path::Path) -> anyhow::Result<()> {
    if bytes.len() < 20 || bytes[0..4] != ELF_MAGIC {
        return Err(CoreError::ElfMagic {
            path: path.to_path_buf(),
        }
        .into());
    }
    let e_type = u16::from_ne_bytes([bytes[16], bytes[17]]);
    let e_machine = u16::from_ne_bytes([bytes[18], bytes[19]]);

    if e_machine != EM_X86_64 {
        return Err(CoreError::ElfMachine {
            path: path.to_path_buf(),
        }
        .into());
    }
    if e_type != ET_DYN {
        return Err(CoreError::ElfFileType {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

/// Locate `DT_SYMTAB`/`DT_STRTAB`/`DT_SYMENT` in the dynamic section.
///
/// # Safety
/// `dynamic` must point to a valid, `DT_NULL`-terminated array, as
/// obtained from [`link_map_info`].
pub unsafe fn find_symbol_tables(
    base: usize,
    dynamic: *const Elf64Dyn,
) -> Option<(usize, usize, usize)> {
    let mut symtab: Option<usize> = None;
    let mut strtab: Option<usize> = None;
    let mut syment: Option<usize> = None;

    let mut i = 0isize;
    loop {
        let entry = &*dynamic.offset(i);
        if entry.d_tag == DT_NULL {
            break;
        }
        match entry.d_tag {
            DT_SYMTAB => symtab = Some(entry.d_val as usize),
            DT_STRTAB => strtab = Some(entry.d_val as usize),
            DT_SYMENT => syment = Some(entry.d_val as usize),
            _ => {}
        }
        i += 1;
    }

    let (symtab, strtab, syment) = (symtab?, strtab?, syment?);
    let _ = base;
    if syment == 0 || strtab <= symtab {
        return None;
    }
    Some((symtab, strtab, syment))
}

/// One resolved exported function, before the reserved-name split.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub addr: usize,
    pub offset: u64,
    pub name: Option<String>,
}

/// Walk a symbol table slice, keeping only `STT_FUNC` entries with a
/// non-zero value (offset from base). Pure -- takes already-sliced,
/// already-validated-length symbol/string table byte slices, so it is
/// unit-testable with synthetic tables and needs no live `.so`.
pub fn scan_symbols(base: usize, symtab: &[Elf64Sym], strtab: &[u8]) -> Vec<RawSymbol> {
    let mut out = Vec::new();
    for sym in symtab {
        if !is_function_symbol(sym) {
            continue;
        }
        let name = symbol_name(strtab, sym.st_name as usize);
        out.push(RawSymbol {
            addr: base + sym.st_value as usize,
            offset: sym.st_value,
            name,
        });
    }
    out
}

/// Real (unsafe, unbounded-strtab) counterpart of [`scan_symbols`] used by
/// the loader against a live `dlopen`ed image, where the string table's
/// extent is not known up front. See [`read_c_str_at`].
///
/// # Safety
/// `symtab` must be a valid slice over a live ELF symbol table (safe to
/// construct because its extent -- `symtab_addr..strtab_addr` -- is given
/// directly by the dynamic section), and `strtab_addr` must point at the
/// corresponding live string table.
pub unsafe fn scan_symbols_live(
    base: usize,
    symtab: &[Elf64Sym],
    strtab_addr: usize,
) -> Vec<RawSymbol> {
    let mut out = Vec::new();
    for sym in symtab {
        if !is_function_symbol(sym) {
            continue;
        }
        out.push(RawSymbol {
            addr: base + sym.st_value as usize,
            offset: sym.st_value,
            name: read_c_str_at(strtab_addr, sym.st_name),
        });
    }
    out
}

fn symbol_name(strtab: &[u8], offset: usize) -> Option<String> {
    if offset == 0 || offset >= strtab.len() {
        return None;
    }
    let end = strtab[offset..].iter().position(|&b| b == 0)? + offset;
    if end == offset {
        return None; // empty string
    }
    Some(String::from_utf8_lossy(&strtab[offset..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn header(e_type: u16, e_machine: u16) -> [u8; 20] {
        let mut bytes = [0u8; 20];
        bytes[0..4].copy_from_slice(&ELF_MAGIC);
        bytes[16..18].copy_from_slice(&e_type.to_ne_bytes());
        bytes[18..20].copy_from_slice(&e_machine.to_ne_bytes());
        bytes
    }

    #[test]
    fn valid_header_passes() {
        let bytes = header(ET_DYN, EM_X86_64);
        assert!(validate_elf_header(&bytes, Path::new("x.so")).is_ok());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = header(ET_DYN, EM_X86_64);
        bytes[0] = 0;
        assert!(validate_elf_header(&bytes, Path::new("x.so")).is_err());
    }

    #[test]
    fn wrong_machine_is_rejected() {
        let bytes = header(ET_DYN, 3 /* EM_386 */);
        assert!(validate_elf_header(&bytes, Path::new("x.so")).is_err());
    }

    #[test]
    fn non_shared_object_is_rejected() {
        let bytes = header(2 /* ET_EXEC */, EM_X86_64);
        assert!(validate_elf_header(&bytes, Path::new("x.so")).is_err());
    }

    fn sym(st_info: u8, st_value: u64, st_name: u32) -> Elf64Sym {
        Elf64Sym {
            st_name,
            st_info,
            st_other: 0,
            st_shndx: 0,
            st_value,
            st_size: 0,
        }
    }

    #[test]
    fn scan_skips_non_func_and_zero_value() {
        let strtab = b"\0ignored\0do_op\0";
        let symtab = [
            sym(0, 0x10, 1),          // not STT_FUNC
            sym(STT_FUNC, 0, 9),      // zero value
            sym(STT_FUNC, 0x20, 9),   // "do_op" at offset 9
        ];
        let found = scan_symbols(0x1000, &symtab, strtab);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name.as_deref(), Some("do_op"));
        assert_eq!(found[0].addr, 0x1000 + 0x20);
        assert_eq!(found[0].offset, 0x20);
    }

    #[test]
    fn anonymous_function_has_no_name() {
        let strtab = b"\0";
        let symtab = [sym(STT_FUNC, 0x30, 0)];
        let found = scan_symbols(0, &symtab, strtab);
        assert_eq!(found.len(), 1);
        assert!(found[0].name.is_none());
    }
}
