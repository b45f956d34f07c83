//! Effectful plugin loading: `dlopen` a candidate, walk its symbol table,
//! and extract its context, into one [`PluginRecord`].
//!
//! Opens the handle, pulls `(base_addr, dynamic)` from the link map,
//! locates `DT_SYMTAB`/`DT_STRTAB`, scans every symbol once, classifying
//! the three reserved hook names out of the function list and requiring
//! `CPF_init_ctx` to exist and succeed.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::path::Path;

use tracing::{debug, warn};

use crate::elf::{self, Elf64Sym};
use crate::error::CoreError;
use crate::hash;

use super::record::{
    FunctionRecord, Library, PluginContext, PluginRecord, CONSTRUCTOR_SYMBOL, DESTRUCTOR_SYMBOL,
    INIT_CTX_SYMBOL,
};

const MAX_VERSION_SIZE: usize = 64;

/// One entry of a plugin's exported function table, as published in its
/// own memory. `func_addr` must stay the first field: a sentinel entry
/// (array terminator) is detected by that field reading as null.
#[repr(C)]
struct RawFuncEntry {
    func_addr: *mut c_void,
    func_offset: u64,
    func_name: *const c_char,
}

/// One dependency declaration. `dep_lib_name` must stay first for the
/// same sentinel-detection reason as [`RawFuncEntry::func_addr`].
#[repr(C)]
struct RawDependency {
    dep_lib_name: *const c_char,
    funcs: *mut RawFuncEntry,
}

/// The context structure a plugin publishes via its context-init hook.
#[repr(C)]
struct RawPluginContext {
    version: [c_char; MAX_VERSION_SIZE],
    deps: *mut RawDependency,
}

type InitCtxFn = unsafe extern "C" fn() -> *mut RawPluginContext;

/// Load and classify one candidate `.so`. Fatal on any failure -- a
/// plugin that fails to load aborts the whole discovery pass rather than
/// being silently skipped.
pub fn load(full_path: &Path, logical_name: &str) -> anyhow::Result<PluginRecord> {
    validate_header(full_path)?;
    let digest = hash::digest_file(full_path)?;

    unsafe {
        let raw_handle = elf::dl_open(full_path).map_err(|message| CoreError::DlOpen {
            path: full_path.to_path_buf(),
            message,
        })?;
        let library = Library::from_raw(raw_handle);

        let (base_addr, dynamic) =
            elf::link_map_info(library.raw()).map_err(|message| CoreError::LinkMap {
                path: full_path.to_path_buf(),
                message,
            })?;

        let (symtab_addr, strtab_addr, syment) = elf::find_symbol_tables(base_addr, dynamic)
            .ok_or_else(|| CoreError::LinkMap {
                path: full_path.to_path_buf(),
                message: "DT_SYMTAB/DT_STRTAB/DT_SYMENT not present in dynamic section"
                    .to_string(),
            })?;

        let total_syms = (strtab_addr - symtab_addr) / syment;
        let symtab: &[Elf64Sym] =
            std::slice::from_raw_parts(symtab_addr as *const Elf64Sym, total_syms);

        let raw_symbols = elf::scan_symbols_live(base_addr, symtab, strtab_addr);

        let mut ctor_addr = None;
        let mut dtor_addr = None;
        let mut init_ctx_addr = None;
        let mut functions = Vec::new();

        for sym in raw_symbols {
            match sym.name.as_deref() {
                Some(CONSTRUCTOR_SYMBOL) => ctor_addr = Some(sym.addr),
                Some(DESTRUCTOR_SYMBOL) => dtor_addr = Some(sym.addr),
                Some(INIT_CTX_SYMBOL) => init_ctx_addr = Some(sym.addr),
                _ => functions.push(FunctionRecord {
                    addr: sym.addr,
                    offset: sym.offset,
                    name: sym.name,
                }),
            }
        }

        let init_ctx_addr = init_ctx_addr.ok_or_else(|| CoreError::MissingInitCtx {
            name: logical_name.to_string(),
            symbol: INIT_CTX_SYMBOL,
        })?;

        let init_ctx: InitCtxFn = std::mem::transmute(init_ctx_addr);
        let raw_ctx = init_ctx();
        if raw_ctx.is_null() {
            return Err(CoreError::NullContext {
                name: logical_name.to_string(),
                symbol: INIT_CTX_SYMBOL,
            }
            .into());
        }

        if (*raw_ctx).deps.is_null() {
            return Err(CoreError::NullDeps {
                name: logical_name.to_string(),
            }
            .into());
        }

        if functions.is_empty() {
            return Err(CoreError::NoFunctions {
                name: logical_name.to_string(),
            }
            .into());
        }

        let version = read_version(&(*raw_ctx).version);
        let dep_names = read_dep_names((*raw_ctx).deps);
        let context = PluginContext::new(version, dep_names);

        debug!(
            plugin = logical_name,
            functions = functions.len(),
            deps = context.deps.len(),
            "loaded plugin"
        );

        Ok(PluginRecord::new(
            full_path.to_path_buf(),
            logical_name.to_string(),
            library,
            base_addr,
            functions,
            context,
            ctor_addr,
            dtor_addr,
            digest,
        ))
    }
}

fn validate_header(path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    elf::validate_elf_header(&bytes, path)
}

unsafe fn read_version(raw: &[c_char; MAX_VERSION_SIZE]) -> String {
    let ptr = raw.as_ptr();
    if *ptr == 0 {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Walk the sentinel-terminated dependency array: stop at the first
/// entry whose `dep_lib_name` is null.
unsafe fn read_dep_names(mut deps: *mut RawDependency) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let entry = &*deps;
        if entry.dep_lib_name.is_null() {
            break;
        }
        match CStr::from_ptr(entry.dep_lib_name).to_str() {
            Ok(name) => out.push(name.to_string()),
            Err(_) => warn!("dependency name is not valid UTF-8, skipping entry"),
        }
        deps = deps.add(1);
    }
    out
}
