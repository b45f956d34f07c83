//! The plugin data model: [`FunctionRecord`], [`PluginContext`],
//! [`DependencyEntry`], [`PluginRecord`]. Single-owner ownership transfer
//! during reload is handled by moving values and `Option::take`, rather
//! than by nulling a donor's raw fields after a manual copy.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::rc::Rc;

use crate::elf;
use crate::hash::Digest;

/// Reserved plugin-exported symbol names.
pub const INIT_CTX_SYMBOL: &str = "CPF_init_ctx";
pub const CONSTRUCTOR_SYMBOL: &str = "CPF_constructor";
pub const DESTRUCTOR_SYMBOL: &str = "CPF_destructor";

/// Substituted for an empty plugin-reported version string.
pub const VERSION_NOT_DEFINED: &str = "<NOT DEFINED>";

/// One exported, defined function of a plugin. Immutable after load.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub addr: usize,
    pub offset: u64,
    pub name: Option<String>,
}

impl FunctionRecord {
    pub fn name_or_sentinel(&self) -> &str {
        self.name.as_deref().unwrap_or(crate::plugin::record::VERSION_NOT_DEFINED)
    }
}

/// One entry of a plugin's declared dependency list.
#[derive(Debug, Clone)]
pub struct DependencyEntry {
    pub dep_lib_name: String,
    /// Populated by the dependency linker (`plugin::linker`); `None`
    /// before linking has run.
    pub resolved_functions: Option<Rc<[FunctionRecord]>>,
}

/// A plugin's self-description, returned by its `CPF_init_ctx` hook.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub version: String,
    pub deps: Vec<DependencyEntry>,
}

impl PluginContext {
    /// Build from the raw `(version, dep names)` pair the loader reads
    /// out of the plugin's published context, substituting the
    /// `"<NOT DEFINED>"` sentinel for an empty version.
    pub fn new(version: String, dep_names: Vec<String>) -> Self {
        let version = if version.is_empty() {
            VERSION_NOT_DEFINED.to_string()
        } else {
            version
        };
        let deps = dep_names
            .into_iter()
            .map(|dep_lib_name| DependencyEntry {
                dep_lib_name,
                resolved_functions: None,
            })
            .collect();
        PluginContext { version, deps }
    }
}

/// Owns a live `dlopen` handle; closes it exactly once on drop. This is
/// the Rust-native form of the C original's `DLCLOSE(ptr)` macro ("close
/// then null so it can't double-close") -- here there is simply no way
/// to double-close, since `Drop::drop` runs at most once per value and a
/// moved-from `Library` cannot be dropped again.
pub struct Library {
    handle: *mut c_void,
}

impl Library {
    /// # Safety
    /// `handle` must be a live handle from [`elf::dl_open`] that has not
    /// already been passed to another `Library`.
    pub unsafe fn from_raw(handle: *mut c_void) -> Self {
        Library { handle }
    }

    pub fn raw(&self) -> *mut c_void {
        self.handle
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            elf::dl_close(self.handle);
        }
    }
}

/// Stable handle passed to a plugin's constructor/destructor hooks: a
/// minimal, heap-allocated, `#[repr(C)]` token (base address + name),
/// rather than a layout mirroring the full `PluginRecord`, which is not
/// (and need not be) FFI-stable.
#[repr(C)]
pub struct PluginHandle {
    pub base_addr: usize,
    name_ptr: *const c_char,
}

type CtorDtorFn = unsafe extern "C" fn(*const PluginHandle);

/// One loaded shared object.
pub struct PluginRecord {
    pub full_path: PathBuf,
    pub logical_name: String,
    pub base_addr: usize,
    pub functions: Vec<FunctionRecord>,
    pub context: PluginContext,
    pub digest: Digest,

    library: Library,
    ctor_addr: Option<usize>,
    dtor_addr: Option<usize>,

    // Kept alive for the lifetime of the record: `handle` below borrows
    // from `_name_cstr`.
    _name_cstr: CString,
    handle: Box<PluginHandle>,
}

impl PluginRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        full_path: PathBuf,
        logical_name: String,
        library: Library,
        base_addr: usize,
        functions: Vec<FunctionRecord>,
        context: PluginContext,
        ctor_addr: Option<usize>,
        dtor_addr: Option<usize>,
        digest: Digest,
    ) -> Self {
        let name_cstr = CString::new(logical_name.clone()).unwrap_or_default();
        let handle = Box::new(PluginHandle {
            base_addr,
            name_ptr: name_cstr.as_ptr(),
        });

        PluginRecord {
            full_path,
            logical_name,
            base_addr,
            functions,
            context,
            digest,
            library,
            ctor_addr,
            dtor_addr,
            _name_cstr: name_cstr,
            handle,
        }
    }

    pub fn has_constructor(&self) -> bool {
        self.ctor_addr.is_some()
    }

    pub fn has_destructor(&self) -> bool {
        self.dtor_addr.is_some()
    }

    /// Invoke the constructor hook, if present. Call sites (the
    /// reconciler, `Framework::init`) are responsible for calling this at
    /// most once per activation.
    ///
    /// # Safety
    /// The plugin's constructor must actually accept a
    /// `*const PluginHandle` and not retain it past the plugin's unload.
    pub unsafe fn call_constructor(&self) {
        if let Some(addr) = self.ctor_addr {
            let f: CtorDtorFn = std::mem::transmute(addr);
            f(self.handle.as_ref());
        }
    }

    /// Invoke the destructor hook, if present.
    ///
    /// # Safety
    /// Same requirements as [`Self::call_constructor`].
    pub unsafe fn call_destructor(&self) {
        if let Some(addr) = self.dtor_addr {
            let f: CtorDtorFn = std::mem::transmute(addr);
            f(self.handle.as_ref());
        }
    }

    pub fn raw_handle(&self) -> *mut c_void {
        self.library.raw()
    }

    pub fn function_table(&self) -> Rc<[FunctionRecord]> {
        Rc::from(self.functions.clone().into_boxed_slice())
    }
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("full_path", &self.full_path)
            .field("logical_name", &self.logical_name)
            .field("base_addr", &format_args!("{:#x}", self.base_addr))
            .field("functions", &self.functions.len())
            .field("digest", &self.digest)
            .finish()
    }
}
