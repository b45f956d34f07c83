//! `Framework`: the public entry point tying discovery, loading, linking,
//! dispatch, and hot reload together. One `Framework` holds the root path
//! and the ordered plugin list.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::discover;
use crate::dispatch::{self, CallResult, Prototype};
use crate::error::CoreError;
use crate::plugin::{self, PluginRecord};
use crate::reconcile::{self, NewStatus, OldStatus, PluginSummary};

const MAX_PLUGIN_PATH_SIZE: usize = 2048;

/// One running instance of the plugin framework.
///
/// Not `Sync`: the raw `dlopen` handles owned transitively by each
/// `PluginRecord` are not safe to touch from more than one thread at a
/// time -- enforced here by the type system (the `*mut c_void` handle
/// inside `plugin::record::Library` makes `Framework` `!Sync`
/// automatically) rather than left to documentation.
pub struct Framework {
    root: PathBuf,
    plugins: Vec<PluginRecord>,
    unloaded: bool,
}

impl Framework {
    /// Discover, load, link, and activate every plugin under `root` (or
    /// `cwd()/plugins` if `root` is `None`). See [`resolve_root`] for the
    /// exact path rules.
    pub fn init(root: Option<&str>) -> anyhow::Result<Framework> {
        let root = resolve_root(root)?;
        let plugins = load_all(&root, true)?;
        info!(root = %root.display(), plugins = plugins.len(), "framework initialized");
        Ok(Framework {
            root,
            plugins,
            unloaded: false,
        })
    }

    /// Same as [`Self::init`], but constructors are not invoked -- used
    /// directly by callers building a throwaway framework, and internally
    /// by [`Self::reload`] to build the "freshly discovered set".
    pub fn reload_init(root: Option<&str>) -> anyhow::Result<Framework> {
        let root = resolve_root(root)?;
        let plugins = load_all(&root, false)?;
        Ok(Framework {
            root,
            plugins,
            unloaded: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Log one line per plugin: ordinal, logical name, path, version,
    /// base address, digest, dependency names, and every function.
    pub fn print_loaded(&self) {
        for (ordinal, plugin) in self.plugins.iter().enumerate() {
            let deps: Vec<&str> = plugin
                .context
                .deps
                .iter()
                .map(|d| d.dep_lib_name.as_str())
                .collect();
            info!(
                ordinal,
                name = plugin.logical_name,
                path = %plugin.full_path.display(),
                version = plugin.context.version,
                base_addr = format_args!("{:#x}", plugin.base_addr),
                digest = %plugin.digest,
                deps = deps.join(", "),
                "plugin"
            );
            for f in &plugin.functions {
                info!(
                    plugin = plugin.logical_name,
                    function = f.name_or_sentinel(),
                    offset = f.offset,
                    addr = format_args!("{:#x}", f.addr),
                    "  function"
                );
            }
        }
    }

    fn find_plugin(&self, plugin_name: &str) -> Option<&PluginRecord> {
        self.plugins.iter().find(|p| p.logical_name == plugin_name)
    }

    /// Linear search for `func_name` inside `plugin_name`'s function
    /// table. `None` covers every recoverable failure -- empty list,
    /// unknown plugin, unknown function; each is logged here so call
    /// sites don't have to.
    pub fn get_func_addr(&self, plugin_name: &str, func_name: &str) -> Option<usize> {
        match self.find_plugin(plugin_name) {
            None => {
                error!(plugin = plugin_name, "get_func_addr: plugin not found");
                None
            }
            Some(plugin) => {
                let found = plugin
                    .functions
                    .iter()
                    .find(|f| f.name.as_deref() == Some(func_name))
                    .map(|f| f.addr);
                if found.is_none() {
                    error!(
                        plugin = plugin_name,
                        function = func_name,
                        "get_func_addr: function not found"
                    );
                }
                found
            }
        }
    }

    /// As [`Self::get_func_addr`] but returns the module-relative offset;
    /// `0` means "not found".
    pub fn get_func_offset(&self, plugin_name: &str, func_name: &str) -> u64 {
        match self.find_plugin(plugin_name) {
            None => {
                error!(plugin = plugin_name, "get_func_offset: plugin not found");
                0
            }
            Some(plugin) => {
                let found = plugin
                    .functions
                    .iter()
                    .find(|f| f.name.as_deref() == Some(func_name))
                    .map(|f| f.offset);
                match found {
                    Some(offset) => offset,
                    None => {
                        error!(
                            plugin = plugin_name,
                            function = func_name,
                            "get_func_offset: function not found"
                        );
                        0
                    }
                }
            }
        }
    }

    /// Resolve `func_name` inside `plugin_name`'s dependency `dep_name`,
    /// using its already-linked function table. Fatal, like
    /// [`plugin::link_dependencies`]: an unknown plugin, an undeclared or
    /// unlinked dependency, or a missing function all indicate a broken
    /// dependency graph rather than a recoverable lookup miss.
    pub fn get_dependency_func_addr(
        &self,
        plugin_name: &str,
        dep_name: &str,
        func_name: &str,
    ) -> anyhow::Result<usize> {
        let plugin = self.find_plugin(plugin_name).ok_or_else(|| CoreError::PluginNotFound {
            plugin: plugin_name.to_string(),
        })?;
        plugin::resolve_dependency_function(&plugin.context.deps, dep_name, func_name)
    }

    /// Pure dispatch to a raw address. See [`dispatch::dispatch`].
    ///
    /// # Safety
    /// `addr` must point to a function whose actual signature matches
    /// `proto`.
    pub unsafe fn call_by_addr(&self, addr: usize, proto: Prototype) -> Option<CallResult> {
        dispatch::dispatch(addr as *const (), proto)
    }

    /// Resolve `(plugin_name, func_name)` to an address, then dispatch.
    ///
    /// # Safety
    /// Same requirement as [`Self::call_by_addr`].
    pub unsafe fn call_by_name(
        &self,
        plugin_name: &str,
        func_name: &str,
        proto: Prototype,
    ) -> Option<CallResult> {
        let addr = self.get_func_addr(plugin_name, func_name)?;
        self.call_by_addr(addr, proto)
    }

    /// Resolve `(plugin_name, offset)` to an address, then dispatch.
    ///
    /// # Safety
    /// Same requirement as [`Self::call_by_addr`].
    pub unsafe fn call_by_offset(
        &self,
        plugin_name: &str,
        offset: u64,
        proto: Prototype,
    ) -> Option<CallResult> {
        let plugin = self.find_plugin(plugin_name).or_else(|| {
            error!(plugin = plugin_name, "call_by_offset: plugin not found");
            None
        })?;
        let addr = plugin.functions.iter().find(|f| f.offset == offset).map(|f| f.addr);
        let addr = match addr {
            Some(a) => a,
            None => {
                error!(plugin = plugin_name, offset, "call_by_offset: function not found");
                return None;
            }
        };
        self.call_by_addr(addr, proto)
    }

    /// Invoke every loaded plugin's destructor (if present), then drop
    /// every handle. Idempotent: a second call is a no-op. The framework
    /// value itself remains usable afterward -- its plugin list is simply
    /// empty.
    pub fn unload(&mut self) {
        if self.unloaded {
            return;
        }
        for plugin in &self.plugins {
            unsafe {
                plugin.call_destructor();
            }
        }
        self.plugins.clear();
        self.unloaded = true;
        info!(root = %self.root.display(), "framework unloaded");
    }

    /// Hot reload: discover the current state of `self.root` again,
    /// classify against what's live (see `reconcile.rs`), then apply hooks
    /// in four passes -- unmodified plugins carry over untouched; each
    /// reloaded pair runs the donor's destructor immediately followed by
    /// the incoming plugin's constructor; leftover old entries (deleted)
    /// are destroyed; leftover new entries are constructed. The merged,
    /// re-sorted result is re-linked and always written back to
    /// `self.plugins`, even if linking fails -- the reconciled plugins are
    /// live (hooks have already run) and must not be silently dropped, so
    /// a `Err` from a bad dependency in the new set still leaves the
    /// framework holding the real, reconciled plugin list.
    pub fn reload(&mut self, display_report: bool) -> anyhow::Result<()> {
        let fresh = load_all(&self.root, false)?;
        if fresh.is_empty() {
            info!(root = %self.root.display(), "nothing to reload");
            return Ok(());
        }

        let old_summaries: Vec<PluginSummary> = self.plugins.iter().map(summarize).collect();
        let new_summaries: Vec<PluginSummary> = fresh.iter().map(summarize).collect();
        let plan = reconcile::classify(&old_summaries, &new_summaries);

        if display_report {
            for (i, status) in plan.old.iter().enumerate() {
                if *status == OldStatus::Deleted {
                    info!(plugin = old_summaries[i].logical_name, "Deleted");
                }
            }
            for (i, status) in plan.old.iter().enumerate() {
                if *status == OldStatus::Unmodified {
                    info!(plugin = old_summaries[i].logical_name, "Unmodified");
                }
            }
            for (r, status) in plan.new.iter().enumerate() {
                match status {
                    NewStatus::Reloaded => info!(plugin = new_summaries[r].logical_name, "Reloaded"),
                    NewStatus::New => info!(plugin = new_summaries[r].logical_name, "New"),
                    NewStatus::Unmodified => {}
                }
            }
        }

        let mut old_slots: Vec<Option<PluginRecord>> =
            std::mem::take(&mut self.plugins).into_iter().map(Some).collect();
        let mut new_slots: Vec<Option<PluginRecord>> = fresh.into_iter().map(Some).collect();

        let mut merged = Vec::with_capacity(old_slots.len() + new_slots.len());

        // Pass 1: unmodified plugins carry over untouched.
        for (i, status) in plan.old.iter().enumerate() {
            if *status == OldStatus::Unmodified {
                merged.push(old_slots[i].take().expect("unmodified slot present"));
            }
        }

        // Pass 2: each reloaded pair, donor destructor then new-side
        // constructor, one pair at a time.
        for (i, status) in plan.old.iter().enumerate() {
            if *status != OldStatus::Reloaded {
                continue;
            }
            let donor = old_slots[i].take().expect("reloaded donor slot present");
            unsafe {
                donor.call_destructor();
            }
            let donor_name = donor.logical_name.clone();
            drop(donor);

            let r = plan
                .new
                .iter()
                .enumerate()
                .find(|(r, status)| {
                    **status == NewStatus::Reloaded
                        && new_slots[*r].as_ref().is_some_and(|p| p.logical_name == donor_name)
                })
                .map(|(r, _)| r)
                .expect("reloaded counterpart present");
            let incoming = new_slots[r].take().expect("reloaded counterpart present");
            unsafe {
                incoming.call_constructor();
            }
            merged.push(incoming);
        }

        // Pass 3: destroy whatever's left in old (deleted).
        for slot in old_slots.iter_mut() {
            if let Some(p) = slot.take() {
                unsafe {
                    p.call_destructor();
                }
            }
        }
        drop(old_slots);

        // Pass 4: construct whatever's left in new.
        for slot in new_slots.iter_mut() {
            if let Some(p) = slot.take() {
                unsafe {
                    p.call_constructor();
                }
                merged.push(p);
            }
        }
        drop(new_slots);

        merged.sort_by(|a, b| a.full_path.cmp(&b.full_path));

        let link_result = plugin::link_dependencies(&mut merged);
        self.plugins = merged;
        self.unloaded = false;
        link_result
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        self.unload();
    }
}

fn summarize(plugin: &PluginRecord) -> PluginSummary {
    PluginSummary {
        logical_name: plugin.logical_name.clone(),
        digest: plugin.digest,
    }
}

fn load_all(root: &Path, call_constructors: bool) -> anyhow::Result<Vec<PluginRecord>> {
    let candidates = discover::enumerate(root)?;
    let mut plugins = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        plugins.push(plugin::load(&candidate.full_path, &candidate.logical_name)?);
    }
    plugin::link_dependencies(&mut plugins)?;
    if call_constructors {
        for p in &plugins {
            unsafe {
                p.call_constructor();
            }
        }
    }
    Ok(plugins)
}

/// Resolve the framework root: `None` means `cwd()/plugins`; an absolute
/// string is used verbatim; a relative string is joined onto `cwd()`.
/// Fatal if the result exceeds `MAX_PLUGIN_PATH_SIZE` bytes.
fn resolve_root(root: Option<&str>) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|source| CoreError::Io {
        path: PathBuf::from("."),
        source,
    })?;

    let resolved = match root {
        None => cwd.join(discover::DEFAULT_PLUGIN_DIRNAME),
        Some(s) if Path::new(s).is_absolute() => PathBuf::from(s),
        Some(s) => cwd.join(s),
    };

    let len = resolved.as_os_str().len();
    if len > MAX_PLUGIN_PATH_SIZE {
        return Err(CoreError::PathTooLong {
            path: resolved.to_string_lossy().into_owned(),
            max: MAX_PLUGIN_PATH_SIZE,
        }
        .into());
    }
    Ok(resolved)
}
