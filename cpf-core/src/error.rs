//! Fatal-error taxonomy for the plugin core.
//!
//! Every variant here is unrecoverable: the caller (ultimately `main`) is
//! expected to log and exit, never to retry or paper over it. Recoverable
//! conditions (missing plugin, missing function, unknown prototype, ...)
//! never construct a `CoreError` at all -- they return `None`/`0` straight
//! from the call site and log through `tracing::error!`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot read plugin file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin path {path} exceeds the maximum length of {max} bytes")]
    PathTooLong { path: String, max: usize },

    #[error("dlopen failed for {path}: {message}")]
    DlOpen { path: PathBuf, message: String },

    #[error("dlinfo(RTLD_DI_LINKMAP) failed for {path}: {message}")]
    LinkMap { path: PathBuf, message: String },

    #[error("{path} does not start with the ELF magic number")]
    ElfMagic { path: PathBuf },

    #[error("{path} was built for a different machine architecture")]
    ElfMachine { path: PathBuf },

    #[error("{path} is not a shared object (ET_DYN)")]
    ElfFileType { path: PathBuf },

    #[error("plugin {name} does not export the mandatory {symbol} symbol")]
    MissingInitCtx { name: String, symbol: &'static str },

    #[error("plugin {name}'s {symbol}() returned a null context")]
    NullContext { name: String, symbol: &'static str },

    #[error("plugin {name}'s context has a null dependency list")]
    NullDeps { name: String },

    #[error("plugin {name} exports zero application functions")]
    NoFunctions { name: String },

    #[error("plugin {plugin} declares a dependency on itself ({dep})")]
    SelfDependency { plugin: String, dep: String },

    #[error("plugin {plugin} depends on {dep}, which is not loaded in this framework")]
    DependencyMissing { plugin: String, dep: String },

    #[error("plugin {plugin} not found in this framework")]
    PluginNotFound { plugin: String },

    #[error("dependency {dep} is not declared, or has not been linked yet")]
    DependencyUnresolved { dep: String },

    #[error("function {func} not found in dependency {dep}")]
    DependencyFunctionMissing { dep: String, func: String },

    #[error(
        "discovery pass mismatch under {root}: counted {counted} files but populated {populated} \
         (directory changed during discovery)"
    )]
    DiscoveryCountMismatch {
        root: PathBuf,
        counted: usize,
        populated: usize,
    },
}
