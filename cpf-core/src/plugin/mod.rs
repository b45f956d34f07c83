//! Plugin data model, loading, and dependency linking.

pub mod linker;
pub mod loader;
pub mod record;

pub use linker::{link_dependencies, resolve_dependency_function};
pub use loader::load;
pub use record::{
    DependencyEntry, FunctionRecord, Library, PluginContext, PluginHandle, PluginRecord,
    CONSTRUCTOR_SYMBOL, DESTRUCTOR_SYMBOL, INIT_CTX_SYMBOL,
};
