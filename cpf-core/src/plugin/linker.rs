//! Dependency linking: wire each plugin's declared dependency names to
//! the full function table of the matching loaded plugin.
//!
//! For every dependency entry, scan the loaded set for a plugin whose
//! logical name matches, reject a plugin depending on itself, and fail
//! fatally if no match exists. Resolution is host-side, into
//! `DependencyEntry::resolved_functions`, rather than writing a resolved
//! pointer back through raw memory into another plugin's `.so` image.

use std::collections::HashMap;

use crate::error::CoreError;

use super::record::{DependencyEntry, PluginRecord};

/// Resolve every plugin's dependency list against `plugins`, keyed by
/// logical name. Mutates `plugins` in place. Fatal on a self-dependency
/// or an unresolvable dependency name.
pub fn link_dependencies(plugins: &mut [PluginRecord]) -> anyhow::Result<()> {
    let tables: HashMap<String, _> = plugins
        .iter()
        .map(|p| (p.logical_name.clone(), p.function_table()))
        .collect();

    for plugin in plugins.iter_mut() {
        for dep in plugin.context.deps.iter_mut() {
            if dep.dep_lib_name == plugin.logical_name {
                return Err(CoreError::SelfDependency {
                    plugin: plugin.logical_name.clone(),
                    dep: dep.dep_lib_name.clone(),
                }
                .into());
            }

            let table = tables.get(&dep.dep_lib_name).ok_or_else(|| {
                CoreError::DependencyMissing {
                    plugin: plugin.logical_name.clone(),
                    dep: dep.dep_lib_name.clone(),
                }
            })?;
            dep.resolved_functions = Some(table.clone());
        }
    }

    Ok(())
}

/// Look up one function by name inside an already-resolved dependency's
/// table. Fatal, like [`link_dependencies`]: an undeclared or unlinked
/// dependency, or a function missing from its table, are both treated as
/// a broken dependency graph rather than a recoverable lookup miss.
pub fn resolve_dependency_function(
    deps: &[DependencyEntry],
    dep_name: &str,
    func_name: &str,
) -> anyhow::Result<usize> {
    let dep = deps
        .iter()
        .find(|d| d.dep_lib_name == dep_name)
        .and_then(|d| d.resolved_functions.as_ref())
        .ok_or_else(|| CoreError::DependencyUnresolved {
            dep: dep_name.to_string(),
        })?;

    dep.iter()
        .find(|f| f.name.as_deref() == Some(func_name))
        .map(|f| f.addr)
        .ok_or_else(|| {
            CoreError::DependencyFunctionMissing {
                dep: dep_name.to_string(),
                func: func_name.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::record::{DependencyEntry, FunctionRecord, PluginContext};
    use std::path::PathBuf;

    fn stub_plugin(name: &str, dep: Option<&str>) -> PluginRecord {
        let deps = match dep {
            Some(d) => vec![DependencyEntry {
                dep_lib_name: d.to_string(),
                resolved_functions: None,
            }],
            None => vec![],
        };
        let context = PluginContext {
            version: "1.0".to_string(),
            deps,
        };
        unsafe {
            PluginRecord::new(
                PathBuf::from(format!("{name}.so")),
                name.to_string(),
                crate::plugin::record::Library::from_raw(std::ptr::null_mut()),
                0,
                vec![FunctionRecord {
                    addr: 1,
                    offset: 1,
                    name: Some("f".to_string()),
                }],
                context,
                None,
                None,
                crate::hash::digest_file(std::path::Path::new(file!())).unwrap(),
            )
        }
    }

    #[test]
    fn resolves_existing_dependency() {
        let mut plugins = vec![stub_plugin("base", None), stub_plugin("app", Some("base"))];
        link_dependencies(&mut plugins).unwrap();
        let app = &plugins[1];
        assert!(app.context.deps[0].resolved_functions.is_some());
        assert_eq!(app.context.deps[0].resolved_functions.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let mut plugins = vec![stub_plugin("app", Some("missing"))];
        assert!(link_dependencies(&mut plugins).is_err());
    }

    #[test]
    fn self_dependency_is_fatal() {
        let mut plugins = vec![stub_plugin("app", Some("app"))];
        assert!(link_dependencies(&mut plugins).is_err());
    }

    #[test]
    fn resolve_dependency_function_finds_linked_entry() {
        let mut plugins = vec![stub_plugin("base", None), stub_plugin("app", Some("base"))];
        link_dependencies(&mut plugins).unwrap();
        let app = &plugins[1];
        let addr = resolve_dependency_function(&app.context.deps, "base", "f").unwrap();
        assert_eq!(addr, 1);
    }

    #[test]
    fn resolve_dependency_function_missing_dep_is_fatal() {
        let plugins = vec![stub_plugin("app", None)];
        assert!(resolve_dependency_function(&plugins[0].context.deps, "base", "f").is_err());
    }

    #[test]
    fn resolve_dependency_function_unlinked_dep_is_fatal() {
        let plugins = vec![stub_plugin("app", Some("base"))];
        assert!(resolve_dependency_function(&plugins[0].context.deps, "base", "f").is_err());
    }

    #[test]
    fn resolve_dependency_function_missing_function_is_fatal() {
        let mut plugins = vec![stub_plugin("base", None), stub_plugin("app", Some("base"))];
        link_dependencies(&mut plugins).unwrap();
        let app = &plugins[1];
        assert!(resolve_dependency_function(&app.context.deps, "base", "missing").is_err());
    }
}
