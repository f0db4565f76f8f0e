//! Conversion of type-checked modules into IR packages.
//!
//! The driver hands functions over one at a time, callees before callers
//! and constants before the functions that use them; each conversion
//! appends one IR function (named by the mangler) to the package.

mod builtins;
mod context;
mod expr;
pub mod interp;
mod loops;
mod matcher;

use std::collections::BTreeSet;
use std::collections::HashSet;
use std::rc::Rc;

use itertools::Itertools;
use tracing::debug;

use crate::ast::{free_name_defs, AstNodeId, ConstantDef, Module};
use crate::ir::Package;
use crate::types::{SymbolicBindings, TypeInfo};
use crate::{ConversionError, Result};

use context::IrConverter;

#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    /// Attach source locations (derived from AST spans) to emitted nodes.
    pub emit_positions: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            emit_positions: true,
        }
    }
}

/// One entry of the conversion order: a function instantiation to convert,
/// in the module that declares it.
#[derive(Debug, Clone)]
pub struct ConversionRecord {
    pub module: Rc<Module>,
    pub type_info: Rc<TypeInfo>,
    pub function: String,
    pub symbolic_bindings: Option<SymbolicBindings>,
}

/// Mangles a (possibly parametric) function instantiation into its unique
/// package-level symbol.
///
/// Every free parametric key must be covered by the symbolic bindings. The
/// output is `__<module>__<fn>` (dots in the module name become
/// underscores), with `__v1_v2_...` appended when the bindings carry
/// values, in binding-declaration order.
pub fn mangle_name(
    function_name: &str,
    free_keys: &BTreeSet<String>,
    module: &Module,
    symbolic_bindings: Option<&SymbolicBindings>,
) -> Result<String> {
    let binding_keys: BTreeSet<String> = symbolic_bindings
        .map(|b| b.keys().map(str::to_string).collect())
        .unwrap_or_default();
    if free_keys.difference(&binding_keys).next().is_some() {
        return Err(ConversionError::invalid_argument(
            None,
            format!(
                "Not enough symbolic bindings to convert function `{function_name}`; need {{{}}} got {{{}}}",
                free_keys.iter().join(", "),
                binding_keys.iter().join(", ")
            ),
        ));
    }

    let module_name = module.name.replace('.', "_");
    match symbolic_bindings {
        Some(bindings) if !bindings.is_empty() => {
            let suffix = bindings.values().map(|v| v.to_string()).join("_");
            Ok(format!("__{module_name}__{function_name}__{suffix}"))
        }
        _ => Ok(format!("__{module_name}__{function_name}")),
    }
}

/// Module constants referenced (transitively) from `root`, dependencies
/// first.
fn collect_constant_deps(module: &Module, root: AstNodeId, out: &mut Vec<ConstantDef>) {
    fn walk(
        module: &Module,
        root: AstNodeId,
        seen: &mut HashSet<AstNodeId>,
        out: &mut Vec<ConstantDef>,
    ) {
        for name_def in free_name_defs(module, root) {
            let Some(def) = module.constant_def_for_name_def(name_def) else {
                continue;
            };
            if !seen.insert(name_def) {
                continue;
            }
            let def = *def;
            walk(module, def.value, seen, out);
            out.push(def);
        }
    }
    let mut seen = HashSet::new();
    walk(module, root, &mut seen, out);
}

/// Converts a single function instantiation into the package.
///
/// Callees must already have been converted (the driver supplies functions
/// in dependency order); constants the body depends on are lowered first.
pub fn convert_one_function(
    package: &mut Package,
    module: &Rc<Module>,
    type_info: &Rc<TypeInfo>,
    function_name: &str,
    symbolic_bindings: Option<&SymbolicBindings>,
    options: ConvertOptions,
) -> Result<()> {
    let function = module.get_function(function_name).ok_or_else(|| {
        ConversionError::not_found(
            None,
            format!(
                "no function named `{function_name}` in module `{}`",
                module.name
            ),
        )
    })?;
    let mangled = mangle_name(
        function_name,
        &function.free_parametric_keys(module),
        module,
        symbolic_bindings,
    )?;
    debug!(function = function_name, mangled = %mangled, "converting function to IR");

    let mut converter = IrConverter::new(
        package,
        Rc::clone(module),
        Rc::clone(type_info),
        options,
        &mangled,
    );
    let mut deps = Vec::new();
    collect_constant_deps(module, function.body, &mut deps);
    for def in deps {
        converter.add_constant_dep(def);
    }
    converter.convert_function(function, symbolic_bindings)
}

/// Converts the given instantiations, in order, into a fresh package named
/// after `module`.
pub fn convert_module_to_package(
    module: &Rc<Module>,
    order: &[ConversionRecord],
    options: ConvertOptions,
) -> Result<Package> {
    let mut package = Package::new(module.name.clone());
    for record in order {
        convert_one_function(
            &mut package,
            &record.module,
            &record.type_info,
            &record.function,
            record.symbolic_bindings.as_ref(),
            options,
        )?;
    }
    Ok(package)
}
