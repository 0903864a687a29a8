//! Choice data compiled into the program itself.
//!
//! A function `foo` may carry its own decisions in a constant global string
//! named after it. C, C static, C `main`-local and C++ function-local
//! spellings are recognized, in that order.

use ir::{Function, GlobalInit, Module};

const SUFFIX: &str = "_OptimisticChoices";

/// Global names tried for `function`, most specific spelling first.
pub fn lookup_keys(function: &str) -> Vec<String> {
    let base = function.replace('.', "_");
    let c_name = format!("{base}{SUFFIX}");
    let mut keys = vec![format!("_ZL{}{c_name}", c_name.len())];
    keys.insert(0, c_name);
    if function == "main" {
        keys.push(format!("_ZZ4mainE18{SUFFIX}"));
    }
    let tail = base.char_indices().nth(1).map_or("", |(at, _)| &base[at..]);
    keys.push(format!("_Z{tail}E18{SUFFIX}"));
    keys
}

/// Whether `function` may carry embedded data at all.
pub fn may_carry_data(function: &Function) -> bool {
    function.is_intrinsic()
        || function.num_uses > 0
        || !(function.has_internal_linkage() || function.is_declaration())
}

/// Embedded data for `function`. The first global that exists decides; a
/// reference is followed once. `None` if no global exists or it holds no
/// character data.
pub fn lookup<'m>(module: &'m Module, function: &Function) -> Option<&'m str> {
    let global = lookup_keys(&function.name)
        .iter()
        .find_map(|key| module.global(key))?;
    let data = module.global_string(&global.name);
    if data.is_none() {
        if let Some(GlobalInit::Ref(target)) = &global.init {
            tracing::warn!(
                function = %function.name,
                global = %global.name,
                referenced = %target,
                "embedded choices reference no character data"
            );
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use ir::{Global, Linkage};

    #[test]
    fn test_lookup_keys() {
        assert_eq!(
            lookup_keys("foo.cold"),
            vec![
                "foo_cold_OptimisticChoices",
                "_ZL26foo_cold_OptimisticChoices",
                "_Zoo_coldE18_OptimisticChoices",
            ]
        );
        assert_eq!(lookup_keys("main")[2], "_ZZ4mainE18_OptimisticChoices");
        assert_eq!(lookup_keys("_Z3fooi")[2], "_ZZ3fooiE18_OptimisticChoices");
        assert_eq!(lookup_keys("")[2], "_ZE18_OptimisticChoices");
        assert_eq!(lookup_keys("f")[2], "_ZE18_OptimisticChoices");
        assert_eq!(lookup_keys("éfoo")[2], "_ZfooE18_OptimisticChoices");
    }

    fn module(globals: Vec<Global>) -> Module {
        Module {
            name: "m".into(),
            functions: vec![],
            globals,
        }
    }

    fn global(name: &str, init: Option<GlobalInit>) -> Global {
        Global {
            name: name.into(),
            init,
        }
    }

    #[test]
    fn test_lookup_follows_one_reference() {
        let f = Function::new("main");
        let m = module(vec![
            global("_ZZ4mainE18_OptimisticChoices", Some(GlobalInit::Ref(".str".into()))),
            global(".str", Some(GlobalInit::String("#c61\0".into()))),
        ]);
        assert_eq!(lookup(&m, &f), Some("#c61\0"));
    }

    #[test]
    fn test_first_existing_global_decides() {
        let f = Function::new("foo");
        let m = module(vec![
            global("foo_OptimisticChoices", None),
            global("_ZL21foo_OptimisticChoices", Some(GlobalInit::String("#c61".into()))),
        ]);
        assert_eq!(lookup(&m, &f), None);

        let m = module(vec![global(
            "foo_OptimisticChoices",
            Some(GlobalInit::Ref("foo_OptimisticChoices".into())),
        )]);
        assert_eq!(lookup(&m, &f), None);
    }

    #[test]
    fn test_unused_local_functions_carry_nothing() {
        let mut f = Function::new("helper");
        f.linkage = Linkage::Internal;
        assert!(!may_carry_data(&f));
        f.num_uses = 1;
        assert!(may_carry_data(&f));
        assert!(may_carry_data(&Function::new("llvm.assume")));
        assert!(!may_carry_data(&Function::new("puts")));
    }
}
