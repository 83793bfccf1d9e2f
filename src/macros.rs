/// returns name of current function.
macro_rules! fn_name_bare {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("unknown")
    }};
}

/// returns name of current function plus "()"
macro_rules! fn_name {
    () => {{
        format!("{}()", crate::macros::fn_name_bare!())
    }};
}

/// Builds a [`TestContext`](crate::config_models::test_context::TestContext)
/// for the test function this is invoked from.
///
/// Exported, so it is self-contained rather than built on `fn_name_bare`.
#[macro_export]
macro_rules! test_context {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let test_name = type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("unknown_test");
        $crate::config_models::test_context::TestContext::new(module_path!(), test_name)
    }};
}

// These allow the macros to be used as
// use crate::macros::xxxxx;
//
// see: https://stackoverflow.com/a/67140319/10087197
#[allow(unused_imports)]
pub(crate) use fn_name;
#[allow(unused_imports)]
pub(crate) use fn_name_bare;
