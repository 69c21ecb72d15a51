/// Trims a fully qualified function path down to its last two segments.
#[inline]
pub fn clean_function_name(name: &str) -> &str {
    if let Some(colon) = name.rfind("::") {
        if let Some(colon) = name[..colon].rfind("::") {
            // "akari_render::renderpass::RenderPassBuilder::recreate" -> "RenderPassBuilder::recreate"
            &name[colon + 2..]
        } else {
            name
        }
    } else {
        name
    }
}

#[macro_export]
macro_rules! profile_scope {
    ($name: expr) => {
        $crate::profiling::scope!($name);
    };

    ($name: expr, $data: expr) => {
        $crate::profiling::scope!($name, $data);
    };
}

#[macro_export]
macro_rules! profile_function {
    () => {
        $crate::profile_scope!($crate::function!())
    };
}

#[macro_export]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = &name[..name.len() - 3];

        $crate::clean_function_name(name)
    }};
}
