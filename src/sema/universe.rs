// Purpose: Provide the predeclared identifiers and the built-in unsafe package.
// Inputs/Outputs: Static tables consulted by the checker and by completion.
// Invariants: The unsafe package is never loaded from disk.
// Gotchas: Builtin signatures are approximations; their argument handling is
//   special-cased in the checker, not driven by these types.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::types::{Basic, Signature, Type};
use super::{ObjKind, Object, TypedPackage};

fn obj(name: &str, kind: ObjKind, ty: Type) -> Object {
    Object {
        name: name.to_string(),
        kind,
        ty,
        pkg_path: String::new(),
        pkg_name: String::new(),
        file: None,
        span: None,
    }
}

fn func1(param: Type, result: Type) -> Type {
    Type::Func(Box::new(Signature {
        params: vec![param],
        results: vec![result],
        variadic: false,
    }))
}

static UNIVERSE: Lazy<BTreeMap<String, Object>> = Lazy::new(|| {
    let mut m = BTreeMap::new();
    let basics = [
        ("bool", Basic::Bool),
        ("int", Basic::Int),
        ("int8", Basic::Int8),
        ("int16", Basic::Int16),
        ("int32", Basic::Int32),
        ("int64", Basic::Int64),
        ("uint", Basic::Uint),
        ("uint8", Basic::Uint8),
        ("uint16", Basic::Uint16),
        ("uint32", Basic::Uint32),
        ("uint64", Basic::Uint64),
        ("uintptr", Basic::Uintptr),
        ("float32", Basic::Float32),
        ("float64", Basic::Float64),
        ("complex64", Basic::Complex64),
        ("complex128", Basic::Complex128),
        ("string", Basic::Str),
        ("byte", Basic::Uint8),
        ("rune", Basic::Int32),
    ];
    for (name, b) in basics {
        m.insert(name.to_string(), obj(name, ObjKind::TypeName, Type::Basic(b)));
    }
    m.insert(
        "error".to_string(),
        obj(
            "error",
            ObjKind::TypeName,
            Type::Interface(vec![super::types::Method {
                name: "Error".to_string(),
                sig: Signature {
                    params: Vec::new(),
                    results: vec![Type::Basic(Basic::Str)],
                    variadic: false,
                },
            }]),
        ),
    );
    m.insert(
        "true".to_string(),
        obj("true", ObjKind::Const, Type::Basic(Basic::UntypedBool)),
    );
    m.insert(
        "false".to_string(),
        obj("false", ObjKind::Const, Type::Basic(Basic::UntypedBool)),
    );
    m.insert(
        "iota".to_string(),
        obj("iota", ObjKind::Const, Type::Basic(Basic::UntypedInt)),
    );
    m.insert(
        "nil".to_string(),
        obj("nil", ObjKind::Const, Type::Basic(Basic::UntypedNil)),
    );
    for b in builtin_funcs() {
        m.insert(b.name.clone(), b);
    }
    m
});

fn builtin_funcs() -> Vec<Object> {
    let any = Type::Interface(Vec::new());
    let int = Type::Basic(Basic::Int);
    vec![
        obj("len", ObjKind::Builtin, func1(any.clone(), int.clone())),
        obj("cap", ObjKind::Builtin, func1(any.clone(), int.clone())),
        obj(
            "append",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![
                    Type::Slice(Box::new(any.clone())),
                    Type::Slice(Box::new(any.clone())),
                ],
                results: vec![Type::Slice(Box::new(any.clone()))],
                variadic: true,
            })),
        ),
        obj(
            "copy",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![
                    Type::Slice(Box::new(any.clone())),
                    Type::Slice(Box::new(any.clone())),
                ],
                results: vec![int],
                variadic: false,
            })),
        ),
        obj(
            "delete",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![
                    Type::Map(Box::new(any.clone()), Box::new(any.clone())),
                    any.clone(),
                ],
                results: Vec::new(),
                variadic: false,
            })),
        ),
        obj("new", ObjKind::Builtin, func1(any.clone(), Type::Pointer(Box::new(any.clone())))),
        obj(
            "make",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![any.clone(), Type::Basic(Basic::Int)],
                results: vec![any.clone()],
                variadic: true,
            })),
        ),
        obj(
            "close",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![Type::Chan(
                    super::types::ChanDir::Both,
                    Box::new(any.clone()),
                )],
                results: Vec::new(),
                variadic: false,
            })),
        ),
        obj(
            "panic",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![any.clone()],
                results: Vec::new(),
                variadic: false,
            })),
        ),
        obj(
            "recover",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: Vec::new(),
                results: vec![any.clone()],
                variadic: false,
            })),
        ),
        obj(
            "print",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![Type::Slice(Box::new(any.clone()))],
                results: Vec::new(),
                variadic: true,
            })),
        ),
        obj(
            "println",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![Type::Slice(Box::new(any.clone()))],
                results: Vec::new(),
                variadic: true,
            })),
        ),
        obj(
            "complex",
            ObjKind::Builtin,
            Type::Func(Box::new(Signature {
                params: vec![Type::Basic(Basic::Float64), Type::Basic(Basic::Float64)],
                results: vec![Type::Basic(Basic::Complex128)],
                variadic: false,
            })),
        ),
        obj("real", ObjKind::Builtin, func1(Type::Basic(Basic::Complex128), Type::Basic(Basic::Float64))),
        obj("imag", ObjKind::Builtin, func1(Type::Basic(Basic::Complex128), Type::Basic(Basic::Float64))),
    ]
}

pub fn universe_objects() -> &'static BTreeMap<String, Object> {
    &UNIVERSE
}

pub fn builtin_object(name: &str) -> Option<Object> {
    UNIVERSE
        .get(name)
        .filter(|o| o.kind == ObjKind::Builtin)
        .cloned()
}

static UNSAFE: Lazy<Arc<TypedPackage>> = Lazy::new(|| {
    let mut scope = BTreeMap::new();
    let mut pointer = obj(
        "Pointer",
        ObjKind::TypeName,
        Type::Basic(Basic::UnsafePointer),
    );
    pointer.pkg_path = "unsafe".to_string();
    pointer.pkg_name = "unsafe".to_string();
    scope.insert("Pointer".to_string(), pointer);
    for name in ["Sizeof", "Alignof", "Offsetof"] {
        let mut o = obj(
            name,
            ObjKind::Func,
            func1(Type::Interface(Vec::new()), Type::Basic(Basic::Uintptr)),
        );
        o.pkg_path = "unsafe".to_string();
        o.pkg_name = "unsafe".to_string();
        scope.insert(name.to_string(), o);
    }
    Arc::new(TypedPackage {
        path: "unsafe".to_string(),
        name: "unsafe".to_string(),
        scope,
        methods: BTreeMap::new(),
    })
});

/// The `unsafe` pseudo-package; handed out by the cache without touching disk.
pub fn unsafe_package() -> Arc<TypedPackage> {
    UNSAFE.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_has_basic_types_and_builtins() {
        let u = universe_objects();
        assert_eq!(u["int"].kind, ObjKind::TypeName);
        assert_eq!(u["len"].kind, ObjKind::Builtin);
        assert_eq!(u["nil"].kind, ObjKind::Const);
    }

    #[test]
    fn unsafe_package_is_shared() {
        let a = unsafe_package();
        let b = unsafe_package();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.scope.contains_key("Pointer"));
        assert!(a.scope.contains_key("Sizeof"));
    }
}
