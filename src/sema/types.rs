// Purpose: Define semantic types and their canonical rendering.
// Inputs/Outputs: Types are built by the checker and rendered for candidates/lookup.
// Invariants: Rendering is deterministic; the current package renders unqualified.
// Gotchas: Named carries no underlying type; resolution goes through the checker's
//   environment so self-referential types cannot recurse.

use std::fmt::Write as _;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Basic {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Str,
    UnsafePointer,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedString,
    UntypedNil,
}

impl Basic {
    pub fn name(&self) -> &'static str {
        match self {
            Basic::Bool => "bool",
            Basic::Int => "int",
            Basic::Int8 => "int8",
            Basic::Int16 => "int16",
            Basic::Int32 => "int32",
            Basic::Int64 => "int64",
            Basic::Uint => "uint",
            Basic::Uint8 => "uint8",
            Basic::Uint16 => "uint16",
            Basic::Uint32 => "uint32",
            Basic::Uint64 => "uint64",
            Basic::Uintptr => "uintptr",
            Basic::Float32 => "float32",
            Basic::Float64 => "float64",
            Basic::Complex64 => "complex64",
            Basic::Complex128 => "complex128",
            Basic::Str => "string",
            Basic::UnsafePointer => "unsafe.Pointer",
            Basic::UntypedBool => "untyped bool",
            Basic::UntypedInt => "untyped int",
            Basic::UntypedRune => "untyped rune",
            Basic::UntypedFloat => "untyped float",
            Basic::UntypedString => "untyped string",
            Basic::UntypedNil => "untyped nil",
        }
    }

    /// The type an untyped constant assumes when it needs a concrete one.
    pub fn default_type(&self) -> Basic {
        match self {
            Basic::UntypedBool => Basic::Bool,
            Basic::UntypedInt => Basic::Int,
            Basic::UntypedRune => Basic::Int32,
            Basic::UntypedFloat => Basic::Float64,
            Basic::UntypedString => Basic::Str,
            other => *other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// Reference to a defined type. The underlying type lives with the TypeName
/// object in the owning package's scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Named {
    pub pkg_path: String,
    pub pkg_name: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Method {
    pub name: String,
    pub sig: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Invalid,
    Basic(Basic),
    Named(Named),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(Option<u64>, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(ChanDir, Box<Type>),
    Func(Box<Signature>),
    Struct(Vec<Field>),
    Interface(Vec<Method>),
    Tuple(Vec<Type>),
}

impl Type {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    pub fn is_untyped(&self) -> bool {
        matches!(
            self,
            Type::Basic(
                Basic::UntypedBool
                    | Basic::UntypedInt
                    | Basic::UntypedRune
                    | Basic::UntypedFloat
                    | Basic::UntypedString
                    | Basic::UntypedNil
            )
        )
    }

    /// Untyped constants become their default type when stored.
    pub fn defaulted(self) -> Type {
        match self {
            Type::Basic(b) if self_is_untyped(b) => Type::Basic(b.default_type()),
            other => other,
        }
    }

    /// Strip one pointer level, for selector resolution.
    pub fn deref_once(&self) -> &Type {
        match self {
            Type::Pointer(inner) => inner.as_ref(),
            other => other,
        }
    }

    /// Render for candidates and lookup results; types defined in
    /// `current_pkg` render unqualified, everything else as `pkg.Name`.
    pub fn type_string(&self, current_pkg: &str) -> String {
        let mut out = String::new();
        self.write_to(&mut out, current_pkg);
        out
    }

    fn write_to(&self, out: &mut String, cur: &str) {
        match self {
            Type::Invalid => out.push_str("invalid type"),
            Type::Basic(b) => out.push_str(b.name()),
            Type::Named(n) => {
                if !n.pkg_name.is_empty() && n.pkg_name != cur {
                    let _ = write!(out, "{}.{}", n.pkg_name, n.name);
                } else {
                    out.push_str(&n.name);
                }
            }
            Type::Pointer(inner) => {
                out.push('*');
                inner.write_to(out, cur);
            }
            Type::Slice(inner) => {
                out.push_str("[]");
                inner.write_to(out, cur);
            }
            Type::Array(len, inner) => {
                match len {
                    Some(n) => {
                        let _ = write!(out, "[{}]", n);
                    }
                    None => out.push_str("[...]"),
                }
                inner.write_to(out, cur);
            }
            Type::Map(k, v) => {
                out.push_str("map[");
                k.write_to(out, cur);
                out.push(']');
                v.write_to(out, cur);
            }
            Type::Chan(dir, inner) => {
                match dir {
                    ChanDir::Both => out.push_str("chan "),
                    ChanDir::Send => out.push_str("chan<- "),
                    ChanDir::Recv => out.push_str("<-chan "),
                }
                inner.write_to(out, cur);
            }
            Type::Func(sig) => {
                out.push_str("func");
                sig.write_to(out, cur);
            }
            Type::Struct(fields) => {
                out.push_str("struct{");
                for (i, f) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    if !f.embedded {
                        let _ = write!(out, "{} ", f.name);
                    }
                    f.ty.write_to(out, cur);
                }
                out.push('}');
            }
            Type::Interface(methods) => {
                if methods.is_empty() {
                    out.push_str("interface{}");
                    return;
                }
                out.push_str("interface{");
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(&m.name);
                    m.sig.write_to(out, cur);
                }
                out.push('}');
            }
            Type::Tuple(items) => {
                out.push('(');
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    t.write_to(out, cur);
                }
                out.push(')');
            }
        }
    }
}

impl Signature {
    fn write_to(&self, out: &mut String, cur: &str) {
        out.push('(');
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if self.variadic && i == self.params.len() - 1 {
                out.push_str("...");
                match p {
                    Type::Slice(inner) => inner.write_to(out, cur),
                    other => other.write_to(out, cur),
                }
            } else {
                p.write_to(out, cur);
            }
        }
        out.push(')');
        match self.results.len() {
            0 => {}
            1 => {
                out.push(' ');
                self.results[0].write_to(out, cur);
            }
            _ => {
                out.push_str(" (");
                for (i, r) in self.results.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    r.write_to(out, cur);
                }
                out.push(')');
            }
        }
    }
}

fn self_is_untyped(b: Basic) -> bool {
    matches!(
        b,
        Basic::UntypedBool
            | Basic::UntypedInt
            | Basic::UntypedRune
            | Basic::UntypedFloat
            | Basic::UntypedString
            | Basic::UntypedNil
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_function_signatures() {
        let sig = Signature {
            params: vec![Type::Basic(Basic::Float64)],
            results: vec![Type::Basic(Basic::Float64)],
            variadic: false,
        };
        assert_eq!(
            Type::Func(Box::new(sig)).type_string("main"),
            "func(float64) float64"
        );
    }

    #[test]
    fn renders_variadic_and_multi_result() {
        let sig = Signature {
            params: vec![
                Type::Basic(Basic::Str),
                Type::Slice(Box::new(Type::Interface(Vec::new()))),
            ],
            results: vec![Type::Basic(Basic::Int), Type::named_for_test("error")],
            variadic: true,
        };
        assert_eq!(
            Type::Func(Box::new(sig)).type_string("main"),
            "func(string, ...interface{}) (int, error)"
        );
    }

    #[test]
    fn qualifies_foreign_named_types() {
        let t = Type::Named(Named {
            pkg_path: "bytes".to_string(),
            pkg_name: "bytes".to_string(),
            name: "Buffer".to_string(),
        });
        assert_eq!(t.type_string("main"), "bytes.Buffer");
        assert_eq!(t.type_string("bytes"), "Buffer");
    }

    #[test]
    fn renders_container_types() {
        let t = Type::Map(
            Box::new(Type::Basic(Basic::Str)),
            Box::new(Type::Slice(Box::new(Type::Basic(Basic::Int)))),
        );
        assert_eq!(t.type_string(""), "map[string][]int");
    }
}

#[cfg(test)]
impl Type {
    fn named_for_test(name: &str) -> Type {
        Type::Named(Named {
            pkg_path: String::new(),
            pkg_name: String::new(),
            name: name.to_string(),
        })
    }
}
