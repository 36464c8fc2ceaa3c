//! Built-in pure math functions callable from expressions.
//!
//! The language exposes exactly the functions enumerated by the data model:
//! `abs, min, max, sqrt, pow, floor, ceil, round`. Anything else is an
//! `UnknownFunction` error at compile time.

/// Description of a built-in function: its arity, used to validate call
/// sites before bytecode is emitted.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub arity: usize,
}

pub static BUILTINS: &[BuiltinFn] = &[
    BuiltinFn { name: "abs", arity: 1 },
    BuiltinFn { name: "min", arity: 2 },
    BuiltinFn { name: "max", arity: 2 },
    BuiltinFn { name: "sqrt", arity: 1 },
    BuiltinFn { name: "pow", arity: 2 },
    BuiltinFn { name: "floor", arity: 1 },
    BuiltinFn { name: "ceil", arity: 1 },
    BuiltinFn { name: "round", arity: 1 },
];

pub fn lookup(name: &str) -> Option<&'static BuiltinFn> {
    BUILTINS.iter().find(|f| f.name == name)
}

/// Apply a builtin to its already-evaluated arguments. The compiler has
/// already checked arity, so this indexes unconditionally.
pub fn apply(name: &str, args: &[f64]) -> f64 {
    match name {
        "abs" => args[0].abs(),
        "min" => args[0].min(args[1]),
        "max" => args[0].max(args[1]),
        "sqrt" => args[0].sqrt(),
        "pow" => args[0].powf(args[1]),
        "floor" => args[0].floor(),
        "ceil" => args[0].ceil(),
        "round" => args[0].round(),
        other => unreachable!("apply called with unregistered builtin '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_registered_functions() {
        assert_eq!(lookup("sqrt").unwrap().arity, 1);
        assert_eq!(lookup("pow").unwrap().arity, 2);
        assert!(lookup("clamp").is_none());
    }

    #[test]
    fn apply_computes_expected_values() {
        assert_eq!(apply("abs", &[-5.0]), 5.0);
        assert_eq!(apply("min", &[3.0, 1.0]), 1.0);
        assert_eq!(apply("max", &[3.0, 1.0]), 3.0);
        assert_eq!(apply("sqrt", &[9.0]), 3.0);
        assert_eq!(apply("pow", &[2.0, 3.0]), 8.0);
        assert_eq!(apply("floor", &[1.7]), 1.0);
        assert_eq!(apply("ceil", &[1.2]), 2.0);
        assert_eq!(apply("round", &[1.5]), 2.0);
    }
}
