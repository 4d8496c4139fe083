//! The semantic type system shared by the IR and every backend.

use std::fmt;

/// A basic (non-aggregate, non-pointer) primitive type.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Basic {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 24-bit unsigned integer (used by the fixed-point widths below and by
    /// banked/far pointers on some 8-bit targets).
    U24,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 24-bit signed integer.
    I24,
    /// Boolean, represented as a single byte.
    Bool,
    /// The empty type; functions returning `Void` have no return value.
    Void,
    /// 8.8 fixed point.
    Fixed8_8,
    /// 16.16 fixed point.
    Fixed16_16,
    /// 8.16 fixed point.
    Fixed8_16,
    /// 16.8 fixed point.
    Fixed16_8,
    /// 24.8 fixed point.
    Fixed24_8,
}

impl Basic {
    /// Size in bytes of this primitive.
    pub fn size_of(self) -> u32 {
        match self {
            Basic::U8 | Basic::I8 | Basic::Bool => 1,
            Basic::U16 | Basic::I16 | Basic::Fixed8_8 => 2,
            Basic::U24 | Basic::I24 | Basic::Fixed16_8 | Basic::Fixed8_16 => 3,
            Basic::Void => 0,
            Basic::Fixed16_16 => 4,
            Basic::Fixed24_8 => 4,
        }
    }
}

/// A semantic type attached to instructions, locals, globals and
/// parameters. Every variant carries its own `size_of` in bytes, per
/// spec.md §3's "each carries a size in bytes attribute" invariant.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Type {
    /// A primitive scalar.
    Basic(Basic),
    /// Pointer to `T`.
    Pointer(Box<Type>),
    /// Fixed-size array of `len` elements of `elem`.
    Array {
        /// Element type.
        elem: Box<Type>,
        /// Number of elements.
        len: u32,
    },
    /// Named struct type; field layout is not modeled here (it is an
    /// upstream concern) — only the name and total size are needed by
    /// codegen for spill-slot and parameter sizing.
    Struct {
        /// Struct name.
        name: String,
        /// Total size in bytes.
        size: u32,
    },
    /// Length-prefixed string (1-byte length, up to 255 bytes of payload).
    Str,
    /// "Long" string: a `0xFF` marker byte followed by a 16-bit length.
    LongStr,
}

impl Type {
    /// Size in bytes of a value of this type.
    pub fn size_of(&self) -> u32 {
        match self {
            Type::Basic(b) => b.size_of(),
            Type::Pointer(_) => 2,
            Type::Array { elem, len } => elem.size_of() * len,
            Type::Struct { size, .. } => *size,
            Type::Str => 256, // 1-byte length prefix + up to 255 bytes
            Type::LongStr => 3 + 65535,
        }
    }

    /// `true` if a value of this type fits in a single byte.
    pub fn is_byte_sized(&self) -> bool {
        self.size_of() == 1
    }

    /// Shorthand for `Type::Basic(Basic::Void)`.
    pub fn void() -> Type {
        Type::Basic(Basic::Void)
    }

    /// Shorthand for `Type::Basic(Basic::U8)`.
    pub fn u8() -> Type {
        Type::Basic(Basic::U8)
    }

    /// Shorthand for `Type::Basic(Basic::U16)`.
    pub fn u16() -> Type {
        Type::Basic(Basic::U16)
    }

    /// Shorthand for a pointer to `inner`.
    pub fn pointer_to(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Basic(b) => write!(f, "{:?}", b),
            Type::Pointer(inner) => write!(f, "*{}", inner),
            Type::Array { elem, len } => write!(f, "[{}; {}]", elem, len),
            Type::Struct { name, .. } => write!(f, "struct {}", name),
            Type::Str => write!(f, "str"),
            Type::LongStr => write!(f, "lstr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_sizes() {
        assert_eq!(Basic::U8.size_of(), 1);
        assert_eq!(Basic::U16.size_of(), 2);
        assert_eq!(Basic::U24.size_of(), 3);
        assert_eq!(Basic::Void.size_of(), 0);
        assert_eq!(Basic::Fixed16_16.size_of(), 4);
    }

    #[test]
    fn pointer_is_always_two_bytes() {
        assert_eq!(Type::pointer_to(Type::u8()).size_of(), 2);
        assert_eq!(Type::pointer_to(Type::u16()).size_of(), 2);
    }

    #[test]
    fn array_size_multiplies() {
        let arr = Type::Array { elem: Box::new(Type::u16()), len: 4 };
        assert_eq!(arr.size_of(), 8);
    }
}
