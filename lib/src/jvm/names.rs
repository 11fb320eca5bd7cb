use std::borrow::Cow;
use std::fmt;

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, with `/` separating package segments
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Validated string names which can be borrowed back out
pub trait Name: Sized {
    /// Describe why a string is not a valid name, if it isn't one
    fn check_valid(name: &str) -> Result<(), String>;

    /// Wrap an already validated string
    fn from_validated(name: Cow<'static, str>) -> Self;

    fn as_str(&self) -> &str;

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(Self::from_validated(Cow::Owned(name)))
    }
}

/// Characters which never appear in an unqualified name
const RESERVED: [char; 4] = ['.', ';', '[', '/'];

impl Name for UnqualifiedName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("Unqualified name is empty"));
        }
        if let Some(bad) = name.chars().find(|c| RESERVED.contains(c)) {
            return Err(format!("Unqualified name '{}' contains '{}'", name, bad));
        }
        let special = name == UnqualifiedName::INIT.as_str() || name == UnqualifiedName::CLINIT.as_str();
        if !special && name.contains(&['<', '>'][..]) {
            return Err(format!(
                "Unqualified name '{}' has angle brackets but is neither <init> nor <clinit>",
                name
            ));
        }
        Ok(())
    }

    fn from_validated(name: Cow<'static, str>) -> Self {
        UnqualifiedName(name)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl Name for BinaryName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("Binary name is empty"));
        }
        for segment in name.split('/') {
            if segment.is_empty() {
                return Err(format!("Binary name '{}' has an empty segment", name));
            }
            if let Some(bad) = segment.chars().find(|c| RESERVED.contains(c) || *c == '<' || *c == '>') {
                return Err(format!("Binary name '{}' contains '{}'", name, bad));
            }
        }
        Ok(())
    }

    fn from_validated(name: Cow<'static, str>) -> Self {
        BinaryName(name)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Both kinds of name print as their raw text, both for `{}` and `{:?}`
macro_rules! name_formatting {
    ($($name:ident),*) => {$(
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

name_formatting!(UnqualifiedName, BinaryName);

impl UnqualifiedName {
    const fn known(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Instance initialization method
    pub const INIT: Self = Self::known("<init>");

    /// Class initialization method
    pub const CLINIT: Self = Self::known("<clinit>");

    pub const EQUALS: Self = Self::known("equals");
    pub const GETCLASS: Self = Self::known("getClass");
    pub const GETMESSAGE: Self = Self::known("getMessage");
    pub const HASHCODE: Self = Self::known("hashCode");
    pub const INTVALUE: Self = Self::known("intValue");
    pub const LENGTH: Self = Self::known("length");
    pub const MAXVALUE: Self = Self::known("MAX_VALUE");
    pub const TOSTRING: Self = Self::known("toString");
    pub const VALUEOF: Self = Self::known("valueOf");

    /// Is this `<init>` or `<clinit>`?
    pub fn is_initializer(&self) -> bool {
        self == &Self::INIT || self == &Self::CLINIT
    }
}

impl BinaryName {
    const fn known(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // Classes the verifier itself needs to reason about
    pub const OBJECT: Self = Self::known("java/lang/Object");
    pub const STRING: Self = Self::known("java/lang/String");
    pub const CLASS: Self = Self::known("java/lang/Class");
    pub const THROWABLE: Self = Self::known("java/lang/Throwable");
    pub const CLONEABLE: Self = Self::known("java/lang/Cloneable");
    pub const SERIALIZABLE: Self = Self::known("java/io/Serializable");
    pub const METHODHANDLE: Self = Self::known("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::known("java/lang/invoke/MethodType");

    // Rest of the bundled library
    pub const ARITHMETICEXCEPTION: Self = Self::known("java/lang/ArithmeticException");
    pub const CHARSEQUENCE: Self = Self::known("java/lang/CharSequence");
    pub const COMPARABLE: Self = Self::known("java/lang/Comparable");
    pub const ERROR: Self = Self::known("java/lang/Error");
    pub const EXCEPTION: Self = Self::known("java/lang/Exception");
    pub const INTEGER: Self = Self::known("java/lang/Integer");
    pub const NULLPOINTEREXCEPTION: Self = Self::known("java/lang/NullPointerException");
    pub const NUMBER: Self = Self::known("java/lang/Number");
    pub const RUNTIMEEXCEPTION: Self = Self::known("java/lang/RuntimeException");
}
