use bitflags::bitflags;

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

/// Access flags that can be written as Java-style modifier keywords (eg. `public static`)
pub trait AccessKeyword: Sized + std::ops::BitOrAssign {
    /// No flags set
    fn none() -> Self;

    /// Flag corresponding to a single keyword
    fn from_keyword(keyword: &str) -> Option<Self>;
}

impl AccessKeyword for ClassAccessFlags {
    fn none() -> Self {
        ClassAccessFlags::empty()
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let flag = match keyword {
            "public" => ClassAccessFlags::PUBLIC,
            "final" => ClassAccessFlags::FINAL,
            "super" => ClassAccessFlags::SUPER,
            "interface" => ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            "abstract" => ClassAccessFlags::ABSTRACT,
            "synthetic" => ClassAccessFlags::SYNTHETIC,
            "annotation" => ClassAccessFlags::ANNOTATION,
            "enum" => ClassAccessFlags::ENUM,
            _ => return None,
        };
        Some(flag)
    }
}

impl AccessKeyword for MethodAccessFlags {
    fn none() -> Self {
        MethodAccessFlags::empty()
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let flag = match keyword {
            "public" => MethodAccessFlags::PUBLIC,
            "private" => MethodAccessFlags::PRIVATE,
            "protected" => MethodAccessFlags::PROTECTED,
            "static" => MethodAccessFlags::STATIC,
            "final" => MethodAccessFlags::FINAL,
            "synchronized" => MethodAccessFlags::SYNCHRONIZED,
            "bridge" => MethodAccessFlags::BRIDGE,
            "varargs" => MethodAccessFlags::VARARGS,
            "native" => MethodAccessFlags::NATIVE,
            "abstract" => MethodAccessFlags::ABSTRACT,
            "strict" => MethodAccessFlags::STRICT,
            "synthetic" => MethodAccessFlags::SYNTHETIC,
            _ => return None,
        };
        Some(flag)
    }
}

impl AccessKeyword for FieldAccessFlags {
    fn none() -> Self {
        FieldAccessFlags::empty()
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let flag = match keyword {
            "public" => FieldAccessFlags::PUBLIC,
            "private" => FieldAccessFlags::PRIVATE,
            "protected" => FieldAccessFlags::PROTECTED,
            "static" => FieldAccessFlags::STATIC,
            "final" => FieldAccessFlags::FINAL,
            "volatile" => FieldAccessFlags::VOLATILE,
            "transient" => FieldAccessFlags::TRANSIENT,
            "synthetic" => FieldAccessFlags::SYNTHETIC,
            "enum" => FieldAccessFlags::ENUM,
            _ => return None,
        };
        Some(flag)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keywords() {
        assert_eq!(
            MethodAccessFlags::from_keyword("static"),
            Some(MethodAccessFlags::STATIC)
        );
        assert_eq!(
            ClassAccessFlags::from_keyword("interface"),
            Some(ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT)
        );
        assert_eq!(FieldAccessFlags::from_keyword("native"), None);
    }
}
