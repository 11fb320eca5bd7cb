//! Field and method descriptors
//!
//! Descriptors are the compact type syntax the JVM uses in class files and that the assembler
//! reuses as is: `I` is an `int`, `[Ljava/lang/String;` is a `String[]`, and `(JI)V` is a method
//! taking a `long` and an `int` and returning nothing.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.3

use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};

/// Types which can be written out as a descriptor
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut rendered = String::new();
        self.render_to(&mut rendered);
        rendered
    }

    fn render_to(&self, write_to: &mut String);
}

/// Types which can be read back from a descriptor
pub trait ParseDescriptor: Sized {
    /// Parse a descriptor, which must span the whole string
    fn parse(source: &str) -> Result<Self> {
        let mut cursor = DescriptorCursor { source, offset: 0 };
        let parsed = Self::parse_from(&mut cursor)?;
        if cursor.offset < source.len() {
            return Err(cursor.error("trailing characters after the descriptor"));
        }
        Ok(parsed)
    }

    fn parse_from(cursor: &mut DescriptorCursor) -> Result<Self>;
}

/// Position in a descriptor being parsed
pub struct DescriptorCursor<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> DescriptorCursor<'a> {
    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let next = self.peek()?;
        self.offset += next.len_utf8();
        Some(next)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.offset += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, problem: impl std::fmt::Display) -> Error {
        let kind = if self.offset >= self.source.len() {
            ErrorKind::UnexpectedEof
        } else {
            ErrorKind::InvalidInput
        };
        let msg = format!("{} (at offset {} of '{}')", problem, self.offset, self.source);
        Error::new(kind, msg)
    }
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl BaseType {
    const fn descriptor_char(self) -> char {
        match self {
            BaseType::Boolean => 'Z',
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Short => 'S',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Float => 'F',
            BaseType::Double => 'D',
        }
    }

    fn from_descriptor_char(c: char) -> Option<BaseType> {
        let base_type = match c {
            'Z' => BaseType::Boolean,
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'S' => BaseType::Short,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'F' => BaseType::Float,
            'D' => BaseType::Double,
            _ => return None,
        };
        Some(base_type)
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Long | BaseType::Double => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(self.descriptor_char());
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(cursor: &mut DescriptorCursor) -> Result<Self> {
        match cursor.peek().and_then(BaseType::from_descriptor_char) {
            Some(base_type) => {
                cursor.bump();
                Ok(base_type)
            }
            None => Err(cursor.error("expected a primitive type")),
        }
    }
}

/// Classes appear in descriptors as `L<binary name>;`
impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(cursor: &mut DescriptorCursor) -> Result<Self> {
        if !cursor.eat('L') {
            return Err(cursor.error("expected 'L' to start a class type"));
        }
        let source = cursor.source;
        let rest = &source[cursor.offset..];
        let end = rest
            .find(';')
            .ok_or_else(|| cursor.error("class type is missing its ';'"))?;
        let name = BinaryName::from_string(rest[..end].to_owned())
            .map_err(|msg| cursor.error(msg))?;
        cursor.offset += end + 1;
        Ok(name)
    }
}

/// Reference type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Array whose innermost elements are `T`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Dimensions beyond the first (`T[]` has 0, `T[][][]` has 2)
    pub additional_dimensions: usize,

    /// Innermost element type (`T` for `T[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }

    fn render_brackets(&self, write_to: &mut String) {
        for _ in 0..self.dimensions() {
            write_to.push('[');
        }
    }
}

impl<C> RefType<C> {
    pub const fn object(class: C) -> RefType<C> {
        RefType::Object(class)
    }

    pub fn is_array(&self) -> bool {
        !matches!(self, RefType::Object(_))
    }

    /// Number of array dimensions (`0` for class types)
    pub fn dimensions(&self) -> usize {
        match self {
            RefType::Object(_) => 0,
            RefType::PrimitiveArray(arr) => arr.dimensions(),
            RefType::ObjectArray(arr) => arr.dimensions(),
        }
    }

    /// Array with elements of the given type
    pub fn array(element: FieldType<C>) -> RefType<C> {
        match element {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                ..arr
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                ..arr
            }),
        }
    }
}

impl<C: Clone> RefType<C> {
    /// Type of the elements of an array (`None` for class types)
    pub fn element_type(&self) -> Option<FieldType<C>> {
        let element = match self {
            RefType::Object(_) => return None,
            RefType::PrimitiveArray(arr) => match arr.additional_dimensions {
                0 => FieldType::Base(arr.element_type),
                n => FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: arr.element_type,
                })),
            },
            RefType::ObjectArray(arr) => match arr.additional_dimensions {
                0 => FieldType::object(arr.element_type.clone()),
                n => FieldType::Ref(RefType::ObjectArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: arr.element_type.clone(),
                })),
            },
        };
        Some(element)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(write_to),
            RefType::PrimitiveArray(arr) => {
                arr.render_brackets(write_to);
                arr.element_type.render_to(write_to);
            }
            RefType::ObjectArray(arr) => {
                arr.render_brackets(write_to);
                arr.element_type.render_to(write_to);
            }
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(cursor: &mut DescriptorCursor) -> Result<Self> {
        let mut dimensions = 0;
        while cursor.eat('[') {
            dimensions += 1;
        }
        if dimensions > 255 {
            return Err(cursor.error("arrays can have at most 255 dimensions"));
        }

        let ref_type = match (dimensions, cursor.peek()) {
            (0, Some('L')) => RefType::Object(C::parse_from(cursor)?),
            (0, _) => return Err(cursor.error("expected a class or array type")),
            (_, Some('L')) => RefType::ObjectArray(ArrayType {
                additional_dimensions: dimensions - 1,
                element_type: C::parse_from(cursor)?,
            }),
            (_, _) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: dimensions - 1,
                element_type: BaseType::parse_from(cursor)?,
            }),
        };
        Ok(ref_type)
    }
}

/// Type of a field, of a method parameter, or of a value returned from a method
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Ref(_))
    }

    pub fn array(element: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(element))
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn char() -> FieldType<C> {
        FieldType::Base(BaseType::Char)
    }

    pub const fn short() -> FieldType<C> {
        FieldType::Base(BaseType::Short)
    }

    pub const fn byte() -> FieldType<C> {
        FieldType::Base(BaseType::Byte)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(ref_type) => ref_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(cursor: &mut DescriptorCursor) -> Result<Self> {
        match cursor.peek() {
            Some('L' | '[') => RefType::parse_from(cursor).map(FieldType::Ref),
            _ => BaseType::parse_from(cursor).map(FieldType::Base),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Number of local variable slots the arguments take up on entry to the method
    ///
    /// The receiver of an instance method counts as an extra first argument.
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let receiver = usize::from(has_this_param);
        receiver + self.parameters.iter().map(Width::width).sum::<usize>()
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            Some(return_type) => return_type.render_to(write_to),
            None => write_to.push('V'),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(cursor: &mut DescriptorCursor) -> Result<Self> {
        if !cursor.eat('(') {
            return Err(cursor.error("expected '(' to start the parameters"));
        }
        let mut parameters = vec![];
        while !cursor.eat(')') {
            if cursor.peek().is_none() {
                return Err(cursor.error("parameters are missing their ')'"));
            }
            parameters.push(FieldType::parse_from(cursor)?);
        }
        let return_type = if cursor.eat('V') {
            None
        } else {
            Some(FieldType::parse_from(cursor)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}
