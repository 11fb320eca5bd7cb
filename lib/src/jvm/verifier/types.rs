use super::VerifierError;
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::InsnIndex;
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use std::fmt;

/// Types tracked in the locals and on the stack during verification
///
/// These are the JVM's [verification types][0], except that:
///
///   - there is no separate `boolean`/`byte`/`char`/`short` (they all collapse into `Integer` as
///     soon as they land in a frame)
///   - `long` and `double` are a single element, with their second slot represented by `Unknown`
///     in the local variables (and not represented at all on the stack)
///   - return addresses remember the instruction they return to
///   - uninitialized objects remember the allocation site that produced them
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    /// Top of the lattice: nothing is known about the slot (or it is the upper half of a `long` or
    /// `double`)
    Unknown,

    Integer,
    Float,
    Long,
    Double,

    /// Bottom of the reference types
    Null,

    /// Initialized class, interface, or array type
    Object(RefType<BinaryName>),

    /// Object whose constructor hasn't run yet
    Uninitialized(UninitializedType),

    /// Pushed by `jsr`, consumed by `ret`
    ReturnAddress(InsnIndex),
}

/// An object which has been allocated but not yet initialized
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UninitializedType {
    /// Class the object will have once its constructor returns
    pub class: BinaryName,

    /// Where the object came from
    pub site: NewSite,
}

/// Allocation site of an uninitialized object
///
/// Two uninitialized values are the same object exactly when their class and site match, which is
/// what `<init>` relies on when it replaces every occurrence of the object it initialized.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum NewSite {
    /// Receiver of a constructor, before the superclass (or other same-class) constructor ran
    This,

    /// Result of the `new` instruction at this index
    New(InsnIndex),
}

impl UninitializedType {
    /// Type of the object once it is initialized
    pub fn initialized(&self) -> VerificationType {
        VerificationType::Object(RefType::Object(self.class.clone()))
    }
}

impl VerificationType {
    /// Shorthand for an initialized object of a class type
    pub fn object(class: BinaryName) -> VerificationType {
        VerificationType::Object(RefType::Object(class))
    }

    /// Is this type a reference (initialized or not)?
    ///
    /// Note that return addresses are _not_ references.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::Object(_)
                | VerificationType::Uninitialized(_)
        )
    }

    /// Is this an initialized reference type, or `null`?
    pub fn is_initialized_reference(&self) -> bool {
        matches!(self, VerificationType::Null | VerificationType::Object(_))
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, VerificationType::Uninitialized(_))
    }

    /// Does this type occupy two slots?
    pub fn is_category2(&self) -> bool {
        self.width() == 2
    }

    /// Type of the value returned by a method with this return type
    pub fn from_return_type(return_type: &Option<FieldType<BinaryName>>) -> Option<Self> {
        return_type.as_ref().map(|ty| VerificationType::from(ty.clone()))
    }
}

/// Merge the type from an incoming frame into the type already in a slot
///
/// Returns `None` if the types have nothing in common. Locals and the stack react to that
/// differently (locals forget what was in the slot, stacks reject the code).
pub(super) fn merge_types(
    class_graph: &ClassGraph,
    existing: &VerificationType,
    incoming: &VerificationType,
    location: &str,
) -> Result<Option<VerificationType>, VerifierError> {
    if existing == incoming {
        return Ok(Some(existing.clone()));
    }

    match (existing, incoming) {
        // Covers both "initialized meets uninitialized" and two different uninitialized objects
        (_, VerificationType::Uninitialized(_)) => Err(VerifierError::violation(format!(
            "Backwards branch with an uninitialized object {} detected.",
            location
        ))),

        // We just didn't know the object was initialized, now we do
        (VerificationType::Uninitialized(uninit), incoming) => {
            merge_types(class_graph, &uninit.initialized(), incoming, location)
        }

        (VerificationType::Null, other) | (other, VerificationType::Null)
            if other.is_initialized_reference() =>
        {
            Ok(Some(other.clone()))
        }

        (VerificationType::Object(type1), VerificationType::Object(type2)) => {
            let common = class_graph.first_common_superclass(type1, type2)?;
            Ok(Some(VerificationType::Object(common)))
        }

        _ => Ok(None),
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

impl From<FieldType<BinaryName>> for VerificationType {
    fn from(field_type: FieldType<BinaryName>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl From<RefType<BinaryName>> for VerificationType {
    fn from(ref_type: RefType<BinaryName>) -> Self {
        VerificationType::Object(ref_type)
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationType::Unknown => f.write_str("unknown"),
            VerificationType::Integer => f.write_str("int"),
            VerificationType::Float => f.write_str("float"),
            VerificationType::Long => f.write_str("long"),
            VerificationType::Double => f.write_str("double"),
            VerificationType::Null => f.write_str("null"),
            VerificationType::Object(ref_type) => f.write_str(&ref_type.render()),
            VerificationType::Uninitialized(uninit) => write!(f, "{}", uninit),
            VerificationType::ReturnAddress(target) => write!(f, "returnAddress({})", target),
        }
    }
}

impl fmt::Display for UninitializedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.site {
            NewSite::This => write!(f, "uninitialized(this {})", self.class),
            NewSite::New(site) => write!(f, "uninitialized({} from {})", self.class, site),
        }
    }
}
