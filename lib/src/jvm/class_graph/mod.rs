use super::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, RefType, RenderDescriptor, ResolutionError, UnqualifiedName,
};
use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod assignable;
mod java_library;

pub use assignable::*;
pub use java_library::*;

pub type ClassId<'g> = RefId<'g, ClassData<'g>>;
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the relationships between classes/interfaces and the members on those classes
///
/// This is the verifier's view of the world outside the method being checked: every class that
/// code refers to must be resolvable here, along with its super types, fields, and methods. The
/// graph only grows, so anything handed out from it lives as long as the arenas do.
///
/// Note: the graph uses frozen collections internally, so it is not `Sync`. Verifying on several
/// threads means building one graph per thread.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<&'g BinaryName, Box<ClassId<'g>>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    /// Find a class by name
    pub fn lookup_class(&self, name: &BinaryName) -> Option<ClassId<'g>> {
        self.classes.get(name).copied()
    }

    /// Find a class by name, failing if it is missing or known to be broken
    ///
    /// Classes whose verification is still pending resolve fine: it is up to the caller to decide
    /// whether that is good enough.
    pub fn resolve(&self, name: &BinaryName) -> Result<ClassId<'g>, ResolutionError> {
        let class = self
            .lookup_class(name)
            .ok_or_else(|| ResolutionError::MissingClass(name.clone()))?;
        if class.status.get() == ClassStatus::Rejected {
            return Err(ResolutionError::RejectedClass(name.clone()));
        }
        Ok(class)
    }

    /// Resolve all of the classes mentioned in a reference type
    pub fn resolve_ref_type(
        &self,
        ref_type: &RefType<BinaryName>,
    ) -> Result<RefType<ClassId<'g>>, ResolutionError> {
        Ok(match ref_type {
            RefType::Object(name) => RefType::Object(self.resolve(name)?),
            RefType::PrimitiveArray(arr) => RefType::PrimitiveArray(*arr),
            RefType::ObjectArray(arr) => RefType::ObjectArray(crate::jvm::ArrayType {
                additional_dimensions: arr.additional_dimensions,
                element_type: self.resolve(&arr.element_type)?,
            }),
        })
    }

    /// Add a new class to the class graph
    ///
    /// If a class by the same name is already present, the graph keeps pointing at the earlier
    /// one. Callers that care about duplicates should check with `lookup_class` first.
    pub fn add_class(&self, data: ClassData<'g>) -> ClassId<'g> {
        let data = &*self.arenas.class_arena.alloc(data);
        *self.classes.insert(&data.name, Box::new(RefId(data)))
    }

    /// Add a field to the class graph and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> FieldId<'g> {
        if let Some(f) = field
            .class
            .0
            .fields
            .iter()
            .find(|f| f.name == field.name && f.descriptor == field.descriptor)
        {
            RefId(f)
        } else {
            let data = &*self.arenas.field_arena.alloc(field);
            data.class.0.fields.push(data);
            RefId(data)
        }
    }

    /// Add a method to the class graph and to its class
    pub fn add_method(&self, method: MethodData<'g>) -> MethodId<'g> {
        if let Some(m) = method
            .class
            .0
            .methods
            .iter()
            .find(|m| m.name == method.name && m.descriptor == method.descriptor)
        {
            RefId(m)
        } else {
            let data = &*self.arenas.method_arena.alloc(method);
            data.class.0.methods.push(data);
            RefId(data)
        }
    }

    /// Field resolution, following [JVMS 5.4.3.2][0]
    ///
    /// Fields declared in the class itself take priority, then those in (transitive)
    /// superinterfaces, then those in the superclass chain.
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.2
    pub fn lookup_field(
        &self,
        class: ClassId<'g>,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Option<FieldId<'g>> {
        let mut next_class = Some(class);
        while let Some(class) = next_class {
            let declared = class
                .0
                .fields
                .iter()
                .find(|f| &f.name == name && &f.descriptor == descriptor);
            if let Some(field) = declared {
                return Some(RefId(field));
            }

            let mut interfaces: Vec<ClassId<'g>> = class.0.interfaces.iter().map(RefId).collect();
            let mut seen: HashSet<ClassId<'g>> = interfaces.iter().copied().collect();
            while let Some(interface) = interfaces.pop() {
                let declared = interface
                    .0
                    .fields
                    .iter()
                    .find(|f| &f.name == name && &f.descriptor == descriptor);
                if let Some(field) = declared {
                    return Some(RefId(field));
                }
                for super_interface in &interface.0.interfaces {
                    if seen.insert(RefId(super_interface)) {
                        interfaces.push(RefId(super_interface));
                    }
                }
            }

            next_class = class.superclass;
        }
        None
    }

    /// Method resolution, following [JVMS 5.4.3.3][0] and [JVMS 5.4.3.4][1]
    ///
    /// The class and its superclasses are searched before any superinterface. Of the methods found
    /// in superinterfaces, non-abstract ones are preferred.
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.3
    /// [1]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.4
    pub fn lookup_method(
        &self,
        class: ClassId<'g>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<MethodId<'g>> {
        let mut to_visit: Vec<ClassId<'g>> = vec![];
        let mut seen: HashSet<ClassId<'g>> = HashSet::new();

        let mut next_class = Some(class);
        while let Some(class) = next_class {
            let declared = class
                .0
                .methods
                .iter()
                .find(|m| &m.name == name && &m.descriptor == descriptor);
            if let Some(method) = declared {
                return Some(RefId(method));
            }
            for interface in &class.0.interfaces {
                if seen.insert(RefId(interface)) {
                    to_visit.push(RefId(interface));
                }
            }
            next_class = class.superclass;
        }

        // Interfaces also inherit the public methods of `java/lang/Object`
        if class.is_interface() {
            if let Some(object) = self.lookup_class(&BinaryName::OBJECT) {
                let declared = object
                    .0
                    .methods
                    .iter()
                    .find(|m| &m.name == name && &m.descriptor == descriptor);
                if let Some(method) = declared {
                    return Some(RefId(method));
                }
            }
        }

        let mut candidate: Option<MethodId<'g>> = None;
        while let Some(interface) = to_visit.pop() {
            let declared = interface
                .0
                .methods
                .iter()
                .find(|m| &m.name == name && &m.descriptor == descriptor);
            if let Some(method) = declared {
                if !method.access_flags.contains(MethodAccessFlags::ABSTRACT) {
                    return Some(RefId(method));
                }
                candidate.get_or_insert(RefId(method));
            }
            for super_interface in &interface.0.interfaces {
                if seen.insert(RefId(super_interface)) {
                    to_visit.push(RefId(super_interface));
                }
            }
        }
        candidate
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> JavaLibrary<'g> {
        JavaLibrary::add_to_graph(self)
    }
}

/// How far along verification of a class is
///
/// Code that refers to a class which is still `Pending` can't be fully verified yet, while code
/// that refers to a `Rejected` class is rejected along with it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ClassStatus {
    Verified,
    Pending,
    Rejected,
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<ClassId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Access flags
    pub access_flags: ClassAccessFlags,

    /// Methods
    pub methods: FrozenVec<&'g MethodData<'g>>,

    /// Fields
    pub fields: FrozenVec<&'g FieldData<'g>>,

    /// Verification status
    pub status: Cell<ClassStatus>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: ClassId<'g>,
        access_flags: ClassAccessFlags,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            access_flags,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            status: Cell::new(ClassStatus::Verified),
        }
    }

    /// Is this an interface?
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Is this object type throwable?
    pub fn is_throwable(&self) -> bool {
        let mut next_class = Some(self);
        while let Some(class) = next_class {
            if class.name == BinaryName::THROWABLE {
                return true;
            }
            next_class = class.superclass.map(|superclass| superclass.0);
        }

        false
    }

    /// Is this class the same as or a (transitive) subclass of the other class?
    ///
    /// Unlike assignability, this only follows superclass edges.
    pub fn is_subclass_of(&self, other: &ClassData<'g>) -> bool {
        let mut next_class = Some(self);
        while let Some(class) = next_class {
            if std::ptr::eq(class, other) {
                return true;
            }
            next_class = class.superclass.map(|superclass| superclass.0);
        }

        false
    }

    /// This class followed by all of its superclasses, ending with `java/lang/Object`
    pub fn superclass_chain(&self) -> Vec<&ClassData<'g>> {
        let mut chain = vec![];
        let mut next_class = Some(self);
        while let Some(class) = next_class {
            chain.push(class);
            next_class = class.superclass.map(|superclass| superclass.0);
        }
        chain
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> RenderDescriptor for ClassData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_ref())
    }
}

pub struct MethodData<'g> {
    /// Class
    pub class: ClassId<'g>,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Access flags
    pub access_flags: MethodAccessFlags,
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_ref(),
            self.name.as_ref(),
            self.descriptor.render(),
        ))
    }
}

impl<'g> MethodData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Is this an instance initialization method (aka. a constructor)?
    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    /// Methods that don't have code
    pub fn is_abstract_or_native(&self) -> bool {
        self.access_flags
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }
}

pub struct FieldData<'g> {
    /// Class
    pub class: ClassId<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<BinaryName>,

    /// Access flags
    pub access_flags: FieldAccessFlags,
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_ref(),
            self.name.as_ref(),
            self.descriptor.render(),
        ))
    }
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}
