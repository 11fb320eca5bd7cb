use super::{
    BinaryName, ClassAccessFlags, ClassData, ClassGraph, ClassId, ClassStatus, FieldAccessFlags,
    FieldData, FieldType, MethodAccessFlags, MethodData, MethodDescriptor, UnqualifiedName,
};
use elsa::FrozenVec;
use std::cell::Cell;

/// Handles to the slice of the Java standard library that is always present in a class graph
///
/// Every class here is marked as verified. Code under verification can extend or call into these,
/// but any other library class it uses must be declared alongside it.
pub struct JavaLibrary<'g> {
    pub object: ClassId<'g>,
    pub cloneable: ClassId<'g>,
    pub serializable: ClassId<'g>,
    pub comparable: ClassId<'g>,
    pub char_sequence: ClassId<'g>,
    pub string: ClassId<'g>,
    pub class: ClassId<'g>,
    pub number: ClassId<'g>,
    pub integer: ClassId<'g>,
    pub method_type: ClassId<'g>,
    pub method_handle: ClassId<'g>,
    pub throwable: ClassId<'g>,
    pub error: ClassId<'g>,
    pub exception: ClassId<'g>,
    pub runtime_exception: ClassId<'g>,
    pub arithmetic_exception: ClassId<'g>,
    pub null_pointer_exception: ClassId<'g>,
}

const PUBLIC_CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    ClassAccessFlags::PUBLIC.bits() | ClassAccessFlags::SUPER.bits(),
);
const FINAL_CLASS: ClassAccessFlags =
    ClassAccessFlags::from_bits_truncate(PUBLIC_CLASS.bits() | ClassAccessFlags::FINAL.bits());
const ABSTRACT_CLASS: ClassAccessFlags =
    ClassAccessFlags::from_bits_truncate(PUBLIC_CLASS.bits() | ClassAccessFlags::ABSTRACT.bits());
const INTERFACE: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    ClassAccessFlags::PUBLIC.bits()
        | ClassAccessFlags::INTERFACE.bits()
        | ClassAccessFlags::ABSTRACT.bits(),
);

impl<'g> JavaLibrary<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaLibrary<'g> {
        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            access_flags: PUBLIC_CLASS,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            status: Cell::new(ClassStatus::Verified),
        });
        let declare = |name, superclass, flags, interfaces: &[ClassId<'g>]| {
            let class = class_graph.add_class(ClassData::new(name, superclass, flags));
            for interface in interfaces {
                class.interfaces.push(interface.0);
            }
            class
        };

        let cloneable = declare(BinaryName::CLONEABLE, object, INTERFACE, &[]);
        let serializable = declare(BinaryName::SERIALIZABLE, object, INTERFACE, &[]);
        let comparable = declare(BinaryName::COMPARABLE, object, INTERFACE, &[]);
        let char_sequence = declare(BinaryName::CHARSEQUENCE, object, INTERFACE, &[]);
        let string = declare(
            BinaryName::STRING,
            object,
            FINAL_CLASS,
            &[serializable, comparable, char_sequence],
        );
        let class = declare(BinaryName::CLASS, object, FINAL_CLASS, &[serializable]);
        let number = declare(BinaryName::NUMBER, object, ABSTRACT_CLASS, &[serializable]);
        let integer = declare(BinaryName::INTEGER, number, FINAL_CLASS, &[comparable]);
        let method_type = declare(BinaryName::METHODTYPE, object, FINAL_CLASS, &[]);
        let method_handle = declare(BinaryName::METHODHANDLE, object, ABSTRACT_CLASS, &[]);
        let throwable = declare(BinaryName::THROWABLE, object, PUBLIC_CLASS, &[serializable]);
        let error = declare(BinaryName::ERROR, throwable, PUBLIC_CLASS, &[]);
        let exception = declare(BinaryName::EXCEPTION, throwable, PUBLIC_CLASS, &[]);
        let runtime_exception =
            declare(BinaryName::RUNTIMEEXCEPTION, exception, PUBLIC_CLASS, &[]);
        let arithmetic_exception = declare(
            BinaryName::ARITHMETICEXCEPTION,
            runtime_exception,
            PUBLIC_CLASS,
            &[],
        );
        let null_pointer_exception = declare(
            BinaryName::NULLPOINTEREXCEPTION,
            runtime_exception,
            PUBLIC_CLASS,
            &[],
        );

        let library = JavaLibrary {
            object,
            cloneable,
            serializable,
            comparable,
            char_sequence,
            string,
            class,
            number,
            integer,
            method_type,
            method_handle,
            throwable,
            error,
            exception,
            runtime_exception,
            arithmetic_exception,
            null_pointer_exception,
        };
        library.add_members(class_graph);
        library
    }

    fn add_members(&self, class_graph: &ClassGraph<'g>) {
        use MethodAccessFlags as M;

        let method = |class: ClassId<'g>,
                      access_flags: MethodAccessFlags,
                      name: UnqualifiedName,
                      parameters: Vec<FieldType<BinaryName>>,
                      return_type: Option<FieldType<BinaryName>>| {
            class_graph.add_method(MethodData {
                class,
                name,
                access_flags,
                descriptor: MethodDescriptor {
                    parameters,
                    return_type,
                },
            });
        };
        let string = || Some(FieldType::object(BinaryName::STRING));
        let int = || Some(FieldType::int());

        for class in [
            self.object,
            self.throwable,
            self.error,
            self.exception,
            self.runtime_exception,
            self.arithmetic_exception,
            self.null_pointer_exception,
        ] {
            method(class, M::PUBLIC, UnqualifiedName::INIT, vec![], None);
        }

        let object = self.object;
        let object_type = FieldType::object(BinaryName::OBJECT);
        method(
            object,
            M::PUBLIC,
            UnqualifiedName::EQUALS,
            vec![object_type],
            Some(FieldType::boolean()),
        );
        method(object, M::PUBLIC | M::NATIVE, UnqualifiedName::HASHCODE, vec![], int());
        method(object, M::PUBLIC, UnqualifiedName::TOSTRING, vec![], string());
        method(
            object,
            M::PUBLIC | M::FINAL | M::NATIVE,
            UnqualifiedName::GETCLASS,
            vec![],
            Some(FieldType::object(BinaryName::CLASS)),
        );

        let abstract_method = M::PUBLIC | M::ABSTRACT;
        method(self.char_sequence, abstract_method, UnqualifiedName::LENGTH, vec![], int());
        method(self.throwable, M::PUBLIC, UnqualifiedName::GETMESSAGE, vec![], string());

        method(self.integer, M::PUBLIC, UnqualifiedName::INTVALUE, vec![], int());
        method(
            self.integer,
            M::PUBLIC | M::STATIC,
            UnqualifiedName::VALUEOF,
            vec![FieldType::int()],
            Some(FieldType::object(BinaryName::INTEGER)),
        );
        class_graph.add_field(FieldData {
            class: self.integer,
            name: UnqualifiedName::MAXVALUE,
            access_flags: FieldAccessFlags::PUBLIC
                | FieldAccessFlags::STATIC
                | FieldAccessFlags::FINAL,
            descriptor: FieldType::int(),
        });
    }
}
