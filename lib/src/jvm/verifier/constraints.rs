use super::{Frame, NewSite, VerificationType, VerifierError};
use crate::jvm::class_graph::{ClassGraph, ClassId, ClassStatus, FieldId, MethodId};
use crate::jvm::code::{ConstantData, FieldRef, Instruction, InvokeType, MethodRef};
use crate::jvm::{BinaryName, FieldType, RefType, RenderDescriptor, UnqualifiedName};
use crate::util::{RefId, Width};

/// What the checks know about the method whose code is being verified
pub struct Environment<'a, 'g> {
    pub class_graph: &'a ClassGraph<'g>,
    pub method: MethodId<'g>,
}

impl<'a, 'g> Environment<'a, 'g> {
    pub fn current_class(&self) -> ClassId<'g> {
        self.method.class
    }

    /// Declared return type (`None` for `void`)
    pub fn return_type(&self) -> Option<&FieldType<BinaryName>> {
        self.method.descriptor.return_type.as_ref()
    }

    /// Assignability for verification purposes
    ///
    /// Interfaces are treated like `java/lang/Object`: any class type may be assigned to them.
    /// Merging already collapses interface types to `java/lang/Object`, so anything stricter
    /// would reject valid code.
    pub fn is_assignable(
        &self,
        sub_type: &RefType<BinaryName>,
        super_type: &RefType<BinaryName>,
    ) -> Result<bool, VerifierError> {
        if let (RefType::Object(_), RefType::Object(super_class)) = (sub_type, super_type) {
            if self.class_graph.resolve(super_class)?.is_interface() {
                return Ok(true);
            }
        }
        Ok(self.class_graph.is_assignable(sub_type, super_type)?)
    }
}

/// Check that an instruction can run in a frame
///
/// Generic checks shared by whole families of instructions come first (stack slots, local
/// variable access, referenced classes, return types), then the rules specific to the
/// instruction. The first broken rule is reported.
pub fn check(
    insn: &Instruction,
    frame: &Frame,
    env: &Environment,
) -> Result<(), VerifierError> {
    let checker = Checker { insn, frame, env };
    checker.check_stack_slots()?;
    checker.check_local_access()?;
    checker.check_referenced_classes()?;
    checker.check_return()?;
    checker.check_instruction()
}

struct Checker<'a, 'b, 'g> {
    insn: &'a Instruction,
    frame: &'a Frame,
    env: &'a Environment<'b, 'g>,
}

fn violation<T>(message: impl Into<String>) -> Result<T, VerifierError> {
    Err(VerifierError::violation(message))
}

/// How the values near the top of the stack are referred to in messages
fn stack_position(depth: usize) -> &'static str {
    match depth {
        0 => "stack top",
        1 => "stack next-to-top",
        2 => "stack next-to-next-to-top",
        _ => "stack",
    }
}

impl<'a, 'b, 'g> Checker<'a, 'b, 'g> {
    fn peek(&self, depth: usize) -> Result<&'a VerificationType, VerifierError> {
        self.frame.stack.peek(depth).map_err(|_| {
            VerifierError::violation(format!(
                "Cannot look at value {} from the top of a stack with only {} values.",
                depth,
                self.frame.stack.size()
            ))
        })
    }

    /// The value at some depth must have exactly this type
    fn expect(&self, depth: usize, expected: VerificationType) -> Result<(), VerifierError> {
        let actual = self.peek(depth)?;
        if *actual != expected {
            return violation(format!(
                "The value at the {} is not of type '{}', but of type '{}'.",
                stack_position(depth),
                expected,
                actual
            ));
        }
        Ok(())
    }

    fn index_of_int(&self, depth: usize) -> Result<(), VerifierError> {
        let index = self.peek(depth)?;
        if *index != VerificationType::Integer {
            return violation(format!(
                "The 'index' is not of type int but of type {}.",
                index
            ));
        }
        Ok(())
    }

    fn reference_is_initialized(&self, typ: &VerificationType) -> Result<(), VerifierError> {
        if let VerificationType::Uninitialized(_) = typ {
            return violation(format!("Working on an uninitialized object '{}'.", typ));
        }
        Ok(())
    }

    /// The value at some depth must be an array reference (or `null`)
    ///
    /// Returns the element type of the array, unless the value is `null`.
    fn array_element(&self, depth: usize) -> Result<Option<FieldType<BinaryName>>, VerifierError> {
        let arrayref = self.peek(depth)?;
        match arrayref {
            VerificationType::Null => Ok(None),
            VerificationType::Object(ref_type) if ref_type.is_array() => {
                Ok(ref_type.element_type())
            }
            _ => violation(format!(
                "The 'arrayref' does not refer to an array but is of type {}.",
                arrayref
            )),
        }
    }

    /// The value at some depth must be an array whose elements are accepted by `accepts`
    fn array_of(
        &self,
        depth: usize,
        description: &str,
        accepts: impl FnOnce(&FieldType<BinaryName>) -> bool,
    ) -> Result<(), VerifierError> {
        if let Some(element_type) = self.array_element(depth)? {
            if !accepts(&element_type) {
                return violation(format!(
                    "The 'arrayref' does not refer to an array with elements of {} but to an \
                    array of {}.",
                    description,
                    VerificationType::from(element_type)
                ));
            }
        }
        Ok(())
    }

    /// Resolve a class an instruction refers to
    ///
    /// The class must also have passed verification, unless it is the class being verified.
    fn require_class(&self, name: &BinaryName) -> Result<ClassId<'g>, VerifierError> {
        let class = self.env.class_graph.resolve(name)?;
        if class.status.get() == ClassStatus::Pending && class != self.env.current_class() {
            return Err(VerifierError::NotYet(name.clone()));
        }
        Ok(class)
    }

    fn check_stack_slots(&self) -> Result<(), VerifierError> {
        let stack = &self.frame.stack;
        let consume = self.insn.consume_stack();
        if consume > stack.slots_used() {
            return violation(format!(
                "Cannot consume {} stack slots: only {} slot(s) left on stack!\nStack:\n{}",
                consume,
                stack.slots_used(),
                stack
            ));
        }

        let produce = self.insn.produce_stack();
        if stack.slots_used() - consume + produce > stack.max_stack() {
            return violation(format!(
                "Cannot produce {} stack slots: only {} free stack slot(s) left.\nStack:\n{}",
                produce as isize - consume as isize,
                stack.max_stack() - stack.slots_used(),
                stack
            ));
        }
        Ok(())
    }

    fn check_local_access(&self) -> Result<(), VerifierError> {
        use Instruction::*;

        let (local, width) = match self.insn.local_variable() {
            Some(access) => access,
            None => return Ok(()),
        };
        let local = local as usize;
        if local + width > self.frame.locals.max_locals() {
            return violation("The 'index' is not a valid index into the local variable array.");
        }

        let loaded = match self.insn {
            ILoad(_) => Some(VerificationType::Integer),
            LLoad(_) => Some(VerificationType::Long),
            FLoad(_) => Some(VerificationType::Float),
            DLoad(_) => Some(VerificationType::Double),
            ALoad(_) => None,
            IStore(_) | LStore(_) | FStore(_) | DStore(_) | AStore(_) => {
                return self.check_store();
            }
            _ => return Ok(()),
        };

        let typ = self.frame.locals.get(local)?;
        if *typ == VerificationType::Unknown {
            return violation(format!(
                "Read-Access on local variable {} with unknown content.",
                local
            ));
        }
        if width == 2 && *self.frame.locals.get(local + 1)? != VerificationType::Unknown {
            return violation(format!(
                "Reading a two-locals value from local variables {} and {} where the latter one \
                is destroyed.",
                local,
                local + 1
            ));
        }
        match loaded {
            Some(expected) if *typ != expected => violation(format!(
                "Local Variable type and LOADing Instruction type mismatch: Local Variable: '{}'; \
                Instruction type: '{}'.",
                typ, expected
            )),
            None if !typ.is_reference() => violation(format!(
                "Local Variable type and LOADing Instruction type mismatch: Local Variable: '{}'; \
                Instruction expects a reference type.",
                typ
            )),
            _ => Ok(()),
        }
    }

    fn check_store(&self) -> Result<(), VerifierError> {
        use Instruction::*;

        let stored = match self.insn {
            IStore(_) => VerificationType::Integer,
            LStore(_) => VerificationType::Long,
            FStore(_) => VerificationType::Float,
            DStore(_) => VerificationType::Double,
            _ => {
                let top = self.peek(0)?;
                if !top.is_reference() && !matches!(top, VerificationType::ReturnAddress(_)) {
                    return violation(format!(
                        "Stack top type and STOREing Instruction type mismatch: Stack top: '{}'; \
                        Instruction expects a reference type or a return address.",
                        top
                    ));
                }
                return Ok(());
            }
        };
        let top = self.peek(0)?;
        if *top != stored {
            return violation(format!(
                "Stack top type and STOREing Instruction type mismatch: Stack top: '{}'; \
                Instruction type: '{}'.",
                top, stored
            ));
        }
        Ok(())
    }

    /// Classes named by the instruction must be loadable and verified
    fn check_referenced_classes(&self) -> Result<(), VerifierError> {
        use Instruction::*;

        let referenced: Option<&BinaryName> = match self.insn {
            New(class) => Some(class),
            ANewArray(ref_type)
            | CheckCast(ref_type)
            | InstanceOf(ref_type)
            | MultiANewArray(ref_type, _) => match ref_type {
                RefType::Object(class) => Some(class),
                RefType::ObjectArray(arr) => Some(&arr.element_type),
                RefType::PrimitiveArray(_) => None,
            },
            GetStatic(field) | PutStatic(field) | GetField(field) | PutField(field) => {
                Some(&field.class)
            }
            Invoke(_, method) => Some(&method.class),
            _ => None,
        };
        if let Some(class) = referenced {
            self.require_class(class)?;
        }
        Ok(())
    }

    /// Return instructions must match the declared return type of the method
    fn check_return(&self) -> Result<(), VerifierError> {
        use Instruction::*;

        let returned = match self.insn {
            Return => None,
            IReturn => Some(VerificationType::Integer),
            LReturn => Some(VerificationType::Long),
            FReturn => Some(VerificationType::Float),
            DReturn => Some(VerificationType::Double),
            AReturn => Some(VerificationType::Null),
            _ => return Ok(()),
        };
        let declared = self.env.return_type();

        let (returned, declared) = match (returned, declared) {
            (None, None) => return self.check_constructor_exit(),
            (None, Some(declared)) => {
                return violation(format!(
                    "RETURN instruction in non-void method with return type '{}'.",
                    declared.render()
                ))
            }
            (Some(_), None) => {
                return violation(format!(
                    "{} instruction in a method whose return type is void.",
                    self.insn.mnemonic().to_uppercase()
                ))
            }
            (Some(returned), Some(declared)) => (returned, declared),
        };

        let expected = VerificationType::from(declared.clone());
        let top = self.peek(0)?;
        if returned == VerificationType::Null {
            if !expected.is_reference() {
                return violation(format!(
                    "ARETURN instruction in method with return type '{}', which is not a \
                    reference type.",
                    declared.render()
                ));
            }
            if !top.is_reference() {
                return violation(format!(
                    "Reference type expected on top of stack, but is: '{}'.",
                    top
                ));
            }
            self.reference_is_initialized(top)?;
        } else if returned != expected || *top != expected {
            return violation(format!(
                "Current method has return type of '{}' expecting a '{}' on top of the stack. \
                But stack top is a '{}'.",
                declared.render(),
                expected,
                top
            ));
        }
        Ok(())
    }

    fn check_constructor_exit(&self) -> Result<(), VerifierError> {
        let method = self.env.method;
        if method.is_constructor()
            && self.frame.uninitialized_this.is_some()
            && method.class.name != BinaryName::OBJECT
        {
            return violation("Leaving a constructor that itself did not call a constructor.");
        }
        Ok(())
    }

    fn check_instruction(&self) -> Result<(), VerifierError> {
        use Instruction::*;
        use VerificationType::{Double, Float, Integer, Long};

        match self.insn {
            Nop | AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4
            | IConst5 | LConst0 | LConst1 | FConst0 | FConst1 | FConst2 | DConst0 | DConst1
            | BiPush(_) | SiPush(_) => (),

            Ldc(constant) if constant.is_wide() => {
                return violation(format!(
                    "Referenced constant should be an int, a float, a string, a class, a method \
                    type or a method handle, but is '{}'.",
                    constant
                ))
            }
            Ldc2(constant) if !constant.is_wide() => {
                return violation(format!(
                    "Referenced constant should be a long or a double, but is '{}'.",
                    constant
                ))
            }
            Ldc(ConstantData::Class(ref_type)) => self.check_class_constant(ref_type)?,
            Ldc(_) | Ldc2(_) => (),

            // Already covered by the local variable checks
            ILoad(_) | LLoad(_) | FLoad(_) | DLoad(_) | ALoad(_) => (),
            IStore(_) | LStore(_) | FStore(_) | DStore(_) | AStore(_) => (),

            IALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type int", |elem| *elem == FieldType::int())?;
            }
            LALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type long", |elem| *elem == FieldType::long())?;
            }
            FALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type float", |elem| *elem == FieldType::float())?;
            }
            DALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type double", |elem| *elem == FieldType::double())?;
            }
            AALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "a reference type", FieldType::is_reference)?;
            }
            BALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type byte or boolean", |elem| {
                    *elem == FieldType::byte() || *elem == FieldType::boolean()
                })?;
            }
            CALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type char", |elem| *elem == FieldType::char())?;
            }
            SALoad => {
                self.index_of_int(0)?;
                self.array_of(1, "type short", |elem| *elem == FieldType::short())?;
            }

            IAStore => {
                self.value_of_int()?;
                self.index_of_int(1)?;
                self.array_of(2, "type int", |elem| *elem == FieldType::int())?;
            }
            LAStore => {
                self.expect(0, Long)?;
                self.index_of_int(1)?;
                self.array_of(2, "type long", |elem| *elem == FieldType::long())?;
            }
            FAStore => {
                self.expect(0, Float)?;
                self.index_of_int(1)?;
                self.array_of(2, "type float", |elem| *elem == FieldType::float())?;
            }
            DAStore => {
                self.expect(0, Double)?;
                self.index_of_int(1)?;
                self.array_of(2, "type double", |elem| *elem == FieldType::double())?;
            }
            AAStore => {
                // Whether the value fits in the array is only checked at run time
                let value = self.peek(0)?;
                if !value.is_reference() {
                    return violation(format!(
                        "The 'value' is not of a reference type but of type {}.",
                        value
                    ));
                }
                self.index_of_int(1)?;
                self.array_of(2, "a reference type", FieldType::is_reference)?;
            }
            BAStore => {
                self.value_of_int()?;
                self.index_of_int(1)?;
                self.array_of(2, "type byte or boolean", |elem| {
                    *elem == FieldType::byte() || *elem == FieldType::boolean()
                })?;
            }
            CAStore => {
                self.value_of_int()?;
                self.index_of_int(1)?;
                self.array_of(2, "type char", |elem| *elem == FieldType::char())?;
            }
            SAStore => {
                self.value_of_int()?;
                self.index_of_int(1)?;
                self.array_of(2, "type short", |elem| *elem == FieldType::short())?;
            }

            Pop => {
                let top = self.peek(0)?;
                if top.is_category2() {
                    return violation(format!(
                        "Stack top size should be 1 but stack top is '{}' of size '{}'.",
                        top,
                        top.width()
                    ));
                }
            }
            Pop2 => {
                if !self.peek(0)?.is_category2() {
                    self.size_1_below(1, "If the stack top is of size 1")?;
                }
            }
            Dup => {
                let top = self.peek(0)?;
                if top.is_category2() {
                    return violation(format!(
                        "Won't DUP type on stack top '{}' because it must occupy exactly one \
                        slot, not '{}'.",
                        top,
                        top.width()
                    ));
                }
            }
            DupX1 => {
                self.size_1_below(0, "For dup_x1")?;
                self.size_1_below(1, "For dup_x1")?;
            }
            DupX2 => {
                self.size_1_below(0, "For dup_x2")?;
                if !self.peek(1)?.is_category2() {
                    self.size_1_below(
                        2,
                        "If stack top's size is 1 and stack next-to-top's size is 1",
                    )?;
                }
            }
            Dup2 => {
                if !self.peek(0)?.is_category2() {
                    self.size_1_below(1, "If stack top's size is 1")?;
                }
            }
            Dup2X1 => {
                if self.peek(0)?.is_category2() {
                    self.size_1_below(1, "If stack top's size is 2")?;
                } else {
                    self.size_1_below(1, "If stack top's size is 1")?;
                    self.size_1_below(2, "If stack top's size is 1")?;
                }
            }
            Dup2X2 => {
                let top = self.peek(0)?.is_category2();
                let next = self.peek(1)?.is_category2();
                let fits = match (top, next) {
                    (true, true) => true,
                    (true, false) => !self.peek(2)?.is_category2(),
                    (false, false) => {
                        self.peek(2)?.is_category2() || !self.peek(3)?.is_category2()
                    }
                    (false, true) => false,
                };
                if !fits {
                    return violation(
                        "The operand sizes on the stack do not match any of the four forms of \
                        usage of this instruction.",
                    );
                }
            }
            Swap => {
                self.size_1_below(0, "For swap")?;
                self.size_1_below(1, "For swap")?;
            }

            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
                self.expect(0, Integer)?;
                self.expect(1, Integer)?;
            }
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
                self.expect(0, Long)?;
                self.expect(1, Long)?;
            }
            LSh(_) => {
                self.expect(0, Integer)?;
                self.expect(1, Long)?;
            }
            FAdd | FSub | FMul | FDiv | FRem => {
                self.expect(0, Float)?;
                self.expect(1, Float)?;
            }
            DAdd | DSub | DMul | DDiv | DRem => {
                self.expect(0, Double)?;
                self.expect(1, Double)?;
            }
            INeg | I2L | I2F | I2D | I2B | I2C | I2S => self.expect(0, Integer)?,
            LNeg | L2I | L2F | L2D => self.expect(0, Long)?,
            FNeg | F2I | F2L | F2D => self.expect(0, Float)?,
            DNeg | D2I | D2L | D2F => self.expect(0, Double)?,
            IInc(local, _) => {
                let typ = self.frame.locals.get(*local as usize)?;
                if *typ != Integer {
                    return violation(format!(
                        "Local variable {} is not of type int but of type {}, so it can't be \
                        incremented.",
                        local, typ
                    ));
                }
            }

            LCmp => {
                self.expect(0, Long)?;
                self.expect(1, Long)?;
            }
            FCmp(_) => {
                self.expect(0, Float)?;
                self.expect(1, Float)?;
            }
            DCmp(_) => {
                self.expect(0, Double)?;
                self.expect(1, Double)?;
            }

            If(_, _) | TableSwitch { .. } | LookupSwitch { .. } => self.expect(0, Integer)?,
            IfICmp(_, _) => {
                self.expect(0, Integer)?;
                self.expect(1, Integer)?;
            }
            IfACmp(_, _) => {
                self.reference_at(0)?;
                self.reference_at(1)?;
            }
            IfNull(_, _) => {
                let top = self.reference_at(0)?;
                self.reference_is_initialized(top)?;
            }
            Goto(_) | Jsr(_) => (),
            Ret(local) => {
                let typ = self.frame.locals.get(*local as usize)?;
                if !matches!(typ, VerificationType::ReturnAddress(_)) {
                    return violation(format!(
                        "Expecting a return address in local variable {}, but found '{}'.",
                        local, typ
                    ));
                }
            }

            // Covered by the return checks
            IReturn | LReturn | FReturn | DReturn | AReturn | Return => (),

            GetStatic(field_ref) => {
                let field = self.resolve_field(field_ref)?;
                if !field.is_static() {
                    return violation(format!(
                        "Referenced field '{}' is not static which it should be.",
                        field_ref
                    ));
                }
            }
            PutStatic(field_ref) => {
                let field = self.resolve_field(field_ref)?;
                if !field.is_static() {
                    return violation(format!(
                        "Referenced field '{}' is not static which it should be.",
                        field_ref
                    ));
                }
                self.check_stored_value(&field.descriptor)?;
            }
            GetField(field_ref) => {
                let field = self.resolve_field(field_ref)?;
                if field.is_static() {
                    return violation(format!(
                        "Referenced field '{}' is static which it shouldn't be.",
                        field_ref
                    ));
                }
                self.check_field_objectref(0, field_ref, field, false)?;
            }
            PutField(field_ref) => {
                let field = self.resolve_field(field_ref)?;
                if field.is_static() {
                    return violation(format!(
                        "Referenced field '{}' is static which it shouldn't be.",
                        field_ref
                    ));
                }
                self.check_stored_value(&field.descriptor)?;
                self.check_field_objectref(1, field_ref, field, true)?;
            }

            Invoke(invoke_type, method_ref) => self.check_invoke(*invoke_type, method_ref)?,
            InvokeDynamic(indy) => {
                if indy.name.is_initializer() {
                    return violation(format!(
                        "invokedynamic must not refer to the special method '{}'.",
                        indy.name
                    ));
                }
                self.check_arguments(&indy.descriptor.parameters)?;
            }

            New(class_name) => {
                let class = self.require_class(class_name)?;
                if class.is_interface() {
                    return violation(format!(
                        "Expecting a class type to work on, but '{}' is an interface.",
                        class_name
                    ));
                }
            }
            NewArray(_) => self.count_of_int()?,
            ANewArray(ref_type) => {
                self.count_of_int()?;
                if ref_type.dimensions() + 1 > 255 {
                    return violation(
                        "Not allowed to create an array with more than 255 dimensions.",
                    );
                }
            }
            ArrayLength => {
                self.array_element(0)?;
            }
            AThrow => self.check_athrow()?,
            CheckCast(_) | InstanceOf(_) => {
                let objectref = self.peek(0)?;
                if !objectref.is_reference() {
                    return violation(format!(
                        "The 'objectref' is not of a reference type but of type {}.",
                        objectref
                    ));
                }
            }
            MonitorEnter | MonitorExit => {
                let top = self.peek(0)?;
                if !top.is_reference() {
                    return violation(format!(
                        "The stack top should be of a reference type, but is '{}'.",
                        top
                    ));
                }
            }
            MultiANewArray(ref_type, dimensions) => {
                let dimensions = *dimensions as usize;
                if dimensions == 0 {
                    return violation("Number of dimensions to create must be greater than zero.");
                }
                if ref_type.dimensions() < dimensions {
                    return violation(format!(
                        "Not allowed to create array with more dimensions ('{}') than the one \
                        referenced by the class operand '{}'.",
                        dimensions,
                        ref_type.render()
                    ));
                }
                for depth in 0..dimensions {
                    if *self.peek(depth)? != Integer {
                        return violation(format!(
                            "The '{}' upper stack types should be 'int' but aren't.",
                            dimensions
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn value_of_int(&self) -> Result<(), VerifierError> {
        let value = self.peek(0)?;
        if *value != VerificationType::Integer {
            return violation(format!(
                "The 'value' is not of type int but of type {}.",
                value
            ));
        }
        Ok(())
    }

    fn count_of_int(&self) -> Result<(), VerifierError> {
        let count = self.peek(0)?;
        if *count != VerificationType::Integer {
            return violation(format!(
                "The 'count' at the stack top is not of type 'int' but of type '{}'.",
                count
            ));
        }
        Ok(())
    }

    /// Stack value at some depth must take up a single slot
    fn size_1_below(&self, depth: usize, context: &str) -> Result<(), VerifierError> {
        let value = self.peek(depth)?;
        if value.is_category2() {
            return violation(format!(
                "{}, the value at the {} must be of size 1, but it is '{}' of size {}.",
                context,
                stack_position(depth),
                value,
                value.width()
            ));
        }
        Ok(())
    }

    fn reference_at(&self, depth: usize) -> Result<&'a VerificationType, VerifierError> {
        let value = self.peek(depth)?;
        if !value.is_reference() {
            return violation(format!(
                "The value at the {} is not of a reference type, but of type '{}'.",
                stack_position(depth),
                value
            ));
        }
        Ok(value)
    }

    /// `ldc` of a class constant still needs the class (or array element class) to exist
    fn check_class_constant(&self, ref_type: &RefType<BinaryName>) -> Result<(), VerifierError> {
        self.env.class_graph.resolve_ref_type(ref_type)?;
        Ok(())
    }

    fn resolve_field(&self, field_ref: &FieldRef) -> Result<FieldId<'g>, VerifierError> {
        let class = self.require_class(&field_ref.class)?;
        match self
            .env
            .class_graph
            .lookup_field(class, &field_ref.name, &field_ref.descriptor)
        {
            Some(field) => Ok(field),
            None => violation(format!("Field '{}' not found.", field_ref)),
        }
    }

    /// Value on the top of the stack must be storable in a field of the given type
    fn check_stored_value(&self, field_type: &FieldType<BinaryName>) -> Result<(), VerifierError> {
        let value = self.peek(0)?;
        let expected = VerificationType::from(field_type.clone());
        match (&expected, value) {
            (VerificationType::Object(target), value) => match value {
                VerificationType::Null => Ok(()),
                VerificationType::Uninitialized(_) => self.reference_is_initialized(value),
                VerificationType::Object(value_type) => {
                    if !self.env.is_assignable(value_type, target)? {
                        return violation(format!(
                            "The stack top type '{}' is not assignment compatible with '{}'.",
                            value, expected
                        ));
                    }
                    Ok(())
                }
                _ => violation(format!(
                    "The stack top type '{}' is not of a reference type as expected.",
                    value
                )),
            },
            (expected, value) if expected != value => violation(format!(
                "The stack top type '{}' is not of type '{}' as expected.",
                value, expected
            )),
            _ => Ok(()),
        }
    }

    /// Object whose field is being accessed must be an instance of the field's class
    ///
    /// Constructors may store into the fields of their own class before the receiver is
    /// initialized.
    fn check_field_objectref(
        &self,
        depth: usize,
        field_ref: &FieldRef,
        field: FieldId<'g>,
        is_store: bool,
    ) -> Result<(), VerifierError> {
        let objectref = self.peek(depth)?;
        match objectref {
            VerificationType::Null => Ok(()),
            VerificationType::Uninitialized(uninit)
                if is_store
                    && uninit.site == NewSite::This
                    && field.class == self.env.current_class() =>
            {
                Ok(())
            }
            VerificationType::Uninitialized(_) => self.reference_is_initialized(objectref),
            VerificationType::Object(ref_type @ RefType::Object(_)) => {
                let owner = RefType::Object(field_ref.class.clone());
                if !self.env.is_assignable(ref_type, &owner)? {
                    return violation(format!(
                        "The 'objectref' of type '{}' is not an instance of '{}', the class the \
                        field is accessed through.",
                        objectref, field_ref.class
                    ));
                }
                Ok(())
            }
            _ => violation(format!(
                "The value at the {} should be an object reference that's not an array \
                reference, but is '{}'.",
                stack_position(depth),
                objectref
            )),
        }
    }

    fn resolve_method(
        &self,
        invoke_type: InvokeType,
        method_ref: &MethodRef,
    ) -> Result<MethodId<'g>, VerifierError> {
        let class = self.require_class(&method_ref.class)?;
        match invoke_type {
            InvokeType::Interface(_) if !class.is_interface() => {
                return violation(format!(
                    "Referenced class '{}' is not an interface, but invokeinterface was used.",
                    method_ref.class
                ))
            }
            InvokeType::Virtual if class.is_interface() => {
                return violation(format!(
                    "Referenced class '{}' is an interface, but invokevirtual was used.",
                    method_ref.class
                ))
            }
            _ => (),
        }

        // Constructors are not inherited
        let found = if method_ref.name == UnqualifiedName::INIT {
            class
                .0
                .methods
                .iter()
                .find(|m| m.name == method_ref.name && m.descriptor == method_ref.descriptor)
                .map(RefId)
        } else {
            self.env
                .class_graph
                .lookup_method(class, &method_ref.name, &method_ref.descriptor)
        };
        match found {
            Some(method) => Ok(method),
            None => violation(format!("Method '{}' not found.", method_ref)),
        }
    }

    fn check_invoke(
        &self,
        invoke_type: InvokeType,
        method_ref: &MethodRef,
    ) -> Result<(), VerifierError> {
        let is_init = method_ref.name == UnqualifiedName::INIT;
        if method_ref.name == UnqualifiedName::CLINIT {
            return violation("Class initialization methods must not be invoked explicitly.");
        }
        if is_init && invoke_type != InvokeType::Special {
            return violation("Only invokespecial may call an instance initialization method.");
        }
        if is_init && method_ref.descriptor.return_type.is_some() {
            return violation("Instance initialization methods must have a void return type.");
        }

        let method = self.resolve_method(invoke_type, method_ref)?;
        let mnemonic = self.insn.mnemonic();
        if invoke_type == InvokeType::Static && !method.is_static() {
            return violation(format!(
                "Referenced method '{}' is not static, but invokestatic was used.",
                method_ref
            ));
        }
        if invoke_type != InvokeType::Static && method.is_static() {
            return violation(format!(
                "Referenced method '{}' is static, but {} was used.",
                method_ref, mnemonic
            ));
        }

        self.check_arguments(&method_ref.descriptor.parameters)?;

        if let InvokeType::Interface(count) = invoke_type {
            let expected_count = method_ref.descriptor.parameter_length(true);
            if count == 0 {
                return violation("The 'count' argument must not be 0.");
            }
            if count as usize != expected_count {
                return violation(format!(
                    "The 'count' argument should probably read '{}' but is '{}'.",
                    expected_count, count
                ));
            }
        }

        if invoke_type == InvokeType::Static {
            return Ok(());
        }
        let objectref = self.peek(method_ref.descriptor.parameters.len())?;
        if is_init {
            self.check_constructor_receiver(objectref, method_ref)
        } else {
            self.check_receiver(objectref, method_ref, invoke_type)
        }
    }

    /// Arguments on the stack (last one on top) must match the parameter types
    fn check_arguments(&self, parameters: &[FieldType<BinaryName>]) -> Result<(), VerifierError> {
        for (depth, parameter) in parameters.iter().rev().enumerate() {
            let from_stack = self.peek(depth)?;
            let from_desc = VerificationType::from(parameter.clone());
            if *from_stack == from_desc {
                continue;
            }
            match (from_stack, &from_desc) {
                (VerificationType::Null, VerificationType::Object(_)) => (),
                (VerificationType::Uninitialized(_), VerificationType::Object(_)) => {
                    self.reference_is_initialized(from_stack)?
                }
                (VerificationType::Object(actual), VerificationType::Object(expected)) => {
                    if !self.env.is_assignable(actual, expected)? {
                        return violation(format!(
                            "Expecting a '{}' but found a '{}' on the stack (which is not \
                            assignment compatible).",
                            from_desc, from_stack
                        ));
                    }
                }
                _ => {
                    return violation(format!(
                        "Expecting a '{}' but found a '{}' on the stack.",
                        from_desc, from_stack
                    ))
                }
            }
        }
        Ok(())
    }

    fn check_receiver(
        &self,
        objectref: &VerificationType,
        method_ref: &MethodRef,
        invoke_type: InvokeType,
    ) -> Result<(), VerifierError> {
        match objectref {
            VerificationType::Null => Ok(()),
            VerificationType::Uninitialized(_) => self.reference_is_initialized(objectref),
            VerificationType::Object(ref_type) => {
                let owner = RefType::Object(method_ref.class.clone());
                if !self.env.is_assignable(ref_type, &owner)? {
                    return violation(format!(
                        "The 'objref' item '{}' does not implement '{}' as expected.",
                        objectref, method_ref.class
                    ));
                }

                // Private and super calls only ever go through the current class
                if invoke_type == InvokeType::Special {
                    let current = &self.env.current_class().name;
                    let current_type = RefType::Object(current.clone());
                    if !self.env.is_assignable(ref_type, &current_type)? {
                        return violation(format!(
                            "The 'objref' item '{}' of invokespecial is not assignment \
                            compatible with the current class '{}'.",
                            objectref, current
                        ));
                    }
                }
                Ok(())
            }
            _ => violation(format!(
                "Expecting a reference type as 'objectref' on the stack, not a '{}'.",
                objectref
            )),
        }
    }

    /// `<init>` must be called on an uninitialized object
    ///
    /// Objects from `new` must be initialized by a constructor of their own class, while the
    /// receiver of a constructor may also be initialized by a constructor of the superclass.
    fn check_constructor_receiver(
        &self,
        objectref: &VerificationType,
        method_ref: &MethodRef,
    ) -> Result<(), VerifierError> {
        let uninit = match objectref {
            VerificationType::Uninitialized(uninit) => uninit,
            _ => {
                return violation(format!(
                    "Possibly initializing object twice: expecting an uninitialized object as \
                    'objectref' of a constructor call, not a '{}'.",
                    objectref
                ))
            }
        };

        let allowed = match uninit.site {
            NewSite::New(_) => method_ref.class == uninit.class,
            NewSite::This => {
                let current = self.env.current_class();
                method_ref.class == current.name
                    || current
                        .superclass
                        .map_or(false, |superclass| method_ref.class == superclass.name)
            }
        };
        if !allowed {
            return violation(format!(
                "Constructor of '{}' cannot initialize the uninitialized object '{}'.",
                method_ref.class, objectref
            ));
        }
        Ok(())
    }

    fn check_athrow(&self) -> Result<(), VerifierError> {
        let objectref = self.peek(0)?;
        let class_name = match objectref {
            VerificationType::Null => return Ok(()),
            VerificationType::Object(RefType::Object(class_name)) => class_name,
            _ => {
                return violation(format!(
                    "The 'objectref' is not of an (initialized) object type but of type {}.",
                    objectref
                ))
            }
        };
        let class = self.env.class_graph.resolve(class_name)?;
        if !class.is_throwable() {
            return violation(format!(
                "The 'objectref' is not a subclass of ({}) but of {}.",
                BinaryName::THROWABLE,
                objectref
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{
        ClassData, ClassGraphArenas, FieldData, JavaLibrary, MethodData,
    };
    use crate::jvm::code::InsnIndex;
    use crate::jvm::verifier::UninitializedType;
    use crate::jvm::{
        ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, MethodDescriptor, Name,
        ParseDescriptor,
    };
    use VerificationType::*;

    fn name(s: &str) -> BinaryName {
        BinaryName::from_string(s.to_owned()).unwrap()
    }

    fn unqualified(s: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(s.to_owned()).unwrap()
    }

    struct Fixture<'g> {
        java: JavaLibrary<'g>,
        point: ClassId<'g>,
        init: MethodId<'g>,
        get_x: MethodId<'g>,
        static_helper: MethodId<'g>,
    }

    fn fixture<'g>(class_graph: &ClassGraph<'g>) -> Fixture<'g> {
        let java = class_graph.insert_java_library_types();
        let point = class_graph.add_class(ClassData::new(
            name("me/alec/Point"),
            java.object,
            ClassAccessFlags::PUBLIC,
        ));
        class_graph.add_field(FieldData {
            class: point,
            name: unqualified("x"),
            descriptor: FieldType::int(),
            access_flags: FieldAccessFlags::PRIVATE,
        });
        class_graph.add_field(FieldData {
            class: point,
            name: unqualified("ORIGIN"),
            descriptor: FieldType::object(name("me/alec/Point")),
            access_flags: FieldAccessFlags::STATIC,
        });
        let init = class_graph.add_method(MethodData {
            class: point,
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor::parse("(I)V").unwrap(),
            access_flags: MethodAccessFlags::PUBLIC,
        });
        let get_x = class_graph.add_method(MethodData {
            class: point,
            name: unqualified("getX"),
            descriptor: MethodDescriptor::parse("()I").unwrap(),
            access_flags: MethodAccessFlags::PUBLIC,
        });
        let static_helper = class_graph.add_method(MethodData {
            class: point,
            name: unqualified("helper"),
            descriptor: MethodDescriptor::parse("(JLjava/lang/CharSequence;)D").unwrap(),
            access_flags: MethodAccessFlags::STATIC,
        });
        Fixture {
            java,
            point,
            init,
            get_x,
            static_helper,
        }
    }

    fn frame(locals: Vec<VerificationType>, stack: Vec<VerificationType>) -> Frame {
        let mut frame = Frame::new(locals.len(), 6);
        for (index, typ) in locals.into_iter().enumerate() {
            frame.locals.set(index, typ).unwrap();
        }
        for typ in stack {
            frame.stack.push(typ).unwrap();
        }
        frame
    }

    fn message(result: Result<(), VerifierError>) -> String {
        match result {
            Err(VerifierError::Violation(violation)) => violation.message,
            other => panic!("expected a violation, got {:?}", other),
        }
    }

    fn point_type() -> VerificationType {
        VerificationType::object(name("me/alec/Point"))
    }

    fn field(field_name: &str, descriptor: &str) -> FieldRef {
        FieldRef {
            class: name("me/alec/Point"),
            name: unqualified(field_name),
            descriptor: FieldType::parse(descriptor).unwrap(),
        }
    }

    fn method(class: &str, method_name: &str, descriptor: &str) -> MethodRef {
        MethodRef {
            class: name(class),
            name: unqualified(method_name),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
        }
    }

    #[test]
    fn stack_slot_accounting() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let msg = message(check(&Instruction::IAdd, &frame(vec![], vec![Integer]), &env));
        assert!(msg.starts_with("Cannot consume 2 stack slots"), "{}", msg);

        let full = frame(vec![], vec![Long, Long, Long]);
        let msg = message(check(&Instruction::IConst0, &full, &env));
        assert!(msg.starts_with("Cannot produce 1 stack slots"), "{}", msg);

        // A long is not two ints
        let msg = message(check(&Instruction::IAdd, &frame(vec![], vec![Long]), &env));
        assert!(msg.contains("is not of type 'int', but of type 'long'"), "{}", msg);
    }

    #[test]
    fn local_variable_access() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let f = frame(vec![Integer, Long, Unknown], vec![Integer, Integer]);
        assert!(check(&Instruction::ILoad(0), &f, &env).is_ok());
        assert!(check(&Instruction::LLoad(1), &f, &env).is_ok());
        assert!(message(check(&Instruction::IStore(3), &f, &env)).contains("not a valid index"));
        assert!(message(check(&Instruction::LStore(2), &f, &env)).contains("not a valid index"));
        assert!(message(check(&Instruction::ALoad(2), &f, &env)).contains("unknown content"));
        assert!(message(check(&Instruction::FLoad(0), &f, &env)).contains("type mismatch"));
        assert!(message(check(&Instruction::AStore(2), &f, &env)).contains("type mismatch"));
        assert!(message(check(&Instruction::IInc(1, 1), &f, &env)).contains("can't be incremented"));

        // The upper half of the long got overwritten
        let f = frame(vec![Long, Integer], vec![]);
        assert!(message(check(&Instruction::LLoad(0), &f, &env)).contains("destroyed"));

        let f = frame(vec![ReturnAddress(InsnIndex(3))], vec![]);
        assert!(check(&Instruction::Ret(0), &f, &env).is_ok());
        assert!(message(check(&Instruction::ALoad(0), &f, &env)).contains("type mismatch"));
    }

    #[test]
    fn returns() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);

        let env = Environment {
            class_graph: &class_graph,
            method: fixture.static_helper,
        };
        let msg = message(check(&Instruction::IReturn, &frame(vec![], vec![Integer]), &env));
        assert!(msg.contains("return type"), "{}", msg);
        assert!(check(&Instruction::DReturn, &frame(vec![], vec![Double]), &env).is_ok());
        assert!(message(check(&Instruction::Return, &frame(vec![], vec![]), &env))
            .starts_with("RETURN instruction in non-void method"));

        let env = Environment {
            class_graph: &class_graph,
            method: fixture.init,
        };
        let this = UninitializedType {
            class: name("me/alec/Point"),
            site: NewSite::This,
        };
        let mut f = frame(vec![Uninitialized(this.clone())], vec![]);
        f.uninitialized_this = Some(this);
        assert_eq!(
            message(check(&Instruction::Return, &f, &env)),
            "Leaving a constructor that itself did not call a constructor."
        );
        f.uninitialized_this = None;
        assert!(check(&Instruction::Return, &f, &env).is_ok());
        assert!(message(check(&Instruction::AReturn, &frame(vec![], vec![Null]), &env))
            .contains("void"));
    }

    #[test]
    fn fields() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.init,
        };

        let x = field("x", "I");
        let f = frame(vec![], vec![point_type(), Integer]);
        assert!(check(&Instruction::PutField(x.clone()), &f, &env).is_ok());
        assert!(message(check(&Instruction::GetStatic(x.clone()), &f, &env))
            .contains("is not static"));

        let f = frame(vec![], vec![point_type(), Float]);
        assert!(message(check(&Instruction::PutField(x.clone()), &f, &env))
            .contains("is not of type 'int'"));

        // Constructors can set their own fields before calling `super()`
        let this = Uninitialized(UninitializedType {
            class: name("me/alec/Point"),
            site: NewSite::This,
        });
        let f = frame(vec![], vec![this.clone(), Integer]);
        assert!(check(&Instruction::PutField(x.clone()), &f, &env).is_ok());
        let f = frame(vec![], vec![this]);
        assert!(message(check(&Instruction::GetField(x.clone()), &f, &env))
            .contains("uninitialized object"));

        let f = frame(vec![], vec![VerificationType::object(BinaryName::STRING)]);
        assert!(message(check(&Instruction::GetField(x), &f, &env)).contains("not an instance"));

        let f = frame(vec![], vec![VerificationType::object(BinaryName::STRING)]);
        let origin = field("ORIGIN", "Lme/alec/Point;");
        assert!(message(check(&Instruction::PutStatic(origin.clone()), &f, &env))
            .contains("not assignment compatible"));
        let f = frame(vec![], vec![Null]);
        assert!(check(&Instruction::PutStatic(origin), &f, &env).is_ok());

        let missing = field("y", "I");
        assert_eq!(
            message(check(&Instruction::GetStatic(missing), &frame(vec![], vec![]), &env)),
            "Field 'me/alec/Point.y I' not found."
        );
    }

    #[test]
    fn invokes() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let helper = Instruction::Invoke(
            InvokeType::Static,
            method("me/alec/Point", "helper", "(JLjava/lang/CharSequence;)D"),
        );
        let f = frame(vec![], vec![Long, VerificationType::object(BinaryName::STRING)]);
        assert!(check(&helper, &f, &env).is_ok());
        let f = frame(vec![], vec![Long, Null]);
        assert!(check(&helper, &f, &env).is_ok());
        let f = frame(vec![], vec![Integer, Integer, Null]);
        assert!(message(check(&helper, &f, &env)).contains("Expecting a 'long'"));

        let get_x = method("me/alec/Point", "getX", "()I");
        let f = frame(vec![], vec![point_type()]);
        assert!(check(&Instruction::Invoke(InvokeType::Virtual, get_x.clone()), &f, &env).is_ok());
        assert!(message(check(&Instruction::Invoke(InvokeType::Static, get_x.clone()), &f, &env))
            .contains("is not static"));
        assert!(message(check(
            &Instruction::Invoke(InvokeType::Interface(1), get_x.clone()),
            &f,
            &env
        ))
        .contains("is not an interface"));
        let f = frame(vec![], vec![VerificationType::object(BinaryName::STRING)]);
        assert!(message(check(&Instruction::Invoke(InvokeType::Virtual, get_x), &f, &env))
            .contains("does not implement"));

        let length = method("java/lang/CharSequence", "length", "()I");
        let f = frame(vec![], vec![VerificationType::object(BinaryName::STRING)]);
        assert!(check(&Instruction::Invoke(InvokeType::Interface(1), length.clone()), &f, &env)
            .is_ok());
        assert!(message(check(&Instruction::Invoke(InvokeType::Interface(2), length), &f, &env))
            .contains("'count'"));

        let missing = method("me/alec/Point", "getY", "()I");
        let f = frame(vec![], vec![point_type()]);
        assert!(message(check(&Instruction::Invoke(InvokeType::Virtual, missing), &f, &env))
            .contains("not found"));
    }

    #[test]
    fn constructor_calls() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.init,
        };

        let point_init = Instruction::Invoke(
            InvokeType::Special,
            method("me/alec/Point", "<init>", "(I)V"),
        );
        let object_init = Instruction::Invoke(
            InvokeType::Special,
            method("java/lang/Object", "<init>", "()V"),
        );
        let fresh = Uninitialized(UninitializedType {
            class: name("me/alec/Point"),
            site: NewSite::New(InsnIndex(0)),
        });
        let this = Uninitialized(UninitializedType {
            class: name("me/alec/Point"),
            site: NewSite::This,
        });

        assert!(check(&point_init, &frame(vec![], vec![fresh.clone(), Integer]), &env).is_ok());
        assert!(check(&object_init, &frame(vec![], vec![this.clone()]), &env).is_ok());
        assert!(message(check(&object_init, &frame(vec![], vec![fresh]), &env))
            .contains("cannot initialize"));
        assert!(message(check(&point_init, &frame(vec![], vec![point_type(), Integer]), &env))
            .contains("initializing object twice"));

        let new_interface = Instruction::New(BinaryName::CHARSEQUENCE);
        assert!(message(check(&new_interface, &frame(vec![], vec![]), &env))
            .contains("is an interface"));
        assert_eq!(fixture.point.name, name("me/alec/Point"));
        assert_eq!(fixture.java.object.name, BinaryName::OBJECT);
    }

    #[test]
    fn special_calls_go_through_the_current_class() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let super_to_string = Instruction::Invoke(
            InvokeType::Special,
            method("java/lang/Object", "toString", "()Ljava/lang/String;"),
        );
        let own_get_x =
            Instruction::Invoke(InvokeType::Special, method("me/alec/Point", "getX", "()I"));

        assert!(check(&super_to_string, &frame(vec![], vec![point_type()]), &env).is_ok());
        assert!(check(&own_get_x, &frame(vec![], vec![point_type()]), &env).is_ok());
        assert!(check(&super_to_string, &frame(vec![], vec![Null]), &env).is_ok());

        let string = VerificationType::object(BinaryName::STRING);
        let msg = message(check(&super_to_string, &frame(vec![], vec![string.clone()]), &env));
        assert!(msg.contains("not assignment compatible with the current class"), "{}", msg);

        // The same call is fine when it isn't invokespecial
        let virtual_to_string = Instruction::Invoke(
            InvokeType::Virtual,
            method("java/lang/Object", "toString", "()Ljava/lang/String;"),
        );
        assert!(check(&virtual_to_string, &frame(vec![], vec![string]), &env).is_ok());
    }

    #[test]
    fn referenced_classes_must_be_verified() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let pending = class_graph.add_class(ClassData::new(
            name("me/alec/Pending"),
            fixture.java.object,
            ClassAccessFlags::PUBLIC,
        ));
        pending.status.set(ClassStatus::Pending);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let f = frame(vec![], vec![]);
        assert_eq!(
            check(&Instruction::New(name("me/alec/Pending")), &f, &env),
            Err(VerifierError::NotYet(name("me/alec/Pending")))
        );
        assert!(matches!(
            check(&Instruction::New(name("me/alec/Missing")), &f, &env),
            Err(VerifierError::Resolution(_))
        ));

        // The class being verified is pending too, but that's fine
        fixture.point.status.set(ClassStatus::Pending);
        assert!(check(&Instruction::New(name("me/alec/Point")), &f, &env).is_ok());
    }

    #[test]
    fn stack_manipulation_forms() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        assert!(message(check(&Instruction::Pop, &frame(vec![], vec![Double]), &env))
            .contains("size"));
        assert!(check(&Instruction::Pop2, &frame(vec![], vec![Double]), &env).is_ok());
        assert!(check(&Instruction::Dup2X2, &frame(vec![], vec![Long, Integer, Float]), &env)
            .is_ok());
        assert!(message(check(
            &Instruction::Dup2X2,
            &frame(vec![], vec![Integer, Long, Integer]),
            &env
        ))
        .contains("four forms"));
        assert!(message(check(&Instruction::Swap, &frame(vec![], vec![Long]), &env))
            .contains("size 1"));
    }

    #[test]
    fn arrays() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let ints = Object(RefType::parse("[I").unwrap());
        let strings = Object(RefType::parse("[Ljava/lang/String;").unwrap());
        let bytes = Object(RefType::parse("[B").unwrap());

        assert!(check(&Instruction::IALoad, &frame(vec![], vec![ints.clone(), Integer]), &env)
            .is_ok());
        assert!(check(&Instruction::IALoad, &frame(vec![], vec![Null, Integer]), &env).is_ok());
        assert!(message(check(&Instruction::IALoad, &frame(vec![], vec![bytes.clone(), Integer]), &env))
            .contains("elements of type int"));
        assert!(check(&Instruction::BAStore, &frame(vec![], vec![bytes, Integer, Integer]), &env)
            .is_ok());
        assert!(check(
            &Instruction::AAStore,
            &frame(vec![], vec![strings, Integer, point_type()]),
            &env
        )
        .is_ok());
        assert!(message(check(&Instruction::AALoad, &frame(vec![], vec![ints, Integer]), &env))
            .contains("reference type"));
        assert!(message(check(&Instruction::ArrayLength, &frame(vec![], vec![point_type()]), &env))
            .contains("does not refer to an array"));

        let multi = Instruction::MultiANewArray(RefType::parse("[[I").unwrap(), 3);
        assert!(message(check(&multi, &frame(vec![], vec![Integer, Integer, Integer]), &env))
            .contains("more dimensions"));
        let multi = Instruction::MultiANewArray(RefType::parse("[[I").unwrap(), 2);
        assert!(check(&multi, &frame(vec![], vec![Integer, Integer]), &env).is_ok());
        assert!(message(check(&multi, &frame(vec![], vec![Float, Integer]), &env))
            .contains("should be 'int'"));
    }

    #[test]
    fn throwing() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let fixture = fixture(&class_graph);
        let env = Environment {
            class_graph: &class_graph,
            method: fixture.get_x,
        };

        let npe = VerificationType::object(BinaryName::NULLPOINTEREXCEPTION);
        assert!(check(&Instruction::AThrow, &frame(vec![], vec![npe]), &env).is_ok());
        assert!(check(&Instruction::AThrow, &frame(vec![], vec![Null]), &env).is_ok());
        assert!(message(check(&Instruction::AThrow, &frame(vec![], vec![point_type()]), &env))
            .contains("not a subclass"));
        assert!(message(check(&Instruction::AThrow, &frame(vec![], vec![Integer]), &env))
            .contains("not of an (initialized) object type"));
    }
}
