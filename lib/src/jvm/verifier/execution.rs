use super::{AssertionViolated, Frame, NewSite, UninitializedType, VerificationType, VerifierError};
use crate::jvm::code::{ConstantData, InsnIndex, Instruction, InvokeType};
use crate::jvm::{BinaryName, FieldType, RefType, RenderDescriptor, UnqualifiedName};

/// Symbolically run an instruction, updating the frame with the types it produces
///
/// This doesn't check anything: the constraints of the instruction must already have been
/// checked against the same frame. Anything still going wrong here (eg. popping an empty stack)
/// is an internal error.
pub fn execute(
    insn: &Instruction,
    index: InsnIndex,
    frame: &mut Frame,
) -> Result<(), VerifierError> {
    use Instruction::*;
    use VerificationType::*;

    match insn {
        Nop => (),
        AConstNull => frame.stack.push(Null)?,
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            frame.stack.push(Integer)?;
        }
        LConst0 | LConst1 => frame.stack.push(Long)?,
        FConst0 | FConst1 | FConst2 => frame.stack.push(Float)?,
        DConst0 | DConst1 => frame.stack.push(Double)?,
        BiPush(_) | SiPush(_) => frame.stack.push(Integer)?,
        Ldc(constant) | Ldc2(constant) => frame.stack.push(constant_type(constant))?,

        ILoad(_) => frame.stack.push(Integer)?,
        LLoad(_) => frame.stack.push(Long)?,
        FLoad(_) => frame.stack.push(Float)?,
        DLoad(_) => frame.stack.push(Double)?,
        ALoad(local) => {
            let typ = frame.locals.get(*local as usize)?.clone();
            frame.stack.push(typ)?;
        }

        IALoad | BALoad | CALoad | SALoad => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Integer)?;
        }
        LALoad => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Long)?;
        }
        FALoad => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Float)?;
        }
        DALoad => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Double)?;
        }
        AALoad => {
            frame.stack.pop()?;
            let element = match frame.stack.pop()? {
                Object(array_type) => match array_type.element_type() {
                    Some(element_type) => VerificationType::from(element_type),
                    None => {
                        return Err(AssertionViolated::new(format!(
                            "aaload from the non-array type {}",
                            array_type.render()
                        ))
                        .into())
                    }
                },
                _ => Null,
            };
            frame.stack.push(element)?;
        }

        IStore(local) => store(frame, *local, Integer)?,
        FStore(local) => store(frame, *local, Float)?,
        LStore(local) => store(frame, *local, Long)?,
        DStore(local) => store(frame, *local, Double)?,
        AStore(local) => {
            let typ = frame.stack.peek(0)?.clone();
            store(frame, *local, typ)?;
        }

        IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
            frame.stack.pop_n(3)?;
        }

        Pop => {
            frame.stack.pop()?;
        }
        Pop2 => {
            if !frame.stack.pop()?.is_category2() {
                frame.stack.pop()?;
            }
        }
        Dup => {
            let value1 = frame.stack.peek(0)?.clone();
            frame.stack.push(value1)?;
        }
        DupX1 => {
            let value1 = frame.stack.pop()?;
            let value2 = frame.stack.pop()?;
            push_all(frame, vec![value1.clone(), value2, value1])?;
        }
        DupX2 => {
            let value1 = frame.stack.pop()?;
            let value2 = frame.stack.pop()?;
            if value2.is_category2() {
                push_all(frame, vec![value1.clone(), value2, value1])?;
            } else {
                let value3 = frame.stack.pop()?;
                push_all(frame, vec![value1.clone(), value3, value2, value1])?;
            }
        }
        Dup2 => {
            let value1 = frame.stack.pop()?;
            if value1.is_category2() {
                push_all(frame, vec![value1.clone(), value1])?;
            } else {
                let value2 = frame.stack.pop()?;
                push_all(frame, vec![value2.clone(), value1.clone(), value2, value1])?;
            }
        }
        Dup2X1 => {
            let value1 = frame.stack.pop()?;
            if value1.is_category2() {
                let value2 = frame.stack.pop()?;
                push_all(frame, vec![value1.clone(), value2, value1])?;
            } else {
                let value2 = frame.stack.pop()?;
                let value3 = frame.stack.pop()?;
                push_all(
                    frame,
                    vec![value2.clone(), value1.clone(), value3, value2, value1],
                )?;
            }
        }
        Dup2X2 => {
            let value1 = frame.stack.pop()?;
            let value2 = frame.stack.pop()?;
            match (value1.is_category2(), value2.is_category2()) {
                // Form 4
                (true, true) => push_all(frame, vec![value1.clone(), value2, value1])?,

                // Form 2
                (true, false) => {
                    let value3 = frame.stack.pop()?;
                    push_all(frame, vec![value1.clone(), value3, value2, value1])?;
                }

                (false, _) => {
                    let value3 = frame.stack.pop()?;
                    if value3.is_category2() {
                        // Form 3
                        push_all(
                            frame,
                            vec![value2.clone(), value1.clone(), value3, value2, value1],
                        )?;
                    } else {
                        // Form 1
                        let value4 = frame.stack.pop()?;
                        push_all(
                            frame,
                            vec![
                                value2.clone(),
                                value1.clone(),
                                value4,
                                value3,
                                value2,
                                value1,
                            ],
                        )?;
                    }
                }
            }
        }
        Swap => {
            let value1 = frame.stack.pop()?;
            let value2 = frame.stack.pop()?;
            push_all(frame, vec![value1, value2])?;
        }

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Integer)?;
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | LSh(_) => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Long)?;
        }
        FAdd | FSub | FMul | FDiv | FRem => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Float)?;
        }
        DAdd | DSub | DMul | DDiv | DRem => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Double)?;
        }
        INeg | LNeg | FNeg | DNeg => (),
        IInc(_, _) => (),

        L2I | F2I | D2I | I2B | I2C | I2S => replace_top(frame, Integer)?,
        I2L | F2L | D2L => replace_top(frame, Long)?,
        I2F | L2F | D2F => replace_top(frame, Float)?,
        I2D | L2D | F2D => replace_top(frame, Double)?,

        LCmp | FCmp(_) | DCmp(_) => {
            frame.stack.pop_n(2)?;
            frame.stack.push(Integer)?;
        }

        If(_, _) | IfNull(_, _) => {
            frame.stack.pop()?;
        }
        IfICmp(_, _) | IfACmp(_, _) => {
            frame.stack.pop_n(2)?;
        }
        Goto(_) => (),
        Jsr(_) => frame.stack.push(ReturnAddress(index.next()))?,
        Ret(_) => (),
        TableSwitch { .. } | LookupSwitch { .. } => {
            frame.stack.pop()?;
        }

        IReturn | LReturn | FReturn | DReturn | AReturn => {
            frame.stack.pop()?;
        }
        Return => (),

        GetStatic(field) => frame.stack.push(field.descriptor.clone().into())?,
        PutStatic(_) => {
            frame.stack.pop()?;
        }
        GetField(field) => {
            frame.stack.pop()?;
            frame.stack.push(field.descriptor.clone().into())?;
        }
        PutField(_) => {
            frame.stack.pop_n(2)?;
        }

        Invoke(invoke_type, method) => {
            frame.stack.pop_n(method.descriptor.parameters.len())?;
            if *invoke_type != InvokeType::Static {
                let receiver = frame.stack.pop()?;
                if *invoke_type == InvokeType::Special && method.name == UnqualifiedName::INIT {
                    if let Uninitialized(uninit) = receiver {
                        frame.initialize_object(&uninit);
                    }
                }
            }
            let return_type = VerificationType::from_return_type(&method.descriptor.return_type);
            if let Some(return_type) = return_type {
                frame.stack.push(return_type)?;
            }
        }
        InvokeDynamic(indy) => {
            frame.stack.pop_n(indy.descriptor.parameters.len())?;
            let return_type = VerificationType::from_return_type(&indy.descriptor.return_type);
            if let Some(return_type) = return_type {
                frame.stack.push(return_type)?;
            }
        }

        New(class) => frame.stack.push(Uninitialized(UninitializedType {
            class: class.clone(),
            site: NewSite::New(index),
        }))?,
        NewArray(base_type) => {
            frame.stack.pop()?;
            frame
                .stack
                .push(Object(RefType::array(FieldType::Base(*base_type))))?;
        }
        ANewArray(element_type) => {
            frame.stack.pop()?;
            frame
                .stack
                .push(Object(RefType::array(FieldType::Ref(element_type.clone()))))?;
        }
        ArrayLength => replace_top(frame, Integer)?,
        AThrow => {
            let thrown = match frame.stack.pop()? {
                Null => VerificationType::object(BinaryName::NULLPOINTEREXCEPTION),
                other => other,
            };
            frame.stack.clear();
            frame.stack.push(thrown)?;
        }
        CheckCast(ref_type) => replace_top(frame, Object(ref_type.clone()))?,
        InstanceOf(_) => replace_top(frame, Integer)?,
        MonitorEnter | MonitorExit => {
            frame.stack.pop()?;
        }
        MultiANewArray(ref_type, dimensions) => {
            frame.stack.pop_n(*dimensions as usize)?;
            frame.stack.push(Object(ref_type.clone()))?;
        }
    }

    Ok(())
}

/// Type of the value pushed by `ldc`/`ldc2_w`
pub fn constant_type(constant: &ConstantData) -> VerificationType {
    match constant {
        ConstantData::Integer(_) => VerificationType::Integer,
        ConstantData::Float(_) => VerificationType::Float,
        ConstantData::Long(_) => VerificationType::Long,
        ConstantData::Double(_) => VerificationType::Double,
        ConstantData::String(_) => VerificationType::object(BinaryName::STRING),
        ConstantData::Class(_) => VerificationType::object(BinaryName::CLASS),
        ConstantData::MethodType(_) => VerificationType::object(BinaryName::METHODTYPE),
        ConstantData::MethodHandle(_) => VerificationType::object(BinaryName::METHODHANDLE),
    }
}

/// Pop the top of the stack into a local
///
/// The local after a `long` or `double` holds its upper half, so it can't be read on its own.
fn store(frame: &mut Frame, local: u16, typ: VerificationType) -> Result<(), VerifierError> {
    frame.stack.pop()?;
    let local = local as usize;
    let wide = typ.is_category2();
    frame.locals.set(local, typ)?;
    if wide {
        frame.locals.set(local + 1, VerificationType::Unknown)?;
    }
    Ok(())
}

fn replace_top(frame: &mut Frame, typ: VerificationType) -> Result<(), VerifierError> {
    frame.stack.pop()?;
    frame.stack.push(typ)?;
    Ok(())
}

/// Push values, first element first
fn push_all(frame: &mut Frame, values: Vec<VerificationType>) -> Result<(), VerifierError> {
    for value in values {
        frame.stack.push(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::MethodRef;
    use crate::jvm::{MethodDescriptor, ParseDescriptor};
    use VerificationType::*;

    fn frame(locals: usize, stack: Vec<VerificationType>) -> Frame {
        let mut frame = Frame::new(locals, 8);
        for typ in stack {
            frame.stack.push(typ).unwrap();
        }
        frame
    }

    fn stack(frame: &Frame) -> Vec<VerificationType> {
        frame.stack.iter().cloned().collect()
    }

    #[test]
    fn dup_forms() {
        let mut f = frame(0, vec![Float, Integer, Long]);
        execute(&Instruction::Dup2X1, InsnIndex(0), &mut f).unwrap();
        assert_eq!(stack(&f), vec![Float, Long, Integer, Long]);

        let mut f = frame(0, vec![Double, Integer]);
        execute(&Instruction::DupX2, InsnIndex(0), &mut f).unwrap();
        assert_eq!(stack(&f), vec![Integer, Double, Integer]);

        let mut f = frame(0, vec![Null, Float, Integer, Float]);
        execute(&Instruction::Dup2X2, InsnIndex(0), &mut f).unwrap();
        assert_eq!(stack(&f), vec![Integer, Float, Null, Float, Integer, Float]);

        let mut f = frame(0, vec![Integer, Long]);
        execute(&Instruction::Swap, InsnIndex(0), &mut f).unwrap();
        assert_eq!(stack(&f), vec![Long, Integer]);
    }

    #[test]
    fn two_slot_stores_clobber_the_upper_half() {
        let mut f = frame(3, vec![Double]);
        f.locals.set(1, Integer).unwrap();
        execute(&Instruction::DStore(0), InsnIndex(0), &mut f).unwrap();
        assert_eq!(f.locals.get(0), Ok(&Double));
        assert_eq!(f.locals.get(1), Ok(&Unknown));
        assert!(f.stack.is_empty());
    }

    #[test]
    fn constructors_initialize_every_copy() {
        let uninit = UninitializedType {
            class: BinaryName::STRING,
            site: NewSite::New(InsnIndex(0)),
        };
        let mut f = frame(1, vec![]);
        execute(&Instruction::New(BinaryName::STRING), InsnIndex(0), &mut f).unwrap();
        execute(&Instruction::Dup, InsnIndex(1), &mut f).unwrap();
        execute(&Instruction::AStore(0), InsnIndex(2), &mut f).unwrap();
        assert_eq!(f.locals.get(0), Ok(&Uninitialized(uninit)));

        let init = Instruction::Invoke(
            InvokeType::Special,
            MethodRef {
                class: BinaryName::STRING,
                name: UnqualifiedName::INIT,
                descriptor: MethodDescriptor::parse("()V").unwrap(),
            },
        );
        execute(&init, InsnIndex(3), &mut f).unwrap();
        assert!(f.stack.is_empty());
        assert_eq!(f.locals.get(0), Ok(&VerificationType::object(BinaryName::STRING)));
    }

    #[test]
    fn throwing_null() {
        let mut f = frame(0, vec![Integer, Long, Null]);
        execute(&Instruction::AThrow, InsnIndex(0), &mut f).unwrap();
        assert_eq!(
            stack(&f),
            vec![VerificationType::object(BinaryName::NULLPOINTEREXCEPTION)]
        );
    }

    #[test]
    fn arrays() {
        let mut f = frame(0, vec![Integer]);
        execute(&Instruction::ANewArray(RefType::parse("[I").unwrap()), InsnIndex(0), &mut f)
            .unwrap();
        assert_eq!(stack(&f), vec![Object(RefType::parse("[[I").unwrap())]);

        f.stack.push(Integer).unwrap();
        execute(&Instruction::AALoad, InsnIndex(1), &mut f).unwrap();
        assert_eq!(stack(&f), vec![Object(RefType::parse("[I").unwrap())]);

        let mut f = frame(0, vec![Null, Integer]);
        execute(&Instruction::AALoad, InsnIndex(0), &mut f).unwrap();
        assert_eq!(stack(&f), vec![Null]);
    }

    #[test]
    fn jsr_pushes_the_return_address() {
        let mut f = frame(0, vec![]);
        execute(&Instruction::Jsr(InsnIndex(9)), InsnIndex(4), &mut f).unwrap();
        assert_eq!(stack(&f), vec![ReturnAddress(InsnIndex(5))]);
    }
}
