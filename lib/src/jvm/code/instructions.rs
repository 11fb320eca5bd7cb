//! This module contains the AST of JVM bytecode, as seen by the verifier. The representation is
//! slightly different from the usual presentation to make it more convenient to analyze:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - Shortcut forms (`iload_0`, `goto_w`, `jsr_w`, ...) are folded into their general form
//!
//!   - Branch targets are indices into the instruction list rather than byte offsets, and
//!     constant pool references are replaced by the constants they point to
//!

use crate::jvm::{
    BaseType, BinaryName, FieldType, MethodDescriptor, RefType, RenderDescriptor, UnqualifiedName,
};
use crate::util::Width;
use std::fmt;

/// Position of an instruction in a method body
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct InsnIndex(pub usize);

impl InsnIndex {
    /// Index of the instruction physically following this one
    pub fn next(self) -> InsnIndex {
        InsnIndex(self.0 + 1)
    }
}

impl fmt::Display for InsnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Symbolic reference to a method (or interface method)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Name and type of a dynamically linked call site
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvokeDynamicRef {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Loadable constants
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantData {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    MethodType(MethodDescriptor<BinaryName>),
    MethodHandle(MethodRef),
}

impl ConstantData {
    /// Does this constant take two slots (so must be loaded with `ldc2_w`)?
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantData::Long(_) | ConstantData::Double(_))
    }
}

/// JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantData), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantData),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    If(OrdComparison, InsnIndex), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, InsnIndex), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, InsnIndex), // covers `if_acmpeq`, `if_acmpne`
    Goto(InsnIndex),              // covers `goto` and `goto_w`
    Jsr(InsnIndex),               // covers `jsr` and `jsr_w`
    Ret(u16),                     // covers `ret` and `wide ret`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: InsnIndex,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<InsnIndex>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: InsnIndex,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, InsnIndex)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(InvokeDynamicRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>),
    ArrayLength,
    AThrow,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType<BinaryName>, u8),
    IfNull(EqComparison, InsnIndex), // covers `ifnull`, `ifnonnull`
}

impl Instruction {
    /// Number of operand stack slots this instruction pops
    pub fn consume_stack(&self) -> usize {
        use Instruction::*;

        match self {
            Nop | AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4
            | IConst5 | LConst0 | LConst1 | FConst0 | FConst1 | FConst2 | DConst0 | DConst1
            | BiPush(_) | SiPush(_) | Ldc(_) | Ldc2(_) => 0,
            ILoad(_) | LLoad(_) | FLoad(_) | DLoad(_) | ALoad(_) => 0,
            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => 2,
            IStore(_) | FStore(_) | AStore(_) => 1,
            LStore(_) | DStore(_) => 2,
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => 3,
            LAStore | DAStore => 4,
            Pop => 1,
            Pop2 => 2,
            Dup => 1,
            DupX1 => 2,
            DupX2 => 3,
            Dup2 => 2,
            Dup2X1 => 3,
            Dup2X2 => 4,
            Swap => 2,
            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem => 2,
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem => 4,
            INeg | FNeg => 1,
            LNeg | DNeg => 2,
            ISh(_) => 2,
            LSh(_) => 3,
            IAnd | IOr | IXor => 2,
            LAnd | LOr | LXor => 4,
            IInc(_, _) => 0,
            I2L | I2F | I2D | F2I | F2L | F2D | I2B | I2C | I2S => 1,
            L2I | L2F | L2D | D2I | D2L | D2F => 2,
            LCmp | DCmp(_) => 4,
            FCmp(_) => 2,
            If(_, _) | IfNull(_, _) => 1,
            IfICmp(_, _) | IfACmp(_, _) => 2,
            Goto(_) | Jsr(_) | Ret(_) => 0,
            TableSwitch { .. } | LookupSwitch { .. } => 1,
            IReturn | FReturn | AReturn => 1,
            LReturn | DReturn => 2,
            Return => 0,
            GetStatic(_) => 0,
            PutStatic(field) => field.descriptor.width(),
            GetField(_) => 1,
            PutField(field) => 1 + field.descriptor.width(),
            Invoke(invoke_type, method) => method
                .descriptor
                .parameter_length(*invoke_type != InvokeType::Static),
            InvokeDynamic(indy) => indy.descriptor.parameter_length(false),
            New(_) => 0,
            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => 1,
            AThrow | MonitorEnter | MonitorExit => 1,
            MultiANewArray(_, dimensions) => *dimensions as usize,
        }
    }

    /// Number of operand stack slots this instruction pushes
    ///
    /// Note: `athrow` is considered to push nothing. It clears the stack and pushes back the
    /// exception it was given, so the stack never grows.
    pub fn produce_stack(&self) -> usize {
        use Instruction::*;

        match self {
            Nop => 0,
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
            | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | Ldc(_) => 1,
            LConst0 | LConst1 | DConst0 | DConst1 | Ldc2(_) => 2,
            ILoad(_) | FLoad(_) | ALoad(_) => 1,
            LLoad(_) | DLoad(_) => 2,
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => 1,
            LALoad | DALoad => 2,
            IStore(_) | LStore(_) | FStore(_) | DStore(_) | AStore(_) => 0,
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => 0,
            Pop | Pop2 => 0,
            Dup => 2,
            DupX1 => 3,
            DupX2 => 4,
            Dup2 => 4,
            Dup2X1 => 5,
            Dup2X2 => 6,
            Swap => 2,
            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem => 1,
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem => 2,
            INeg | FNeg => 1,
            LNeg | DNeg => 2,
            ISh(_) => 1,
            LSh(_) => 2,
            IAnd | IOr | IXor => 1,
            LAnd | LOr | LXor => 2,
            IInc(_, _) => 0,
            I2F | L2I | L2F | F2I | D2I | D2F | I2B | I2C | I2S => 1,
            I2L | I2D | L2D | F2L | F2D | D2L => 2,
            LCmp | FCmp(_) | DCmp(_) => 1,
            If(_, _) | IfICmp(_, _) | IfACmp(_, _) | IfNull(_, _) | Goto(_) | Ret(_) => 0,
            Jsr(_) => 1,
            TableSwitch { .. } | LookupSwitch { .. } => 0,
            IReturn | LReturn | FReturn | DReturn | AReturn | Return => 0,
            GetStatic(field) | GetField(field) => field.descriptor.width(),
            PutStatic(_) | PutField(_) => 0,
            Invoke(_, method) => method.descriptor.return_type.as_ref().map_or(0, |t| t.width()),
            InvokeDynamic(indy) => indy.descriptor.return_type.as_ref().map_or(0, |t| t.width()),
            New(_) | NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => 1,
            AThrow | MonitorEnter | MonitorExit => 0,
            MultiANewArray(_, _) => 1,
        }
    }

    /// Explicit jump targets (this excludes the implicit fall through to the next instruction)
    pub fn jump_targets(&self) -> Vec<InsnIndex> {
        match self {
            Instruction::If(_, target)
            | Instruction::IfICmp(_, target)
            | Instruction::IfACmp(_, target)
            | Instruction::IfNull(_, target)
            | Instruction::Goto(target)
            | Instruction::Jsr(target) => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Instruction::LookupSwitch { default, targets } => {
                let mut all = vec![*default];
                all.extend(targets.iter().map(|(_, target)| *target));
                all
            }
            _ => vec![],
        }
    }

    /// Can execution continue at the physically next instruction?
    ///
    /// This includes `jsr`, since the subroutine eventually returns to the instruction after it.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto(_)
                | Instruction::Ret(_)
                | Instruction::TableSwitch { .. }
                | Instruction::LookupSwitch { .. }
                | Instruction::IReturn
                | Instruction::LReturn
                | Instruction::FReturn
                | Instruction::DReturn
                | Instruction::AReturn
                | Instruction::Return
                | Instruction::AThrow
        )
    }

    /// Is this one of the method return instructions?
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            Instruction::IReturn
                | Instruction::LReturn
                | Instruction::FReturn
                | Instruction::DReturn
                | Instruction::AReturn
                | Instruction::Return
        )
    }

    /// Local variable accessed (read or written), along with how many slots are touched
    pub fn local_variable(&self) -> Option<(u16, usize)> {
        match self {
            Instruction::ILoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::FStore(idx)
            | Instruction::AStore(idx)
            | Instruction::IInc(idx, _)
            | Instruction::Ret(idx) => Some((*idx, 1)),
            Instruction::LLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::LStore(idx)
            | Instruction::DStore(idx) => Some((*idx, 2)),
            _ => None,
        }
    }

    /// Name of the instruction, as it would be written in assembly
    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;

        match self {
            Nop => "nop",
            AConstNull => "aconst_null",
            IConstM1 => "iconst_m1",
            IConst0 => "iconst_0",
            IConst1 => "iconst_1",
            IConst2 => "iconst_2",
            IConst3 => "iconst_3",
            IConst4 => "iconst_4",
            IConst5 => "iconst_5",
            LConst0 => "lconst_0",
            LConst1 => "lconst_1",
            FConst0 => "fconst_0",
            FConst1 => "fconst_1",
            FConst2 => "fconst_2",
            DConst0 => "dconst_0",
            DConst1 => "dconst_1",
            BiPush(_) => "bipush",
            SiPush(_) => "sipush",
            Ldc(_) => "ldc",
            Ldc2(_) => "ldc2_w",
            ILoad(_) => "iload",
            LLoad(_) => "lload",
            FLoad(_) => "fload",
            DLoad(_) => "dload",
            ALoad(_) => "aload",
            IALoad => "iaload",
            LALoad => "laload",
            FALoad => "faload",
            DALoad => "daload",
            AALoad => "aaload",
            BALoad => "baload",
            CALoad => "caload",
            SALoad => "saload",
            IStore(_) => "istore",
            LStore(_) => "lstore",
            FStore(_) => "fstore",
            DStore(_) => "dstore",
            AStore(_) => "astore",
            IAStore => "iastore",
            LAStore => "lastore",
            FAStore => "fastore",
            DAStore => "dastore",
            AAStore => "aastore",
            BAStore => "bastore",
            CAStore => "castore",
            SAStore => "sastore",
            Pop => "pop",
            Pop2 => "pop2",
            Dup => "dup",
            DupX1 => "dup_x1",
            DupX2 => "dup_x2",
            Dup2 => "dup2",
            Dup2X1 => "dup2_x1",
            Dup2X2 => "dup2_x2",
            Swap => "swap",
            IAdd => "iadd",
            LAdd => "ladd",
            FAdd => "fadd",
            DAdd => "dadd",
            ISub => "isub",
            LSub => "lsub",
            FSub => "fsub",
            DSub => "dsub",
            IMul => "imul",
            LMul => "lmul",
            FMul => "fmul",
            DMul => "dmul",
            IDiv => "idiv",
            LDiv => "ldiv",
            FDiv => "fdiv",
            DDiv => "ddiv",
            IRem => "irem",
            LRem => "lrem",
            FRem => "frem",
            DRem => "drem",
            INeg => "ineg",
            LNeg => "lneg",
            FNeg => "fneg",
            DNeg => "dneg",
            ISh(ShiftType::Left) => "ishl",
            ISh(ShiftType::ArithmeticRight) => "ishr",
            ISh(ShiftType::LogicalRight) => "iushr",
            LSh(ShiftType::Left) => "lshl",
            LSh(ShiftType::ArithmeticRight) => "lshr",
            LSh(ShiftType::LogicalRight) => "lushr",
            IAnd => "iand",
            LAnd => "land",
            IOr => "ior",
            LOr => "lor",
            IXor => "ixor",
            LXor => "lxor",
            IInc(_, _) => "iinc",
            I2L => "i2l",
            I2F => "i2f",
            I2D => "i2d",
            L2I => "l2i",
            L2F => "l2f",
            L2D => "l2d",
            F2I => "f2i",
            F2L => "f2l",
            F2D => "f2d",
            D2I => "d2i",
            D2L => "d2l",
            D2F => "d2f",
            I2B => "i2b",
            I2C => "i2c",
            I2S => "i2s",
            LCmp => "lcmp",
            FCmp(CompareMode::L) => "fcmpl",
            FCmp(CompareMode::G) => "fcmpg",
            DCmp(CompareMode::L) => "dcmpl",
            DCmp(CompareMode::G) => "dcmpg",
            If(OrdComparison::EQ, _) => "ifeq",
            If(OrdComparison::NE, _) => "ifne",
            If(OrdComparison::LT, _) => "iflt",
            If(OrdComparison::GE, _) => "ifge",
            If(OrdComparison::GT, _) => "ifgt",
            If(OrdComparison::LE, _) => "ifle",
            IfICmp(OrdComparison::EQ, _) => "if_icmpeq",
            IfICmp(OrdComparison::NE, _) => "if_icmpne",
            IfICmp(OrdComparison::LT, _) => "if_icmplt",
            IfICmp(OrdComparison::GE, _) => "if_icmpge",
            IfICmp(OrdComparison::GT, _) => "if_icmpgt",
            IfICmp(OrdComparison::LE, _) => "if_icmple",
            IfACmp(EqComparison::EQ, _) => "if_acmpeq",
            IfACmp(EqComparison::NE, _) => "if_acmpne",
            Goto(_) => "goto",
            Jsr(_) => "jsr",
            Ret(_) => "ret",
            TableSwitch { .. } => "tableswitch",
            LookupSwitch { .. } => "lookupswitch",
            IReturn => "ireturn",
            LReturn => "lreturn",
            FReturn => "freturn",
            DReturn => "dreturn",
            AReturn => "areturn",
            Return => "return",
            GetStatic(_) => "getstatic",
            PutStatic(_) => "putstatic",
            GetField(_) => "getfield",
            PutField(_) => "putfield",
            Invoke(InvokeType::Virtual, _) => "invokevirtual",
            Invoke(InvokeType::Special, _) => "invokespecial",
            Invoke(InvokeType::Static, _) => "invokestatic",
            Invoke(InvokeType::Interface(_), _) => "invokeinterface",
            InvokeDynamic(_) => "invokedynamic",
            New(_) => "new",
            NewArray(_) => "newarray",
            ANewArray(_) => "anewarray",
            ArrayLength => "arraylength",
            AThrow => "athrow",
            CheckCast(_) => "checkcast",
            InstanceOf(_) => "instanceof",
            MonitorEnter => "monitorenter",
            MonitorExit => "monitorexit",
            MultiANewArray(_, _) => "multianewarray",
            IfNull(EqComparison::EQ, _) => "ifnull",
            IfNull(EqComparison::NE, _) => "ifnonnull",
        }
    }
}

/// Classes are written as plain binary names, arrays as descriptors
pub fn render_class_operand(ref_type: &RefType<BinaryName>) -> String {
    match ref_type {
        RefType::Object(name) => name.to_string(),
        other => other.render(),
    }
}

fn base_type_keyword(base_type: BaseType) -> &'static str {
    match base_type {
        BaseType::Boolean => "boolean",
        BaseType::Byte => "byte",
        BaseType::Char => "char",
        BaseType::Short => "short",
        BaseType::Int => "int",
        BaseType::Long => "long",
        BaseType::Float => "float",
        BaseType::Double => "double",
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor.render())
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.class, self.name, self.descriptor.render())
    }
}

impl fmt::Display for ConstantData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantData::Integer(i) => write!(f, "int {}", i),
            ConstantData::Float(x) => write!(f, "float {:?}", x),
            ConstantData::Long(l) => write!(f, "long {}", l),
            ConstantData::Double(d) => write!(f, "double {:?}", d),
            ConstantData::String(s) => write!(f, "string {:?}", s),
            ConstantData::Class(class) => write!(f, "class {}", render_class_operand(class)),
            ConstantData::MethodType(desc) => write!(f, "methodtype {}", desc.render()),
            ConstantData::MethodHandle(method) => write!(f, "methodhandle {}", method),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        f.write_str(self.mnemonic())?;
        match self {
            BiPush(b) => write!(f, " {}", b),
            SiPush(s) => write!(f, " {}", s),
            Ldc(constant) | Ldc2(constant) => write!(f, " {}", constant),
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) | IStore(idx)
            | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) | Ret(idx) => {
                write!(f, " {}", idx)
            }
            IInc(idx, by) => write!(f, " {} {}", idx, by),
            If(_, target) | IfICmp(_, target) | IfACmp(_, target) | IfNull(_, target)
            | Goto(target) | Jsr(target) => write!(f, " {}", target),
            TableSwitch {
                default,
                low,
                targets,
            } => {
                write!(f, " {}", low)?;
                for target in targets {
                    write!(f, " {}", target)?;
                }
                write!(f, " default {}", default)
            }
            LookupSwitch { default, targets } => {
                for (key, target) in targets {
                    write!(f, " {}:{}", key, target)?;
                }
                write!(f, " default {}", default)
            }
            GetStatic(field) | PutStatic(field) | GetField(field) | PutField(field) => {
                write!(f, " {}", field)
            }
            Invoke(InvokeType::Interface(count), method) => write!(f, " {} {}", method, count),
            Invoke(_, method) => write!(f, " {}", method),
            InvokeDynamic(indy) => write!(f, " {}{}", indy.name, indy.descriptor.render()),
            New(class) => write!(f, " {}", class),
            NewArray(base_type) => write!(f, " {}", base_type_keyword(*base_type)),
            ANewArray(class) | CheckCast(class) | InstanceOf(class) => {
                write!(f, " {}", render_class_operand(class))
            }
            MultiANewArray(class, dimensions) => {
                write!(f, " {} {}", render_class_operand(class), dimensions)
            }
            _ => Ok(()),
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because it doesn't refer to a method on a class.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ParseDescriptor;

    fn method(class: BinaryName, name: UnqualifiedName, descriptor: &str) -> MethodRef {
        MethodRef {
            class,
            name,
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
        }
    }

    #[test]
    fn stack_effects_of_invokes() {
        let value_of = method(BinaryName::INTEGER, UnqualifiedName::VALUEOF, "(I)Ljava/lang/Integer;");
        let insn = Instruction::Invoke(InvokeType::Static, value_of);
        assert_eq!(insn.consume_stack(), 1);
        assert_eq!(insn.produce_stack(), 1);

        let init = method(BinaryName::OBJECT, UnqualifiedName::INIT, "(JD)V");
        let insn = Instruction::Invoke(InvokeType::Special, init);
        assert_eq!(insn.consume_stack(), 5);
        assert_eq!(insn.produce_stack(), 0);
    }

    #[test]
    fn stack_effects_of_fields() {
        let field = FieldRef {
            class: BinaryName::INTEGER,
            name: UnqualifiedName::MAXVALUE,
            descriptor: FieldType::long(),
        };
        assert_eq!(Instruction::GetStatic(field.clone()).produce_stack(), 2);
        assert_eq!(Instruction::PutField(field.clone()).consume_stack(), 3);
        assert_eq!(Instruction::GetField(field).consume_stack(), 1);
    }

    #[test]
    fn control_flow_shape() {
        let switch = Instruction::LookupSwitch {
            default: InsnIndex(7),
            targets: vec![(1, InsnIndex(3)), (10, InsnIndex(5))],
        };
        assert_eq!(
            switch.jump_targets(),
            vec![InsnIndex(7), InsnIndex(3), InsnIndex(5)]
        );
        assert!(!switch.falls_through());

        assert!(Instruction::Jsr(InsnIndex(4)).falls_through());
        assert!(!Instruction::Ret(1).falls_through());
        assert!(Instruction::If(OrdComparison::EQ, InsnIndex(0)).falls_through());
        assert!(Instruction::AReturn.is_return());
        assert!(!Instruction::AThrow.is_return());
    }

    #[test]
    fn display_as_assembly() {
        assert_eq!(Instruction::IInc(3, -1).to_string(), "iinc 3 -1");
        assert_eq!(
            Instruction::IfICmp(OrdComparison::LT, InsnIndex(2)).to_string(),
            "if_icmplt #2"
        );
        assert_eq!(
            Instruction::ANewArray(RefType::parse("[I").unwrap()).to_string(),
            "anewarray [I"
        );
        assert_eq!(
            Instruction::Ldc(ConstantData::String("hi".to_owned())).to_string(),
            "ldc string \"hi\""
        );
        assert_eq!(Instruction::LSh(ShiftType::LogicalRight).to_string(), "lushr");
    }
}
