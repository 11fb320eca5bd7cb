//! Text format for declaring classes along with the code of their methods
//!
//! The format is line oriented and loosely follows Jasmin. Here is a class with one method:
//!
//! ```text
//! .class public me/alec/Counter
//! .super java/lang/Object
//! .field private count I
//!
//! .method public next ()I
//!     .limit stack 3
//!     aload 0
//!     dup
//!     getfield me/alec/Counter.count I
//!     iconst_1
//!     iadd
//!     putfield me/alec/Counter.count I
//!     aload 0
//!     getfield me/alec/Counter.count I
//!     ireturn
//! .end method
//! ```
//!
//! Directives are:
//!
//!   - `.class [flags] name` starts a new class (`.class interface name` for an interface)
//!   - `.super name` and `.implements name` declare its super types (the default superclass is
//!     `java/lang/Object`)
//!   - `.status verified|pending|rejected` sets how far verification of the class got
//!   - `.field [flags] name descriptor`
//!   - `.method [flags] name descriptor` starts a method, which lasts until `.end method`
//!   - `.limit stack N` and `.limit locals N` (by default, there are just enough locals for the
//!     arguments and the stack is empty)
//!   - `.catch class|all from Start to End using Handler` adds an exception handler
//!
//! Inside a method, every line holds one instruction, optionally preceded by a `Label:`. A `;` at
//! the start of a line or after whitespace starts a comment. Operands are written like this:
//!
//!   - branch targets are labels (or `#n` for the instruction at index `n`)
//!   - fields are `Class.name descriptor`, methods are `Class.name(args)ret`
//!   - classes are binary names, arrays are descriptors (`[I`, `[Ljava/lang/String;`)
//!   - constants are typed: `ldc int 1`, `ldc string "hi"`, `ldc class java/lang/String`,
//!     `ldc2_w double 1.5`, `ldc methodtype (I)V`, `ldc methodhandle Class.name(desc)ret`
//!   - `tableswitch low L1 L2 ... default L`, `lookupswitch k1:L1 k2:L2 ... default L`
//!   - `invokeinterface Class.name(desc)ret count` (the count can be left out)
//!
//! The short forms of local variable instructions (`iload_0`, `astore_3`, ...) and the wide
//! forms of jumps and constant loads (`goto_w`, `jsr_w`, `ldc_w`) are accepted too.

use super::class_graph::{ClassData, ClassGraph, ClassId, ClassStatus, FieldData, MethodData};
use super::code::{
    Code, CompareMode, ConstantData, EqComparison, ExceptionHandler, FieldRef, InsnIndex,
    Instruction, InvokeDynamicRef, InvokeType, MethodRef, OrdComparison, ShiftType,
};
use super::model::Method;
use super::{
    AccessKeyword, BaseType, BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, RefType, UnqualifiedName,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Parse classes out of assembly, add them to the class graph, and return all of their methods
/// (in the order they were declared)
///
/// Classes can be declared in any order: each class is added to the class graph once all of its
/// super types are there.
pub fn parse_assembly<'g>(
    source: &str,
    class_graph: &ClassGraph<'g>,
) -> Result<Vec<Method<'g>>, Error> {
    let classes = parse_declarations(source)?;
    let class_ids = add_classes(&classes, class_graph)?;

    let mut methods = vec![];
    for (class, class_id) in classes.into_iter().zip(class_ids) {
        for field in class.fields {
            class_graph.add_field(FieldData {
                class: class_id,
                name: field.name,
                descriptor: field.descriptor,
                access_flags: field.access_flags,
            });
        }
        for method in class.methods {
            let id = class_graph.add_method(MethodData {
                class: class_id,
                name: method.name,
                descriptor: method.descriptor,
                access_flags: method.access_flags,
            });
            log::trace!("Assembled {}.{}", class_id.name, id.name);
            methods.push(Method {
                id,
                code_impl: method.code,
            });
        }
    }

    Ok(methods)
}

struct ClassDecl {
    name: BinaryName,
    access_flags: ClassAccessFlags,
    superclass: Option<BinaryName>,
    interfaces: Vec<BinaryName>,
    status: ClassStatus,
    fields: Vec<FieldDecl>,
    methods: Vec<MethodDecl>,
}

struct FieldDecl {
    name: UnqualifiedName,
    descriptor: FieldType<BinaryName>,
    access_flags: FieldAccessFlags,
}

struct MethodDecl {
    name: UnqualifiedName,
    descriptor: MethodDescriptor<BinaryName>,
    access_flags: MethodAccessFlags,
    code: Option<Code>,
}

/// Method whose `.end method` hasn't been seen yet
struct OpenMethod {
    name: UnqualifiedName,
    descriptor: MethodDescriptor<BinaryName>,
    access_flags: MethodAccessFlags,
    max_stack: Option<u16>,
    max_locals: Option<u16>,

    /// Instructions, with their line, still unparsed since they may refer to later labels
    instructions: Vec<(usize, Vec<String>)>,
    labels: HashMap<String, InsnIndex>,
    catches: Vec<(usize, Vec<String>)>,
}

fn parse_error<T>(line: usize, message: impl Into<String>) -> Result<T, Error> {
    Err(Error::Parse {
        line,
        message: message.into(),
    })
}

fn parse_declarations(source: &str) -> Result<Vec<ClassDecl>, Error> {
    let mut classes: Vec<ClassDecl> = vec![];
    let mut open_method: Option<OpenMethod> = None;

    for (line_idx, raw_line) in source.lines().enumerate() {
        let line = line_idx + 1;
        let mut tokens = tokenize(raw_line).or_else(|msg| parse_error(line, msg))?;
        if tokens.is_empty() {
            continue;
        }

        if let Some(method) = &mut open_method {
            match tokens[0].as_str() {
                ".end" => {
                    if tokens.len() != 2 || tokens[1] != "method" {
                        return parse_error(line, "Expected `.end method`");
                    }
                    if let Some(method) = open_method.take() {
                        let method = assemble_method(method)?;
                        match classes.last_mut() {
                            Some(class) => class.methods.push(method),
                            None => return parse_error(line, "Method outside of a class"),
                        }
                    }
                }
                ".limit" => {
                    let limit = match tokens.get(2).map(|n| n.parse::<u16>()) {
                        Some(Ok(limit)) if tokens.len() == 3 => limit,
                        _ => return parse_error(line, "Expected `.limit stack|locals N`"),
                    };
                    match tokens[1].as_str() {
                        "stack" => method.max_stack = Some(limit),
                        "locals" => method.max_locals = Some(limit),
                        other => return parse_error(line, format!("Unknown limit '{}'", other)),
                    }
                }
                ".catch" => method.catches.push((line, tokens)),
                directive if directive.starts_with('.') => {
                    return parse_error(
                        line,
                        format!("Directive '{}' is not allowed inside a method", directive),
                    )
                }
                _ => {
                    // Leading label definitions
                    while is_label_definition(&tokens[0]) {
                        let label = tokens.remove(0);
                        let label = label.trim_end_matches(':').to_owned();
                        let index = InsnIndex(method.instructions.len());
                        if method.labels.insert(label.clone(), index).is_some() {
                            return parse_error(line, format!("Label '{}' is defined twice", label));
                        }
                        if tokens.is_empty() {
                            break;
                        }
                    }
                    if !tokens.is_empty() {
                        method.instructions.push((line, tokens));
                    }
                }
            }
            continue;
        }

        let directive = tokens[0].as_str();
        if directive == ".class" {
            let (access_flags, name) = parse_flags_and_names::<ClassAccessFlags>(line, &tokens[1..], 1)?;
            classes.push(ClassDecl {
                name: binary_name(line, &name[0])?,
                access_flags,
                superclass: None,
                interfaces: vec![],
                status: ClassStatus::Verified,
                fields: vec![],
                methods: vec![],
            });
            continue;
        }

        let class = match classes.last_mut() {
            Some(class) => class,
            None => return parse_error(line, format!("Expected `.class` before '{}'", directive)),
        };
        match directive {
            ".super" | ".implements" => {
                if tokens.len() != 2 {
                    return parse_error(line, format!("Expected `{} name`", directive));
                }
                let super_type = binary_name(line, &tokens[1])?;
                if directive == ".super" {
                    if class.superclass.is_some() {
                        return parse_error(line, "Superclass is declared twice");
                    }
                    class.superclass = Some(super_type);
                } else {
                    class.interfaces.push(super_type);
                }
            }
            ".status" => {
                class.status = match tokens.get(1).map(String::as_str) {
                    Some("verified") if tokens.len() == 2 => ClassStatus::Verified,
                    Some("pending") if tokens.len() == 2 => ClassStatus::Pending,
                    Some("rejected") if tokens.len() == 2 => ClassStatus::Rejected,
                    _ => return parse_error(line, "Expected `.status verified|pending|rejected`"),
                };
            }
            ".field" => {
                let (access_flags, parts) = parse_flags_and_names::<FieldAccessFlags>(line, &tokens[1..], 2)?;
                class.fields.push(FieldDecl {
                    name: unqualified_name(line, &parts[0])?,
                    descriptor: descriptor(&parts[1])?,
                    access_flags,
                });
            }
            ".method" => {
                let (access_flags, parts) = parse_flags_and_names::<MethodAccessFlags>(line, &tokens[1..], 2)?;
                open_method = Some(OpenMethod {
                    name: unqualified_name(line, &parts[0])?,
                    descriptor: descriptor(&parts[1])?,
                    access_flags,
                    max_stack: None,
                    max_locals: None,
                    instructions: vec![],
                    labels: HashMap::new(),
                    catches: vec![],
                });
            }
            other => {
                return parse_error(
                    line,
                    format!("Unexpected '{}' outside of a method", other),
                )
            }
        }
    }

    if let Some(method) = open_method {
        return parse_error(
            source.lines().count(),
            format!("Method '{}' is missing its `.end method`", method.name),
        );
    }
    Ok(classes)
}

/// Split a line into tokens, dropping comments and unquoting string literals
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        match chars.peek() {
            None | Some(';') => break,
            Some('"') => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        None => return Err("Unterminated string literal".to_owned()),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some('"') => literal.push('"'),
                            Some('\\') => literal.push('\\'),
                            other => {
                                return Err(format!("Invalid escape sequence '\\{}'", other.unwrap_or(' ')))
                            }
                        },
                        Some(c) => literal.push(c),
                    }
                }
                tokens.push(literal);
            }
            Some(_) => {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn is_label_definition(token: &str) -> bool {
    token.len() > 1
        && token.ends_with(':')
        && !token.starts_with(|c: char| c.is_ascii_digit() || c == '-')
}

/// Leading access flag keywords followed by exactly `name_count` other tokens
fn parse_flags_and_names<F>(
    line: usize,
    tokens: &[String],
    name_count: usize,
) -> Result<(F, Vec<String>), Error>
where
    F: AccessKeyword,
{
    if tokens.len() < name_count {
        return parse_error(line, "Missing name or descriptor");
    }
    let (keywords, names) = tokens.split_at(tokens.len() - name_count);
    let mut flags = F::none();
    for keyword in keywords {
        match F::from_keyword(keyword) {
            Some(flag) => flags |= flag,
            None => return parse_error(line, format!("Unknown access flag '{}'", keyword)),
        }
    }
    Ok((flags, names.to_vec()))
}

fn binary_name(line: usize, name: &str) -> Result<BinaryName, Error> {
    BinaryName::from_string(name.to_owned())
        .map_err(|msg| Error::MalformedName(format!("line {}: {}", line, msg)))
}

fn unqualified_name(line: usize, name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name.to_owned())
        .map_err(|msg| Error::MalformedName(format!("line {}: {}", line, msg)))
}

fn descriptor<D: ParseDescriptor>(source: &str) -> Result<D, Error> {
    D::parse(source).map_err(|err| Error::MalformedDescriptor(source.to_owned(), err))
}

fn assemble_method(method: OpenMethod) -> Result<MethodDecl, Error> {
    let has_code = !method.instructions.is_empty()
        || !method.catches.is_empty()
        || method.max_stack.is_some()
        || method.max_locals.is_some();

    let code = if has_code {
        let mut instructions = vec![];
        for (line, tokens) in &method.instructions {
            let operands = Operands {
                line: *line,
                tokens: &tokens[1..],
                labels: &method.labels,
            };
            instructions.push(parse_instruction(&tokens[0], &operands)?);
        }

        let mut exception_table = vec![];
        for (line, tokens) in &method.catches {
            exception_table.push(parse_catch(*line, tokens, &method.labels)?);
        }

        let is_static = method.access_flags.contains(MethodAccessFlags::STATIC);
        let argument_slots = method.descriptor.parameter_length(!is_static) as u16;
        Some(Code {
            max_stack: method.max_stack.unwrap_or(0),
            max_locals: method.max_locals.unwrap_or(argument_slots),
            instructions,
            exception_table,
        })
    } else {
        None
    };

    Ok(MethodDecl {
        name: method.name,
        descriptor: method.descriptor,
        access_flags: method.access_flags,
        code,
    })
}

/// `.catch class|all from Start to End using Handler`
fn parse_catch(
    line: usize,
    tokens: &[String],
    labels: &HashMap<String, InsnIndex>,
) -> Result<ExceptionHandler, Error> {
    let shape: Vec<&str> = tokens.iter().map(String::as_str).collect();
    match shape.as_slice() {
        [".catch", class, "from", _, "to", _, "using", _] => {
            let operands = Operands {
                line,
                tokens: &tokens[1..],
                labels,
            };
            let catch_type = match *class {
                "all" => None,
                class => Some(binary_name(line, class)?),
            };
            Ok(ExceptionHandler {
                start: operands.label(2)?,
                end: operands.label(4)?,
                handler: operands.label(6)?,
                catch_type,
            })
        }
        _ => parse_error(line, "Expected `.catch class|all from Start to End using Handler`"),
    }
}

/// Operands of one instruction, along with what is needed to interpret them
struct Operands<'a> {
    line: usize,
    tokens: &'a [String],
    labels: &'a HashMap<String, InsnIndex>,
}

impl<'a> Operands<'a> {
    fn error<T>(&self, message: impl Into<String>) -> Result<T, Error> {
        parse_error(self.line, message)
    }

    fn count(&self, expected: usize) -> Result<(), Error> {
        if self.tokens.len() != expected {
            return self.error(format!(
                "Expected {} operand(s), but found {}",
                expected,
                self.tokens.len()
            ));
        }
        Ok(())
    }

    fn token(&self, idx: usize) -> Result<&'a str, Error> {
        match self.tokens.get(idx) {
            Some(token) => Ok(token),
            None => self.error(format!("Missing operand {}", idx + 1)),
        }
    }

    fn number<N: FromStr>(&self, idx: usize) -> Result<N, Error> {
        let token = self.token(idx)?;
        token
            .parse()
            .or_else(|_| self.error(format!("Invalid number '{}'", token)))
    }

    fn label(&self, idx: usize) -> Result<InsnIndex, Error> {
        self.resolve_label(self.token(idx)?)
    }

    fn resolve_label(&self, label: &str) -> Result<InsnIndex, Error> {
        if let Some(index) = label.strip_prefix('#') {
            return match index.parse() {
                Ok(index) => Ok(InsnIndex(index)),
                Err(_) => self.error(format!("Invalid instruction index '{}'", label)),
            };
        }
        match self.labels.get(label) {
            Some(index) => Ok(*index),
            None => self.error(format!("Undefined label '{}'", label)),
        }
    }

    /// Class name, or array descriptor
    fn class(&self, idx: usize) -> Result<RefType<BinaryName>, Error> {
        let token = self.token(idx)?;
        if token.starts_with('[') {
            descriptor(token)
        } else {
            Ok(RefType::Object(binary_name(self.line, token)?))
        }
    }

    /// `Class.name descriptor`
    fn field(&self, idx: usize) -> Result<FieldRef, Error> {
        let (class, name) = self.member(self.token(idx)?)?;
        Ok(FieldRef {
            class,
            name,
            descriptor: descriptor(self.token(idx + 1)?)?,
        })
    }

    /// `Class.name(args)ret`
    fn method(&self, idx: usize) -> Result<MethodRef, Error> {
        let token = self.token(idx)?;
        let paren = match token.find('(') {
            Some(paren) => paren,
            None => return self.error(format!("Expected a method descriptor in '{}'", token)),
        };
        let (class, name) = self.member(&token[..paren])?;
        Ok(MethodRef {
            class,
            name,
            descriptor: descriptor(&token[paren..])?,
        })
    }

    fn member(&self, qualified: &str) -> Result<(BinaryName, UnqualifiedName), Error> {
        match qualified.rsplit_once('.') {
            Some((class, name)) => Ok((
                binary_name(self.line, class)?,
                unqualified_name(self.line, name)?,
            )),
            None => self.error(format!("Expected 'Class.member' but found '{}'", qualified)),
        }
    }

    fn constant(&self) -> Result<ConstantData, Error> {
        self.count(2)?;
        let constant = match self.token(0)? {
            "int" => ConstantData::Integer(self.number(1)?),
            "float" => ConstantData::Float(self.number(1)?),
            "long" => ConstantData::Long(self.number(1)?),
            "double" => ConstantData::Double(self.number(1)?),
            "string" => ConstantData::String(self.token(1)?.to_owned()),
            "class" => ConstantData::Class(self.class(1)?),
            "methodtype" => ConstantData::MethodType(descriptor(self.token(1)?)?),
            "methodhandle" => ConstantData::MethodHandle(self.method(1)?),
            other => return self.error(format!("Unknown constant type '{}'", other)),
        };
        Ok(constant)
    }
}

/// Instructions that have no operands
fn simple_instructions() -> Vec<Instruction> {
    use Instruction::*;
    vec![
        Nop, AConstNull, IConstM1, IConst0, IConst1, IConst2, IConst3, IConst4, IConst5, LConst0,
        LConst1, FConst0, FConst1, FConst2, DConst0, DConst1, IALoad, LALoad, FALoad, DALoad,
        AALoad, BALoad, CALoad, SALoad, IAStore, LAStore, FAStore, DAStore, AAStore, BAStore,
        CAStore, SAStore, Pop, Pop2, Dup, DupX1, DupX2, Dup2, Dup2X1, Dup2X2, Swap, IAdd, LAdd,
        FAdd, DAdd, ISub, LSub, FSub, DSub, IMul, LMul, FMul, DMul, IDiv, LDiv, FDiv, DDiv, IRem,
        LRem, FRem, DRem, INeg, LNeg, FNeg, DNeg, ISh(ShiftType::Left),
        ISh(ShiftType::ArithmeticRight), ISh(ShiftType::LogicalRight), LSh(ShiftType::Left),
        LSh(ShiftType::ArithmeticRight), LSh(ShiftType::LogicalRight), IAnd, LAnd, IOr, LOr,
        IXor, LXor, I2L, I2F, I2D, L2I, L2F, L2D, F2I, F2L, F2D, D2I, D2L, D2F, I2B, I2C, I2S,
        LCmp, FCmp(CompareMode::L), FCmp(CompareMode::G), DCmp(CompareMode::L),
        DCmp(CompareMode::G), IReturn, LReturn, FReturn, DReturn, AReturn, Return, ArrayLength,
        AThrow, MonitorEnter, MonitorExit,
    ]
}

/// Fold short and wide forms into the general form of an instruction
///
/// Returns the mnemonic to use, along with the local variable index implied by the short form.
fn normalize_mnemonic(mnemonic: &str) -> (&str, Option<u16>) {
    match mnemonic {
        "goto_w" => return ("goto", None),
        "jsr_w" => return ("jsr", None),
        "ldc_w" => return ("ldc", None),
        _ => (),
    }
    if let Some((base, local)) = mnemonic.rsplit_once('_') {
        let is_local_insn = matches!(
            base,
            "iload" | "lload" | "fload" | "dload" | "aload" | "istore" | "lstore" | "fstore"
                | "dstore" | "astore"
        );
        if let (true, Ok(local @ 0..=3)) = (is_local_insn, local.parse::<u16>()) {
            return (base, Some(local));
        }
    }
    (mnemonic, None)
}

fn parse_instruction(mnemonic: &str, ops: &Operands) -> Result<Instruction, Error> {
    use Instruction::*;

    if let Some(insn) = simple_instructions()
        .into_iter()
        .find(|insn| insn.mnemonic() == mnemonic)
    {
        ops.count(0)?;
        return Ok(insn);
    }

    let (mnemonic, implied_local) = normalize_mnemonic(mnemonic);
    let local = || -> Result<u16, Error> {
        match implied_local {
            Some(local) => {
                ops.count(0)?;
                Ok(local)
            }
            None => {
                ops.count(1)?;
                ops.number(0)
            }
        }
    };
    let jump = || -> Result<InsnIndex, Error> {
        ops.count(1)?;
        ops.label(0)
    };

    let insn = match mnemonic {
        "bipush" => {
            ops.count(1)?;
            BiPush(ops.number(0)?)
        }
        "sipush" => {
            ops.count(1)?;
            SiPush(ops.number(0)?)
        }
        "ldc" => Ldc(ops.constant()?),
        "ldc2_w" => Ldc2(ops.constant()?),

        "iload" => ILoad(local()?),
        "lload" => LLoad(local()?),
        "fload" => FLoad(local()?),
        "dload" => DLoad(local()?),
        "aload" => ALoad(local()?),
        "istore" => IStore(local()?),
        "lstore" => LStore(local()?),
        "fstore" => FStore(local()?),
        "dstore" => DStore(local()?),
        "astore" => AStore(local()?),
        "ret" => Ret(local()?),
        "iinc" => {
            ops.count(2)?;
            IInc(ops.number(0)?, ops.number(1)?)
        }

        "ifeq" => If(OrdComparison::EQ, jump()?),
        "ifne" => If(OrdComparison::NE, jump()?),
        "iflt" => If(OrdComparison::LT, jump()?),
        "ifge" => If(OrdComparison::GE, jump()?),
        "ifgt" => If(OrdComparison::GT, jump()?),
        "ifle" => If(OrdComparison::LE, jump()?),
        "if_icmpeq" => IfICmp(OrdComparison::EQ, jump()?),
        "if_icmpne" => IfICmp(OrdComparison::NE, jump()?),
        "if_icmplt" => IfICmp(OrdComparison::LT, jump()?),
        "if_icmpge" => IfICmp(OrdComparison::GE, jump()?),
        "if_icmpgt" => IfICmp(OrdComparison::GT, jump()?),
        "if_icmple" => IfICmp(OrdComparison::LE, jump()?),
        "if_acmpeq" => IfACmp(EqComparison::EQ, jump()?),
        "if_acmpne" => IfACmp(EqComparison::NE, jump()?),
        "ifnull" => IfNull(EqComparison::EQ, jump()?),
        "ifnonnull" => IfNull(EqComparison::NE, jump()?),
        "goto" => Goto(jump()?),
        "jsr" => Jsr(jump()?),

        "tableswitch" => {
            let (cases, default) = switch_cases(ops)?;
            if cases.is_empty() {
                return ops.error("Expected `tableswitch low L1 L2 ... default L`");
            }
            let low = ops.number(0)?;
            let targets = cases[1..]
                .iter()
                .map(|label| ops.resolve_label(label))
                .collect::<Result<Vec<_>, _>>()?;
            TableSwitch {
                default,
                low,
                targets,
            }
        }
        "lookupswitch" => {
            let (cases, default) = switch_cases(ops)?;
            let mut targets = vec![];
            for case in cases {
                let (key, label) = match case.split_once(':') {
                    Some(case) => case,
                    None => return ops.error(format!("Expected 'key:Label' but found '{}'", case)),
                };
                let key = key
                    .parse::<i32>()
                    .or_else(|_| ops.error(format!("Invalid number '{}'", key)))?;
                targets.push((key, ops.resolve_label(label)?));
            }
            LookupSwitch { default, targets }
        }

        "getstatic" | "putstatic" | "getfield" | "putfield" => {
            ops.count(2)?;
            let field = ops.field(0)?;
            match mnemonic {
                "getstatic" => GetStatic(field),
                "putstatic" => PutStatic(field),
                "getfield" => GetField(field),
                _ => PutField(field),
            }
        }
        "invokevirtual" | "invokespecial" | "invokestatic" => {
            ops.count(1)?;
            let invoke_type = match mnemonic {
                "invokevirtual" => InvokeType::Virtual,
                "invokespecial" => InvokeType::Special,
                _ => InvokeType::Static,
            };
            Invoke(invoke_type, ops.method(0)?)
        }
        "invokeinterface" => {
            let method = ops.method(0)?;
            let count = match ops.tokens.len() {
                1 => method.descriptor.parameter_length(true) as u8,
                2 => ops.number(1)?,
                _ => return ops.error("Expected `invokeinterface Class.name(desc)ret [count]`"),
            };
            Invoke(InvokeType::Interface(count), method)
        }
        "invokedynamic" => {
            ops.count(1)?;
            let token = ops.token(0)?;
            let paren = match token.find('(') {
                Some(paren) => paren,
                None => return ops.error(format!("Expected 'name(args)ret' but found '{}'", token)),
            };
            InvokeDynamic(InvokeDynamicRef {
                name: unqualified_name(ops.line, &token[..paren])?,
                descriptor: descriptor(&token[paren..])?,
            })
        }

        "new" => {
            ops.count(1)?;
            New(binary_name(ops.line, ops.token(0)?)?)
        }
        "newarray" => {
            ops.count(1)?;
            let base_type = match ops.token(0)? {
                "boolean" => BaseType::Boolean,
                "byte" => BaseType::Byte,
                "char" => BaseType::Char,
                "short" => BaseType::Short,
                "int" => BaseType::Int,
                "long" => BaseType::Long,
                "float" => BaseType::Float,
                "double" => BaseType::Double,
                other => return ops.error(format!("Unknown primitive type '{}'", other)),
            };
            NewArray(base_type)
        }
        "anewarray" | "checkcast" | "instanceof" => {
            ops.count(1)?;
            let class = ops.class(0)?;
            match mnemonic {
                "anewarray" => ANewArray(class),
                "checkcast" => CheckCast(class),
                _ => InstanceOf(class),
            }
        }
        "multianewarray" => {
            ops.count(2)?;
            MultiANewArray(ops.class(0)?, ops.number(1)?)
        }

        other => return ops.error(format!("Unknown instruction '{}'", other)),
    };
    Ok(insn)
}

/// Cases of a switch, up to `default`, and the default target
fn switch_cases<'a>(ops: &Operands<'a>) -> Result<(&'a [String], InsnIndex), Error> {
    let tokens = ops.tokens;
    match tokens.iter().position(|token| token == "default") {
        Some(pos) if pos + 2 == tokens.len() => {
            Ok((&tokens[..pos], ops.resolve_label(&tokens[pos + 1])?))
        }
        _ => ops.error("Expected the switch to end with `default Label`"),
    }
}

/// Add the classes to the class graph, super types first
///
/// The returned class ids are in the same order as the declarations.
fn add_classes<'g>(
    classes: &[ClassDecl],
    class_graph: &ClassGraph<'g>,
) -> Result<Vec<ClassId<'g>>, Error> {
    let mut declared = HashSet::new();
    for class in classes {
        if class_graph.lookup_class(&class.name).is_some() || !declared.insert(&class.name) {
            return Err(Error::DuplicateClass(class.name.clone()));
        }
    }

    let object = BinaryName::OBJECT;
    let mut class_ids: Vec<Option<ClassId<'g>>> = vec![None; classes.len()];
    let mut remaining = classes.len();
    while remaining > 0 {
        let mut progress = false;

        for (class, class_id) in classes.iter().zip(class_ids.iter_mut()) {
            if class_id.is_some() {
                continue;
            }
            let superclass_name = class.superclass.as_ref().unwrap_or(&object);
            let superclass = match class_graph.lookup_class(superclass_name) {
                Some(superclass) => superclass,
                None => continue,
            };
            let interfaces: Option<Vec<ClassId<'g>>> = class
                .interfaces
                .iter()
                .map(|interface| class_graph.lookup_class(interface))
                .collect();
            let interfaces = match interfaces {
                Some(interfaces) => interfaces,
                None => continue,
            };

            let data = ClassData::new(class.name.clone(), superclass, class.access_flags);
            for interface in interfaces {
                data.interfaces.push(interface.0);
            }
            data.status.set(class.status);
            log::trace!("Adding class {} to the class graph", class.name);
            *class_id = Some(class_graph.add_class(data));
            remaining -= 1;
            progress = true;
        }

        if !progress {
            return Err(blocked_class_error(classes, &class_ids, class_graph));
        }
    }

    Ok(class_ids.into_iter().flatten().collect())
}

/// Explain why none of the remaining classes can be added
fn blocked_class_error(
    classes: &[ClassDecl],
    class_ids: &[Option<ClassId>],
    class_graph: &ClassGraph,
) -> Error {
    let pending: Vec<&ClassDecl> = classes
        .iter()
        .zip(class_ids)
        .filter(|(_, id)| id.is_none())
        .map(|(class, _)| class)
        .collect();

    let object = BinaryName::OBJECT;
    for class in &pending {
        let superclass = class.superclass.as_ref().unwrap_or(&object);
        for super_type in std::iter::once(superclass).chain(&class.interfaces) {
            let is_pending = pending.iter().any(|other| &other.name == super_type);
            if class_graph.lookup_class(super_type).is_none() && !is_pending {
                return Error::MissingClass(super_type.clone());
            }
        }
    }

    // Every remaining class waits on another remaining class
    match pending.first() {
        Some(class) => Error::CyclicInheritance(class.name.clone()),
        None => Error::MissingClass(BinaryName::OBJECT),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraphArenas;

    fn parse_error_line(result: Result<Vec<Method>, Error>) -> usize {
        match result {
            Err(Error::Parse { line, .. }) => line,
            Err(other) => panic!("expected a parse error, got {}", other),
            Ok(_) => panic!("expected a parse error"),
        }
    }

    #[test]
    fn classes_fields_and_methods() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let methods = parse_assembly(
            r#"
            ; Subclass declared before its superclass
            .class public final me/alec/Square
            .super me/alec/Shape
            .implements java/lang/Comparable
            .status pending

            .method public <init> ()V
                aload_0
                invokespecial me/alec/Shape.<init>()V
                return
            .end method

            .class public abstract me/alec/Shape
            .field protected name Ljava/lang/String; ; the display name
            .field static count I

            .method public <init> ()V
                .limit stack 1
                aload 0
                invokespecial java/lang/Object.<init>()V
                return
            .end method

            .method public abstract area ()D
            .end method
            "#,
            &class_graph,
        )
        .unwrap();

        let names: Vec<String> = methods.iter().map(Method::qualified_name).collect();
        assert_eq!(
            names,
            vec![
                "me/alec/Square.<init>()V",
                "me/alec/Shape.<init>()V",
                "me/alec/Shape.area()D",
            ]
        );

        let square = class_graph
            .lookup_class(&BinaryName::from_string("me/alec/Square".to_owned()).unwrap())
            .unwrap();
        assert_eq!(square.status.get(), ClassStatus::Pending);
        assert_eq!(square.superclass.unwrap().name.as_str(), "me/alec/Shape");
        assert_eq!(square.interfaces.len(), 1);
        assert!(square.access_flags.contains(ClassAccessFlags::FINAL));

        let shape = square.superclass.unwrap();
        assert_eq!(shape.fields.len(), 2);
        assert!(shape.fields[1].is_static());

        // Default limits: enough locals for `this`, and an empty stack
        let code = methods[0].code_impl.as_ref().unwrap();
        assert_eq!((code.max_locals, code.max_stack), (1, 0));
        assert_eq!(code.instructions[0], Instruction::ALoad(0));
        assert!(methods[2].code_impl.is_none());
    }

    #[test]
    fn labels_and_operands() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let methods = parse_assembly(
            r#"
            .class me/alec/Test
            .method static test (I)Ljava/lang/Object;
                .limit stack 4
                .limit locals 3
            Start:
                iload 0
                tableswitch 1 One Two default Other
            One: ldc string "one; not a comment"
                areturn
            Two:
                iload_0
                lookupswitch -1:One 10:Other default Other
            Other:
                ldc2_w double 2.5
                dstore 1
                ldc class [Ljava/lang/String;
                checkcast [Ljava/lang/String;
                invokeinterface java/lang/CharSequence.length()I
                goto #2
            End:
                .catch java/lang/RuntimeException from Start to End using Other
            .end method
            "#,
            &class_graph,
        )
        .unwrap();

        let code = methods[0].code_impl.as_ref().unwrap();
        assert_eq!(
            code.instructions[1],
            Instruction::TableSwitch {
                default: InsnIndex(6),
                low: 1,
                targets: vec![InsnIndex(2), InsnIndex(4)],
            }
        );
        assert_eq!(
            code.instructions[2],
            Instruction::Ldc(ConstantData::String("one; not a comment".to_owned()))
        );
        assert_eq!(
            code.instructions[5],
            Instruction::LookupSwitch {
                default: InsnIndex(6),
                targets: vec![(-1, InsnIndex(2)), (10, InsnIndex(6))],
            }
        );
        assert_eq!(code.instructions[6], Instruction::Ldc2(ConstantData::Double(2.5)));
        assert_eq!(
            code.instructions[8],
            Instruction::Ldc(ConstantData::Class(RefType::parse("[Ljava/lang/String;").unwrap()))
        );
        assert!(matches!(
            code.instructions[10],
            Instruction::Invoke(InvokeType::Interface(1), _)
        ));
        assert_eq!(code.instructions[11], Instruction::Goto(InsnIndex(2)));
        assert_eq!(
            code.exception_table,
            vec![ExceptionHandler {
                start: InsnIndex(0),
                end: InsnIndex(12),
                handler: InsnIndex(6),
                catch_type: Some(BinaryName::RUNTIMEEXCEPTION),
            }]
        );

        // The text form of instructions parses back
        for insn in &code.instructions {
            let text = insn.to_string();
            let tokens = tokenize(&text).unwrap();
            let operands = Operands {
                line: 1,
                tokens: &tokens[1..],
                labels: &HashMap::new(),
            };
            assert_eq!(&parse_instruction(&tokens[0], &operands).unwrap(), insn, "{}", text);
        }
    }

    #[test]
    fn syntax_errors() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let source = ".class me/alec/A\n.method static f ()V\n  frobnicate\n.end method";
        assert_eq!(parse_error_line(parse_assembly(source, &class_graph)), 3);

        let source = ".class me/alec/B\n.method static f ()V\n  goto Nowhere\n.end method";
        assert_eq!(parse_error_line(parse_assembly(source, &class_graph)), 3);

        let source = ".class me/alec/C\n.method static f ()V\n  return";
        assert_eq!(parse_error_line(parse_assembly(source, &class_graph)), 3);

        let source = "iconst_0";
        assert_eq!(parse_error_line(parse_assembly(source, &class_graph)), 1);

        let source = ".class me/alec/D\n.method static f ()V\n  iload\n.end method";
        assert_eq!(parse_error_line(parse_assembly(source, &class_graph)), 3);

        let source = ".class me/alec/E\n.field shiny Q\n";
        assert!(matches!(
            parse_assembly(source, &class_graph),
            Err(Error::MalformedDescriptor(_, _))
        ));
    }

    #[test]
    fn class_graph_errors() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let result = parse_assembly(".class java/lang/String", &class_graph);
        assert!(matches!(result, Err(Error::DuplicateClass(_))));

        let result = parse_assembly(".class me/alec/A\n.super me/alec/Missing", &class_graph);
        match result {
            Err(Error::MissingClass(name)) => assert_eq!(name.as_str(), "me/alec/Missing"),
            _ => panic!("expected a missing class"),
        }

        let result = parse_assembly(
            ".class me/alec/X\n.super me/alec/Y\n.class me/alec/Y\n.super me/alec/X",
            &class_graph,
        );
        assert!(matches!(result, Err(Error::CyclicInheritance(_))));
    }
}
