use super::constraints::{self, Environment};
use super::{
    execution, AssertionViolated, ControlFlowGraph, Frame, NewSite, Rejection, Settings,
    UninitializedType, Verdict, VerificationStatus, VerificationType, VerifierError,
};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{Code, InsnIndex, Instruction};
use crate::jvm::model::Method;
use crate::jvm::BinaryName;
use crate::util::Width;
use std::collections::VecDeque;

/// Verify the body of a method
///
/// Static checks on the shape of the code run first, then the data-flow analysis which simulates
/// every instruction on the types of the locals and stack until the frames stop changing. The
/// method is rejected as soon as an instruction can't run in one of the frames reaching it.
///
/// Only inconsistencies in the verifier itself are returned as errors: problems in the code being
/// verified (or in the classes it refers to) end up in the verdict.
pub fn verify_method<'g>(
    class_graph: &ClassGraph<'g>,
    method: &Method<'g>,
    settings: &Settings,
) -> Result<Verdict, AssertionViolated> {
    log::debug!("Verifying {}", method.qualified_name());

    let mut warnings = vec![];
    let status = match verify_code(class_graph, method, settings, &mut warnings) {
        Ok(()) => VerificationStatus::Ok,
        Err(VerifierError::Violation(violation)) => {
            VerificationStatus::Rejected(Rejection::Verification(violation))
        }
        Err(VerifierError::Resolution(err)) => {
            VerificationStatus::Rejected(Rejection::Resolution(err))
        }
        Err(VerifierError::NotYet(class)) => VerificationStatus::NotYet(class),
        Err(VerifierError::Assertion(err)) => return Err(err),
    };

    log::debug!("Verification of {} {}", method.qualified_name(), status);
    Ok(Verdict { status, warnings })
}

fn verify_code<'g>(
    class_graph: &ClassGraph<'g>,
    method: &Method<'g>,
    settings: &Settings,
    warnings: &mut Vec<String>,
) -> Result<(), VerifierError> {
    let code = match (&method.code_impl, method.id.is_abstract_or_native()) {
        (None, true) => return Ok(()),
        (Some(_), true) => {
            return Err(VerifierError::violation(
                "Abstract and native methods must not have code.",
            ))
        }
        (None, false) => {
            return Err(VerifierError::violation(
                "Methods that are neither abstract nor native must have code.",
            ))
        }
        (Some(code), false) => code,
    };

    let env = Environment {
        class_graph,
        method: method.id,
    };
    check_static_structure(&env, code)?;

    let mut cfg = ControlFlowGraph::new(code)?;
    log::debug!(
        "Found {} subroutine(s)",
        cfg.subroutines().iter().filter(|sub| !sub.is_top_level()).count()
    );

    let contexts_run = run_to_fixed_point(&mut cfg, &env, initial_frame(&env, code)?)?;
    log::debug!("Reached a fixed point after running {} contexts", contexts_run);

    check_returns(&cfg, &env, settings, warnings)
}

/// Checks on the shape of the code that don't need any data-flow analysis
fn check_static_structure(env: &Environment, code: &Code) -> Result<(), VerifierError> {
    if code.is_empty() {
        return Err(VerifierError::violation("Code array must not be empty."));
    }

    for (index, insn) in code.iter() {
        for target in insn.jump_targets() {
            if target.0 >= code.len() {
                return Err(VerifierError::violation(format!(
                    "Branch target {} is outside of the code, which has only {} instructions.",
                    target,
                    code.len()
                ))
                .at(index, insn));
            }
        }

        if let Instruction::LookupSwitch { targets, .. } = insn {
            if targets.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
                return Err(VerifierError::violation(
                    "Table of lookupswitch keys is not sorted in strictly increasing order.",
                )
                .at(index, insn));
            }
        }

        if index.0 + 1 == code.len() && insn.falls_through() {
            return Err(VerifierError::violation(
                "Execution must not fall off the bottom of the code array.",
            )
            .at(index, insn));
        }
    }

    if !code.exception_table.is_empty() && code.max_stack == 0 {
        return Err(VerifierError::violation(
            "Exception handlers need at least one operand stack slot for the caught exception, \
            but max_stack is 0.",
        ));
    }

    for handler in &code.exception_table {
        if handler.start >= handler.end || handler.end.0 > code.len() {
            return Err(VerifierError::violation(format!(
                "Exception handler range [{}, {}) is not a valid range of instructions.",
                handler.start, handler.end
            )));
        }
        if handler.handler.0 >= code.len() {
            return Err(VerifierError::violation(format!(
                "Exception handler at {} is outside of the code, which has only {} instructions.",
                handler.handler,
                code.len()
            )));
        }
        if let Some(catch_type) = &handler.catch_type {
            if !env.class_graph.resolve(catch_type)?.is_throwable() {
                return Err(VerifierError::violation(format!(
                    "Catch type '{}' is not a subclass of '{}'.",
                    catch_type,
                    BinaryName::THROWABLE
                )));
            }
        }
    }

    let method = env.method;
    let argument_slots = method.descriptor.parameter_length(!method.is_static());
    if argument_slots > code.max_locals as usize {
        return Err(VerifierError::violation(format!(
            "Arguments of the method need {} local variable slots, but max_locals is only {}.",
            argument_slots, code.max_locals
        )));
    }

    Ok(())
}

/// Frame on entry to the method: arguments in the locals and an empty stack
fn initial_frame(env: &Environment, code: &Code) -> Result<Frame, VerifierError> {
    let method = env.method;
    let mut frame = Frame::new(code.max_locals as usize, code.max_stack as usize);
    let mut next_local = 0;

    if !method.is_static() {
        let class = method.class.name.clone();
        let receiver = if method.is_constructor() && class != BinaryName::OBJECT {
            let this = UninitializedType {
                class,
                site: NewSite::This,
            };
            frame.uninitialized_this = Some(this.clone());
            VerificationType::Uninitialized(this)
        } else {
            VerificationType::object(class)
        };
        frame.locals.set(next_local, receiver)?;
        next_local += 1;
    }

    for parameter in &method.descriptor.parameters {
        let typ = VerificationType::from(parameter.clone());
        let width = typ.width();
        frame.locals.set(next_local, typ)?;
        next_local += width;
    }

    Ok(frame)
}

/// Run the instruction at `index` with an incoming frame, checking it first
///
/// Returns whether the instruction had to be (re-)run, in which case its successors need to be
/// revisited.
fn run_instruction(
    cfg: &mut ControlFlowGraph,
    env: &Environment,
    index: InsnIndex,
    incoming: Frame,
    chain: &[InsnIndex],
) -> Result<bool, VerifierError> {
    let insn = cfg.instruction(index)?;
    cfg.context_mut(index)?
        .execute(env.class_graph, incoming, chain, |frame| {
            log::trace!("Running {}: {}", index, insn);
            constraints::check(insn, frame, env).map_err(|err| err.in_frame(frame))?;
            execution::execute(insn, index, frame)
        })
        .map_err(|err| err.at(index, insn).in_subroutines(chain))
}

/// Iterate through the code until no frame changes any more
///
/// Every worklist item is an instruction that just ran, along with the `jsr` instructions
/// still waiting for their `ret` at that point. Returns how many times an instruction ran.
fn run_to_fixed_point(
    cfg: &mut ControlFlowGraph,
    env: &Environment,
    initial: Frame,
) -> Result<usize, VerifierError> {
    let entry = InsnIndex(0);
    let mut worklist: VecDeque<(InsnIndex, Vec<InsnIndex>)> = VecDeque::new();
    let mut contexts_run = 0;

    if run_instruction(cfg, env, entry, initial, &[])? {
        contexts_run += 1;
        worklist.push_back((entry, vec![]));
    }

    while let Some((index, chain)) = worklist.pop_front() {
        let insn = cfg.instruction(index)?;
        let out_frame = cfg.context(index)?.out_frame(chain.last().copied())?.clone();

        let successors: Vec<(InsnIndex, Vec<InsnIndex>)> = match insn {
            Instruction::Jsr(target) => {
                let mut inner_chain = chain.clone();
                inner_chain.push(index);
                vec![(*target, inner_chain)]
            }
            Instruction::Ret(local) => {
                vec![return_from_subroutine(index, *local, &chain, &out_frame)?]
            }
            _ => cfg
                .successors(index)?
                .into_iter()
                .map(|successor| (successor, chain.clone()))
                .collect(),
        };
        for (successor, successor_chain) in successors {
            if run_instruction(cfg, env, successor, out_frame.clone(), &successor_chain)? {
                contexts_run += 1;
                worklist.push_back((successor, successor_chain));
            }
        }

        // Handlers are always entered from outside of any subroutine
        for handler in cfg.exception_handlers(index) {
            let handler_frame = out_frame.for_handler(handler.caught_class())?;
            if run_instruction(cfg, env, handler.handler, handler_frame, &[])? {
                contexts_run += 1;
                worklist.push_back((handler.handler, vec![]));
            }
        }
    }

    Ok(contexts_run)
}

/// Where a `ret` goes back to, along with the chain of pending `jsr` once it has returned
fn return_from_subroutine(
    index: InsnIndex,
    local: u16,
    chain: &[InsnIndex],
    out_frame: &Frame,
) -> Result<(InsnIndex, Vec<InsnIndex>), AssertionViolated> {
    let (jsr, outer_chain) = chain.split_last().ok_or_else(|| {
        AssertionViolated::new(format!(
            "The ret at {} was reached without any pending jsr",
            index
        ))
    })?;

    let return_to = match out_frame.locals.get(local as usize)? {
        VerificationType::ReturnAddress(target) => *target,
        other => {
            return Err(AssertionViolated::new(format!(
                "The ret at {} uses local {} which holds '{}' instead of a return address",
                index, local, other
            )))
        }
    };
    if return_to != jsr.next() {
        return Err(AssertionViolated::new(format!(
            "The ret at {} returns to {}, but the pending jsr at {} expects to return to {}",
            index,
            return_to,
            jsr,
            jsr.next()
        )));
    }

    Ok((return_to, outer_chain.to_vec()))
}

/// Once the frames are stable, look once more at every way the method can return
fn check_returns(
    cfg: &ControlFlowGraph,
    env: &Environment,
    settings: &Settings,
    warnings: &mut Vec<String>,
) -> Result<(), VerifierError> {
    for context in cfg.contexts() {
        let index = context.index();
        let insn = cfg.instruction(index)?;
        if !insn.is_return() {
            continue;
        }

        for (_, in_frame, _) in context.recorded_frames() {
            if settings.warn_uninitialized_on_return {
                for warning in uninitialized_on_return(index, insn, in_frame) {
                    if !warnings.contains(&warning) {
                        log::warn!("{}", warning);
                        warnings.push(warning);
                    }
                }
            }
            if settings.check_returned_type && *insn != Instruction::Return {
                check_returned_type(cfg, env, index, in_frame)
                    .map_err(|err| err.at(index, insn).in_frame(in_frame))?;
            }
        }
    }
    Ok(())
}

fn uninitialized_on_return(index: InsnIndex, insn: &Instruction, frame: &Frame) -> Vec<String> {
    let mut warnings = vec![];
    if frame.locals.iter().any(VerificationType::is_uninitialized) {
        warnings.push(format!(
            "{} at {} may leave the method with an uninitialized object in the local variables:\n{}",
            insn.mnemonic(),
            index,
            frame.locals
        ));
    }
    if frame.stack.iter().any(VerificationType::is_uninitialized) {
        warnings.push(format!(
            "{} at {} may leave the method with an uninitialized object on the operand stack:\n{}",
            insn.mnemonic(),
            index,
            frame.stack
        ));
    }
    warnings
}

/// Double-check the type of the returned value using the instruction that produced it
///
/// When the instruction right before the return is a method call, a local variable load or a
/// field read, its static type is compared against the declared return type. This catches
/// references that the frames only know as a merged superclass.
fn check_returned_type(
    cfg: &ControlFlowGraph,
    env: &Environment,
    index: InsnIndex,
    in_frame: &Frame,
) -> Result<(), VerifierError> {
    let declared = match env.return_type() {
        Some(declared) => VerificationType::from(declared.clone()),
        None => return Ok(()),
    };
    let previous = match index.0.checked_sub(1) {
        Some(previous) => cfg.instruction(InsnIndex(previous))?,
        None => return Ok(()),
    };

    let returned = match previous {
        Instruction::Invoke(_, method) => {
            match VerificationType::from_return_type(&method.descriptor.return_type) {
                Some(returned) => returned,
                None => return Ok(()),
            }
        }
        Instruction::InvokeDynamic(indy) => {
            match VerificationType::from_return_type(&indy.descriptor.return_type) {
                Some(returned) => returned,
                None => return Ok(()),
            }
        }
        Instruction::ILoad(local)
        | Instruction::LLoad(local)
        | Instruction::FLoad(local)
        | Instruction::DLoad(local)
        | Instruction::ALoad(local) => {
            // The load may be dead code which never got checked
            let local = *local as usize;
            if local >= in_frame.locals.max_locals() {
                return Ok(());
            }
            in_frame.locals.get(local)?.clone()
        }
        Instruction::GetField(field) => VerificationType::from(field.descriptor.clone()),
        _ => return Ok(()),
    };

    let compatible = match (&returned, &declared) {
        (VerificationType::Null, _) => true,
        (VerificationType::Object(returned), VerificationType::Object(declared)) => {
            env.is_assignable(returned, declared)?
        }
        (returned, declared) => returned == declared,
    };
    if !compatible {
        return Err(VerifierError::violation(format!(
            "Returned type {} does not match Method's return type {}",
            returned, declared
        )));
    }
    Ok(())
}
