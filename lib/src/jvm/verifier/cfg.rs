use super::{AssertionViolated, Frame, Subroutines, VerifierError};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{Code, ExceptionHandler, InsnIndex, Instruction};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Control flow graph of a method body, with one node per instruction
///
/// The graph also owns the frames computed for each instruction so far. Since the same
/// instruction inside a subroutine is run in the context of different `jsr` calls, frames are
/// recorded separately for each context, keyed by the most recent `jsr` still waiting for its
/// `ret` (or `None` for code that isn't running inside a subroutine).
pub struct ControlFlowGraph<'c> {
    code: &'c Code,
    subroutines: Subroutines,
    contexts: Vec<InstructionContext>,
}

/// Key under which frames are recorded: the innermost pending `jsr`
pub type ContextKey = Option<InsnIndex>;

impl<'c> ControlFlowGraph<'c> {
    /// Build the graph, discovering subroutines along the way
    pub fn new(code: &'c Code) -> Result<ControlFlowGraph<'c>, VerifierError> {
        let subroutines = Subroutines::new(code)?;
        let contexts = code
            .iter()
            .map(|(index, _)| InstructionContext::new(index))
            .collect();
        Ok(ControlFlowGraph {
            code,
            subroutines,
            contexts,
        })
    }

    pub fn subroutines(&self) -> &Subroutines {
        &self.subroutines
    }

    pub fn instruction(&self, index: InsnIndex) -> Result<&'c Instruction, AssertionViolated> {
        self.code.get(index).ok_or_else(|| {
            AssertionViolated::new(format!(
                "Instruction {} is outside of the {} instructions of the method",
                index,
                self.code.len()
            ))
        })
    }

    pub fn context(&self, index: InsnIndex) -> Result<&InstructionContext, AssertionViolated> {
        self.contexts.get(index.0).ok_or_else(|| {
            AssertionViolated::new(format!("No instruction context for {}", index))
        })
    }

    pub fn context_mut(
        &mut self,
        index: InsnIndex,
    ) -> Result<&mut InstructionContext, AssertionViolated> {
        self.contexts.get_mut(index.0).ok_or_else(|| {
            AssertionViolated::new(format!("No instruction context for {}", index))
        })
    }

    /// Every instruction context, in code order
    pub fn contexts(&self) -> impl Iterator<Item = &InstructionContext> {
        self.contexts.iter()
    }

    /// Instructions control can flow to normally (so not counting exception handlers)
    ///
    /// The successors of a `ret` are the instructions after every `jsr` that enters its
    /// subroutine.
    pub fn successors(&self, index: InsnIndex) -> Result<Vec<InsnIndex>, AssertionViolated> {
        let insn = self.instruction(index)?;
        let successors = match insn {
            Instruction::Ret(_) => {
                let subroutine = self.subroutines.subroutine_of(index).ok_or_else(|| {
                    AssertionViolated::new(format!(
                        "Asking for the successors of the ret at {}, which is dead code",
                        index
                    ))
                })?;
                subroutine
                    .entering_jsrs()
                    .iter()
                    .map(|jsr| jsr.next())
                    .collect()
            }
            Instruction::AThrow => vec![],
            _ if insn.is_return() => vec![],
            Instruction::Goto(target) | Instruction::Jsr(target) => vec![*target],
            _ => {
                let mut successors = insn.jump_targets();
                if insn.falls_through() {
                    successors.insert(0, index.next());
                }
                successors
            }
        };
        Ok(successors)
    }

    /// Exception handlers protecting an instruction, in order of priority
    pub fn exception_handlers(&self, index: InsnIndex) -> Vec<&'c ExceptionHandler> {
        self.code.handlers_covering(index).collect()
    }

    /// Dead code is code that isn't reachable from the top level or any subroutine
    pub fn is_dead(&self, index: InsnIndex) -> bool {
        self.subroutines.subroutine_of(index).is_none()
    }
}

/// An instruction along with the frames computed for it so far
#[derive(Debug)]
pub struct InstructionContext {
    index: InsnIndex,
    in_frames: HashMap<ContextKey, Frame>,
    out_frames: HashMap<ContextKey, Frame>,
}

impl InstructionContext {
    fn new(index: InsnIndex) -> InstructionContext {
        InstructionContext {
            index,
            in_frames: HashMap::new(),
            out_frames: HashMap::new(),
        }
    }

    pub fn index(&self) -> InsnIndex {
        self.index
    }

    /// Frame before the instruction runs in a given context
    pub fn in_frame(&self, key: ContextKey) -> Option<&Frame> {
        self.in_frames.get(&key)
    }

    /// Frame after the instruction ran in a given context
    pub fn out_frame(&self, key: ContextKey) -> Result<&Frame, AssertionViolated> {
        self.out_frames.get(&key).ok_or_else(|| {
            let key = match key {
                None => "the top level".to_owned(),
                Some(jsr) => format!("the jsr at {}", jsr),
            };
            AssertionViolated::new(format!(
                "No out frame recorded for {} in the context of {}",
                self.index, key
            ))
        })
    }

    /// Contexts this instruction has been run in, along with the frames before and after
    pub fn recorded_frames(&self) -> impl Iterator<Item = (ContextKey, &Frame, &Frame)> {
        self.out_frames.iter().filter_map(move |(key, out_frame)| {
            self.in_frames
                .get(key)
                .map(|in_frame| (*key, in_frame, out_frame))
        })
    }

    /// Merge an incoming frame into the recorded in frame, then run the instruction if that
    /// changed anything
    ///
    /// The key is the innermost pending `jsr` of `chain`. The first frame arriving for a key is
    /// taken as is. Later ones get merged in, and if the merge didn't change the recorded frame,
    /// there is nothing new to learn and `step` isn't run. Returns whether `step` was run (and so
    /// whether the successors need to be revisited).
    pub fn execute(
        &mut self,
        class_graph: &ClassGraph,
        incoming: Frame,
        chain: &[InsnIndex],
        step: impl FnOnce(&mut Frame) -> Result<(), VerifierError>,
    ) -> Result<bool, VerifierError> {
        let key = chain.last().copied();
        let mut working = match self.in_frames.entry(key) {
            Entry::Vacant(vacant) => vacant.insert(incoming).clone(),
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                if *existing == incoming {
                    return Ok(false);
                }
                let before = existing.clone();
                existing
                    .merge(class_graph, &incoming)
                    .map_err(|err| err.in_frame(&before).in_subroutines(chain))?;
                if *existing == before {
                    return Ok(false);
                }
                log::trace!("Merged a new frame into {}:\n{}", self.index, existing);
                existing.clone()
            }
        };

        step(&mut working)?;
        self.out_frames.insert(key, working);
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraphArenas;
    use crate::jvm::code::OrdComparison;
    use crate::jvm::verifier::VerificationType;
    use crate::jvm::BinaryName;
    use Instruction::*;

    fn code(instructions: Vec<Instruction>, exception_table: Vec<ExceptionHandler>) -> Code {
        Code {
            max_stack: 2,
            max_locals: 2,
            instructions,
            exception_table,
        }
    }

    #[test]
    fn successors() {
        let code = code(
            vec![
                IConst0,                             // 0
                If(OrdComparison::NE, InsnIndex(4)), // 1
                Jsr(InsnIndex(6)),                   // 2
                Goto(InsnIndex(5)),                  // 3
                Jsr(InsnIndex(6)),                   // 4
                Return,                              // 5
                AStore(1),                           // 6
                Ret(1),                              // 7
                AThrow,                              // 8
            ],
            vec![],
        );
        let cfg = ControlFlowGraph::new(&code).unwrap();

        assert_eq!(cfg.successors(InsnIndex(0)), Ok(vec![InsnIndex(1)]));
        assert_eq!(
            cfg.successors(InsnIndex(1)),
            Ok(vec![InsnIndex(2), InsnIndex(4)])
        );
        assert_eq!(cfg.successors(InsnIndex(2)), Ok(vec![InsnIndex(6)]));
        assert_eq!(cfg.successors(InsnIndex(3)), Ok(vec![InsnIndex(5)]));
        assert_eq!(cfg.successors(InsnIndex(5)), Ok(vec![]));
        assert_eq!(
            cfg.successors(InsnIndex(7)),
            Ok(vec![InsnIndex(3), InsnIndex(5)])
        );
        assert_eq!(cfg.successors(InsnIndex(8)), Ok(vec![]));

        assert!(!cfg.is_dead(InsnIndex(7)));
        assert!(cfg.is_dead(InsnIndex(8)));
    }

    #[test]
    fn ret_in_dead_code() {
        let code = code(vec![Return, Ret(0)], vec![]);
        let cfg = ControlFlowGraph::new(&code).unwrap();
        assert!(cfg.successors(InsnIndex(1)).is_err());
    }

    #[test]
    fn exception_handlers() {
        let handler = ExceptionHandler {
            start: InsnIndex(0),
            end: InsnIndex(2),
            handler: InsnIndex(3),
            catch_type: Some(BinaryName::RUNTIMEEXCEPTION),
        };
        let code = code(vec![Nop, Nop, Return, Pop, Return], vec![handler.clone()]);
        let cfg = ControlFlowGraph::new(&code).unwrap();
        assert_eq!(cfg.exception_handlers(InsnIndex(1)), vec![&handler]);
        assert!(cfg.exception_handlers(InsnIndex(2)).is_empty());
        assert!(!cfg.is_dead(InsnIndex(4)));
    }

    #[test]
    fn execute_only_reruns_on_change() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let mut context = InstructionContext::new(InsnIndex(0));
        let push_int = |frame: &mut Frame| -> Result<(), VerifierError> {
            frame.stack.push(VerificationType::Integer)?;
            Ok(())
        };

        let mut frame = Frame::new(1, 1);
        frame.locals.set(0, VerificationType::Integer).unwrap();
        assert_eq!(context.execute(&class_graph, frame.clone(), &[], push_int), Ok(true));
        assert_eq!(context.out_frame(None).unwrap().stack.size(), 1);

        // Same frame again: nothing to do
        assert_eq!(context.execute(&class_graph, frame, &[], push_int), Ok(false));

        // Losing information about the local does change things
        let other = Frame::new(1, 1);
        assert_eq!(context.execute(&class_graph, other.clone(), &[], push_int), Ok(true));
        assert_eq!(
            context.in_frame(None).unwrap().locals.get(0),
            Ok(&VerificationType::Unknown)
        );

        // Contexts are separate
        assert!(context.out_frame(Some(InsnIndex(4))).is_err());
        assert_eq!(
            context.execute(&class_graph, other, &[InsnIndex(4)], push_int),
            Ok(true)
        );
        assert_eq!(context.recorded_frames().count(), 2);
    }

    #[test]
    fn merge_failures_carry_the_chain() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let mut context = InstructionContext::new(InsnIndex(3));
        let nothing = |_: &mut Frame| -> Result<(), VerifierError> { Ok(()) };

        let mut frame = Frame::new(0, 1);
        frame.stack.push(VerificationType::Integer).unwrap();
        context
            .execute(&class_graph, frame, &[InsnIndex(1)], nothing)
            .unwrap();

        let mut frame = Frame::new(0, 1);
        frame.stack.push(VerificationType::Float).unwrap();
        match context.execute(&class_graph, frame, &[InsnIndex(1)], nothing) {
            Err(VerifierError::Violation(violation)) => {
                assert!(violation.message.starts_with("Cannot merge stacks of different types"));
                assert_eq!(violation.subroutine_chain, vec![InsnIndex(1)]);
            }
            other => panic!("expected a violation, got {:?}", other),
        }
    }
}
