use super::VerifierError;
use crate::jvm::code::{Code, InsnIndex, Instruction};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

/// A region of code entered with `jsr` and left with `ret`
///
/// Subroutines here are more restricted than what the JVM allows:
///
///   - every instruction belongs to at most one subroutine (or to the top level)
///   - a subroutine starts with an `astore` of the return address and has exactly one `ret`,
///     which reads the return address from that same local
///   - subroutine code is never protected by an exception handler
///   - subroutines don't call themselves, directly or indirectly
///
/// Code not in any subroutine belongs to the top level, which is modelled as a subroutine without
/// a return address local or a `ret`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subroutine {
    leader: InsnIndex,
    local_variable: Option<u16>,
    instructions: BTreeSet<InsnIndex>,
    entering_jsrs: Vec<InsnIndex>,
    leaving_ret: Option<InsnIndex>,
    sub_subroutines: BTreeSet<InsnIndex>,
    accessed_locals: BTreeSet<u16>,
}

impl Subroutine {
    fn new(leader: InsnIndex, local_variable: Option<u16>) -> Subroutine {
        Subroutine {
            leader,
            local_variable,
            instructions: BTreeSet::new(),
            entering_jsrs: vec![],
            leaving_ret: None,
            sub_subroutines: BTreeSet::new(),
            accessed_locals: BTreeSet::new(),
        }
    }

    /// First instruction (the `astore` of the return address, or `#0` for the top level)
    pub fn leader(&self) -> InsnIndex {
        self.leader
    }

    pub fn is_top_level(&self) -> bool {
        self.local_variable.is_none()
    }

    /// Local holding the return address
    pub fn local_variable(&self) -> Option<u16> {
        self.local_variable
    }

    pub fn instructions(&self) -> &BTreeSet<InsnIndex> {
        &self.instructions
    }

    pub fn contains(&self, index: InsnIndex) -> bool {
        self.instructions.contains(&index)
    }

    /// `jsr` instructions which enter this subroutine
    pub fn entering_jsrs(&self) -> &[InsnIndex] {
        &self.entering_jsrs
    }

    /// The one `ret` instruction (`None` for the top level)
    pub fn leaving_ret(&self) -> Option<InsnIndex> {
        self.leaving_ret
    }

    /// Leaders of the subroutines called directly from this one
    pub fn sub_subroutines(&self) -> &BTreeSet<InsnIndex> {
        &self.sub_subroutines
    }

    /// Locals read or written by the instructions of this subroutine
    ///
    /// This does not include locals accessed by the subroutines it calls (see
    /// [`Subroutines::recursively_accessed_locals`]).
    pub fn accessed_locals(&self) -> &BTreeSet<u16> {
        &self.accessed_locals
    }
}

/// Partition of the instructions of a method into subroutines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subroutines {
    top_level: Subroutine,

    /// Real subroutines, keyed by their leader
    subroutines: BTreeMap<InsnIndex, Subroutine>,

    /// Leader of the subroutine each instruction is in (`None` for dead code)
    owners: Vec<Option<InsnIndex>>,
}

impl Subroutines {
    /// Discover the subroutines of a method body
    ///
    /// The body is expected to have passed the static checks already (branch targets in range,
    /// no falling off the end of the code).
    pub fn new(code: &Code) -> Result<Subroutines, VerifierError> {
        let top_level_leader = InsnIndex(0);
        if code.is_empty() {
            return Err(VerifierError::violation("Code array must not be empty."));
        }

        // Leaders of real subroutines
        let mut subroutines: BTreeMap<InsnIndex, Subroutine> = BTreeMap::new();
        for (index, insn) in code.iter() {
            if let Instruction::Jsr(target) = insn {
                if *target == top_level_leader {
                    return Err(VerifierError::violation(
                        "A jsr instruction must not target the first instruction of the method.",
                    )
                    .at(index, insn));
                }
                let local_variable = match code.get(*target) {
                    Some(Instruction::AStore(local)) => *local,
                    Some(other) => {
                        return Err(VerifierError::violation(format!(
                            "Subroutine leader {} must be an astore instruction, found '{}'.",
                            target, other
                        ))
                        .at(index, insn))
                    }
                    None => {
                        return Err(VerifierError::violation(format!(
                            "Subroutine leader {} is outside of the code.",
                            target
                        ))
                        .at(index, insn))
                    }
                };
                subroutines
                    .entry(*target)
                    .or_insert_with(|| Subroutine::new(*target, Some(local_variable)))
                    .entering_jsrs
                    .push(index);
            }
        }

        let mut top_level = Subroutine::new(top_level_leader, None);
        let mut owners: Vec<Option<InsnIndex>> = vec![None; code.len()];

        // Top level starts at the beginning of the code and at every exception handler
        let mut roots = vec![top_level_leader];
        roots.extend(code.exception_table.iter().map(|handler| handler.handler));
        top_level.instructions = reachable_in_subroutine(code, &roots);
        claim_instructions(&top_level, &mut owners)?;
        for index in &top_level.instructions {
            if let Some(insn @ Instruction::Ret(_)) = code.get(*index) {
                return Err(VerifierError::violation(
                    "RET in top-level code detected: there is no subroutine to return from.",
                )
                .at(*index, insn));
            }
        }

        for subroutine in subroutines.values_mut() {
            subroutine.instructions = reachable_in_subroutine(code, &[subroutine.leader]);
            claim_instructions(subroutine, &mut owners)?;
            subroutine.leaving_ret = Some(find_leaving_ret(code, subroutine)?);
        }

        // Subroutine code must not be protected by exception handlers
        for handler in &code.exception_table {
            for protected in handler.start.0..handler.end.0 {
                let protected = InsnIndex(protected);
                if let Some(Some(owner)) = owners.get(protected.0) {
                    if *owner != top_level_leader {
                        return Err(VerifierError::violation(format!(
                            "Subroutine instruction {} is protected by an exception handler \
                            (from {} to {} using {}), but subroutines must not be protected.",
                            protected, handler.start, handler.end, handler.handler
                        )));
                    }
                }
            }
        }

        for subroutine in std::iter::once(&mut top_level).chain(subroutines.values_mut()) {
            for index in &subroutine.instructions {
                let insn = match code.get(*index) {
                    Some(insn) => insn,
                    None => continue,
                };
                if let Instruction::Jsr(target) = insn {
                    subroutine.sub_subroutines.insert(*target);
                }
                if let Some((local, width)) = insn.local_variable() {
                    subroutine.accessed_locals.insert(local);
                    if let (2, Some(upper)) = (width, local.checked_add(1)) {
                        subroutine.accessed_locals.insert(upper);
                    }
                }
            }
        }

        let subroutines = Subroutines {
            top_level,
            subroutines,
            owners,
        };
        subroutines.check_no_recursive_calls(&subroutines.top_level, &mut HashSet::new())?;

        log::trace!("Discovered subroutines:\n{}", subroutines);
        Ok(subroutines)
    }

    /// Pseudo-subroutine of the code not in any real subroutine
    pub fn top_level(&self) -> &Subroutine {
        &self.top_level
    }

    /// Look up a subroutine by its leader
    pub fn get(&self, leader: InsnIndex) -> Option<&Subroutine> {
        if leader == self.top_level.leader {
            Some(&self.top_level)
        } else {
            self.subroutines.get(&leader)
        }
    }

    /// Subroutine containing an instruction (`None` for dead code)
    pub fn subroutine_of(&self, index: InsnIndex) -> Option<&Subroutine> {
        let leader = self.owners.get(index.0).copied().flatten()?;
        self.get(leader)
    }

    /// Real subroutines (so excluding the top level), by ascending leader
    pub fn iter(&self) -> impl Iterator<Item = &Subroutine> {
        self.subroutines.values()
    }

    /// Subroutines called directly from a subroutine
    pub fn sub_subroutines<'a>(
        &'a self,
        subroutine: &'a Subroutine,
    ) -> impl Iterator<Item = &'a Subroutine> + 'a {
        subroutine
            .sub_subroutines
            .iter()
            .filter_map(move |leader| self.subroutines.get(leader))
    }

    /// Locals accessed by a subroutine or by any subroutine it (transitively) calls
    pub fn recursively_accessed_locals(&self, subroutine: &Subroutine) -> BTreeSet<u16> {
        let mut accessed = subroutine.accessed_locals.clone();
        for sub_subroutine in self.sub_subroutines(subroutine) {
            accessed.extend(self.recursively_accessed_locals(sub_subroutine));
        }
        accessed
    }

    /// Walk down from a subroutine through the subroutines it calls, tracking the return address
    /// locals in use along the way. A local showing up twice means a subroutine is (maybe
    /// indirectly) calling itself or clobbering the return address of its caller.
    fn check_no_recursive_calls(
        &self,
        subroutine: &Subroutine,
        return_locals: &mut HashSet<u16>,
    ) -> Result<(), VerifierError> {
        for sub_subroutine in self.sub_subroutines(subroutine) {
            let local = match sub_subroutine.local_variable {
                Some(local) => local,
                None => continue,
            };
            if !return_locals.insert(local) {
                return Err(VerifierError::violation(format!(
                    "Subroutine at {} with return address local {} is called by a subroutine \
                    which uses the same local variable index as itself; maybe even a recursive \
                    call? Subroutines may do neither.",
                    sub_subroutine.leader, local
                )));
            }
            self.check_no_recursive_calls(sub_subroutine, return_locals)?;
            return_locals.remove(&local);
        }
        Ok(())
    }
}

/// Successors of an instruction which stay inside the same subroutine
///
///   - `ret`, returns, and `athrow` leave the subroutine
///   - `jsr` comes back to the instruction after it
///   - exception handlers aren't followed (subroutines can't be protected anyway)
pub fn subroutine_successors(code: &Code, index: InsnIndex) -> Vec<InsnIndex> {
    let insn = match code.get(index) {
        Some(insn) => insn,
        None => return vec![],
    };
    let mut successors = match insn {
        Instruction::Ret(_) | Instruction::AThrow => return vec![],
        _ if insn.is_return() => return vec![],
        Instruction::Jsr(_) => vec![],
        _ => insn.jump_targets(),
    };
    if insn.falls_through() {
        successors.insert(0, index.next());
    }
    successors.retain(|successor| successor.0 < code.len());
    successors
}

/// Breadth-first search from the roots, staying in the subroutine
fn reachable_in_subroutine(code: &Code, roots: &[InsnIndex]) -> BTreeSet<InsnIndex> {
    let mut visited: BTreeSet<InsnIndex> = BTreeSet::new();
    let mut queue: VecDeque<InsnIndex> = VecDeque::new();
    for root in roots {
        if root.0 < code.len() && visited.insert(*root) {
            queue.push_back(*root);
        }
    }
    while let Some(index) = queue.pop_front() {
        for successor in subroutine_successors(code, index) {
            if visited.insert(successor) {
                queue.push_back(successor);
            }
        }
    }
    visited
}

fn claim_instructions(
    subroutine: &Subroutine,
    owners: &mut [Option<InsnIndex>],
) -> Result<(), VerifierError> {
    for index in &subroutine.instructions {
        if let Some(owner) = owners.get_mut(index.0) {
            if owner.is_some() {
                return Err(VerifierError::violation(format!(
                    "Instruction {} is part of more than one subroutine (or of the top level \
                    and a subroutine).",
                    index
                )));
            }
            *owner = Some(subroutine.leader);
        }
    }
    Ok(())
}

fn find_leaving_ret(code: &Code, subroutine: &Subroutine) -> Result<InsnIndex, VerifierError> {
    let mut leaving_ret: Option<(InsnIndex, u16)> = None;
    for index in &subroutine.instructions {
        if let Some(Instruction::Ret(local)) = code.get(*index) {
            if let Some((first_ret, _)) = leaving_ret {
                return Err(VerifierError::violation(format!(
                    "Subroutine with more than one RET detected: {} and {}.",
                    first_ret, index
                )));
            }
            leaving_ret = Some((*index, *local));
        }
    }

    match (leaving_ret, subroutine.local_variable) {
        (None, _) => Err(VerifierError::violation(format!(
            "Subroutine at {} without a RET detected.",
            subroutine.leader
        ))),
        (Some((ret, local)), Some(expected)) if local != expected => {
            Err(VerifierError::violation(format!(
                "Subroutine uses 'ret {}' at {} which does not match the correct local variable \
                '{}'.",
                local, ret, expected
            )))
        }
        (Some((ret, _)), _) => Ok(ret),
    }
}

impl fmt::Display for Subroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.local_variable, self.leaving_ret) {
            (Some(local), Some(ret)) => write!(
                f,
                "Subroutine at {}: return address in local {}, ret at {}",
                self.leader, local, ret
            )?,
            _ => f.write_str("Top level")?,
        }
        if !self.entering_jsrs.is_empty() {
            f.write_str("\n  entered from:")?;
            for jsr in &self.entering_jsrs {
                write!(f, " {}", jsr)?;
            }
        }
        f.write_str("\n  instructions:")?;
        for index in &self.instructions {
            write!(f, " {}", index)?;
        }
        f.write_str("\n  accessed locals:")?;
        for local in self.accessed_locals() {
            write!(f, " {}", local)?;
        }
        Ok(())
    }
}

impl fmt::Display for Subroutines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.top_level)?;
        for subroutine in self.subroutines.values() {
            write!(f, "\n{}", subroutine)?;
            if !subroutine.sub_subroutines.is_empty() {
                f.write_str("\n  accessed locals with called subroutines:")?;
                for local in self.recursively_accessed_locals(subroutine) {
                    write!(f, " {}", local)?;
                }
            }
        }
        Ok(())
    }
}
