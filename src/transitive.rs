//! Transitive reasoning over relational facts: equalities, disequalities,
//! strict and non-strict orders (partial `subset`-like and total `<`-like)
//! and set separation.
//!
//! Facts live in persistent tables so a scope push is a cheap snapshot and a
//! pop restores it exactly. Every new fact is combined with each fact that
//! shares an operand with it until nothing new follows.

use std::collections::VecDeque;

use crate::{
    symbols::*,
    term::{TermId, TermTable},
    util::{HashMap, PMap},
    Contradiction,
};

/// Relation kinds. The first six take part in [`combine_operands`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelOp {
    Eq,
    Ne,
    /// Strict partial order (`psubset`).
    Po,
    /// Strict total order (`<`).
    To,
    /// Non-strict partial order (`subset`).
    Epo,
    /// Non-strict total order (`<=`).
    Eto,
    Separate,
}

impl RelOp {
    pub const ORDER_KINDS: [RelOp; 6] = [
        RelOp::Eq,
        RelOp::Ne,
        RelOp::Po,
        RelOp::To,
        RelOp::Epo,
        RelOp::Eto,
    ];

    pub fn is_symmetric(self) -> bool {
        matches!(self, RelOp::Eq | RelOp::Ne | RelOp::Separate)
    }

    pub fn is_strict(self) -> bool {
        matches!(self, RelOp::Ne | RelOp::Po | RelOp::To)
    }

    fn table_index(self) -> Option<usize> {
        Self::ORDER_KINDS.iter().position(|k| *k == self)
    }

    pub fn functor(self) -> crate::Symbol {
        match self {
            RelOp::Eq => *EQUAL,
            RelOp::Ne => *NOT_EQUAL,
            RelOp::Po => *PSUBSET,
            RelOp::To => *LESS,
            RelOp::Epo => *SUBSET,
            RelOp::Eto => *LESS_EQ,
            RelOp::Separate => *SEPARATE,
        }
    }

    /// Reads a relational fact off a term, as `(op, left, right)`.
    pub fn from_term(table: &TermTable, id: TermId) -> Option<(RelOp, TermId, TermId)> {
        if let Some(&[inner]) = table.app_of(id, *NOT) {
            let (op, l, r) = Self::from_term(table, inner)?;
            return match op {
                RelOp::Eq => Some((RelOp::Ne, l, r)),
                RelOp::To => Some((RelOp::Eto, r, l)),
                RelOp::Eto => Some((RelOp::To, r, l)),
                _ => None,
            };
        }
        let functor = table.functor(id)?;
        let &[l, r] = table.args(id) else {
            return None;
        };
        let (op, l, r) = match functor {
            f if f == *EQUAL => (RelOp::Eq, l, r),
            f if f == *NOT_EQUAL => (RelOp::Ne, l, r),
            f if f == *PSUBSET => (RelOp::Po, l, r),
            f if f == *LESS => (RelOp::To, l, r),
            f if f == *GREATER => (RelOp::To, r, l),
            f if f == *SUBSET => (RelOp::Epo, l, r),
            f if f == *LESS_EQ => (RelOp::Eto, l, r),
            f if f == *GREATER_EQ => (RelOp::Eto, r, l),
            f if f == *SEPARATE => (RelOp::Separate, l, r),
            _ => return None,
        };
        Some((op, l, r))
    }

    /// The term the builtin simplifier would produce for this relation.
    pub fn to_term(self, table: &mut TermTable, left: TermId, right: TermId) -> TermId {
        match self {
            RelOp::Ne => {
                let eq = table.app(*EQUAL, vec![left, right]);
                table.app(*NOT, vec![eq])
            }
            op => table.app(op.functor(), vec![left, right]),
        }
    }
}

pub type FactId = usize;

/// A relational fact `left op right`. Derived facts point at the two facts
/// they were combined from, so every fact heads a small derivation DAG
/// whose leaves carry the asserted source terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fact {
    pub op: RelOp,
    pub left: TermId,
    pub right: TermId,
    pub source: Option<TermId>,
    pub child1: Option<FactId>,
    pub child2: Option<FactId>,
    /// Set once a stronger fact on the same operands is known. Unused facts
    /// stay in the tables for explanations but no longer combine.
    pub unused: bool,
}

impl Fact {
    pub fn asserted(op: RelOp, left: TermId, right: TermId, source: TermId) -> Self {
        Fact {
            op,
            left,
            right,
            source: Some(source),
            child1: None,
            child2: None,
            unused: false,
        }
    }

    fn unsourced(op: RelOp, left: TermId, right: TermId) -> Self {
        Fact {
            op,
            left,
            right,
            source: None,
            child1: None,
            child2: None,
            unused: false,
        }
    }

    fn derived(op: RelOp, left: TermId, right: TermId, from: (FactId, FactId)) -> Self {
        Fact {
            op,
            left,
            right,
            source: None,
            child1: Some(from.0),
            child2: Some(from.1),
            unused: false,
        }
    }

    fn orientations(&self) -> smallvec::SmallVec<[(TermId, TermId); 2]> {
        let mut out = smallvec::smallvec![(self.left, self.right)];
        if self.op.is_symmetric() && self.left != self.right {
            out.push((self.right, self.left));
        }
        out
    }
}

/// How two facts share their operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    /// `a k1 b` and `a k2 b`.
    Same,
    /// `a k1 b` and `b k2 a`.
    Swapped,
    /// `a k1 b` and `b k2 c`.
    Chain,
}

/// One entry of the combination table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Derive `op` oriented like the first fact.
    Keep(RelOp),
    /// Derive `op` with the first fact's operands reversed.
    Flip(RelOp),
    Contra,
    Nothing,
}

use Outcome::{Contra, Flip, Keep, Nothing};

mod table {
    use super::Outcome::{self, *};
    use super::RelOp::*;

    // Rows are the first fact's kind, columns the second's, both in
    // `RelOp::ORDER_KINDS` order.
    pub(super) const SAME: [[Outcome; 6]; 6] = [
        [Keep(Eq), Contra, Contra, Contra, Keep(Eq), Keep(Eq)],
        [Contra, Keep(Ne), Keep(Po), Keep(To), Keep(Po), Keep(To)],
        [Contra, Keep(Po), Keep(Po), Nothing, Keep(Po), Nothing],
        [Contra, Keep(To), Nothing, Keep(To), Nothing, Keep(To)],
        [Keep(Eq), Keep(Po), Keep(Po), Nothing, Keep(Epo), Nothing],
        [Keep(Eq), Keep(To), Nothing, Keep(To), Nothing, Keep(Eto)],
    ];

    pub(super) const SWAPPED: [[Outcome; 6]; 6] = [
        [Keep(Eq), Contra, Contra, Contra, Keep(Eq), Keep(Eq)],
        [Contra, Keep(Ne), Flip(Po), Flip(To), Flip(Po), Flip(To)],
        [Contra, Keep(Po), Contra, Nothing, Contra, Nothing],
        [Contra, Keep(To), Nothing, Contra, Nothing, Contra],
        [Keep(Eq), Keep(Po), Contra, Nothing, Keep(Eq), Nothing],
        [Keep(Eq), Keep(To), Nothing, Contra, Nothing, Keep(Eq)],
    ];

    // `a k1 b` and `b k2 c` give `a ? c`. A disequality never chains.
    pub(super) const CHAIN: [[Outcome; 6]; 6] = [
        [Keep(Eq), Keep(Ne), Keep(Po), Keep(To), Keep(Epo), Keep(Eto)],
        [Keep(Ne), Nothing, Nothing, Nothing, Nothing, Nothing],
        [Keep(Po), Nothing, Keep(Po), Nothing, Keep(Po), Nothing],
        [Keep(To), Nothing, Nothing, Keep(To), Nothing, Keep(To)],
        [Keep(Epo), Nothing, Keep(Po), Nothing, Keep(Epo), Nothing],
        [Keep(Eto), Nothing, Nothing, Keep(To), Nothing, Keep(Eto)],
    ];
}

/// Looks up the combination table. `Separate` never combines here; it is
/// handled by union reduction.
pub fn combination_outcome(k1: RelOp, k2: RelOp, alignment: Alignment) -> Outcome {
    let (Some(i), Some(j)) = (k1.table_index(), k2.table_index()) else {
        return Nothing;
    };
    match alignment {
        Alignment::Same => table::SAME[i][j],
        Alignment::Swapped => table::SWAPPED[i][j],
        Alignment::Chain => table::CHAIN[i][j],
    }
}

/// Result of combining two facts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combination {
    Derived {
        op: RelOp,
        left: TermId,
        right: TermId,
    },
    False,
    NoCombination,
}

/// Combines two facts sharing an operand. Same and swapped alignments are
/// tried before chains, and symmetric facts in both orientations.
pub fn combine_operands(a: &Fact, b: &Fact) -> Combination {
    let apply = |outcome: Outcome, left: TermId, right: TermId| match outcome {
        Keep(op) => Combination::Derived { op, left, right },
        Flip(op) => Combination::Derived {
            op,
            left: right,
            right: left,
        },
        Contra => Combination::False,
        Nothing => Combination::NoCombination,
    };
    for (x, y) in a.orientations() {
        for (u, v) in b.orientations() {
            if x == u && y == v {
                return apply(combination_outcome(a.op, b.op, Alignment::Same), x, y);
            }
            if x == v && y == u {
                return apply(combination_outcome(a.op, b.op, Alignment::Swapped), x, y);
            }
        }
    }
    for (x, y) in a.orientations() {
        for (u, v) in b.orientations() {
            if y == u {
                let c = apply(combination_outcome(a.op, b.op, Alignment::Chain), x, v);
                if c != Combination::NoCombination {
                    return c;
                }
            }
            if v == x {
                let c = apply(combination_outcome(b.op, a.op, Alignment::Chain), u, y);
                if c != Combination::NoCombination {
                    return c;
                }
            }
        }
    }
    Combination::NoCombination
}

/// Does `strong` make `weak` redundant? Both must relate the same two terms.
fn supersedes(strong: &Fact, weak: &Fact) -> bool {
    if strong.op == weak.op {
        return false;
    }
    let orientations = strong.orientations();
    let alignment = if orientations.contains(&(weak.left, weak.right)) {
        Alignment::Same
    } else if orientations.contains(&(weak.right, weak.left)) {
        Alignment::Swapped
    } else {
        return false;
    };
    combination_outcome(strong.op, weak.op, alignment) == Keep(strong.op)
}

/// The relational fact tables of one scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FactTables {
    facts: PMap<FactId, Fact>,
    len: usize,
    by_left: PMap<TermId, im_rc::Vector<FactId>>,
    by_right: PMap<TermId, im_rc::Vector<FactId>>,
    index: PMap<(RelOp, TermId, TermId), FactId>,
}

impl FactTables {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: FactId) -> &Fact {
        &self.facts[&id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FactId, &Fact)> + '_ {
        (0..self.len).map(move |id| (id, self.get(id)))
    }

    pub fn lookup(&self, op: RelOp, left: TermId, right: TermId) -> Option<FactId> {
        self.index.get(&(op, left, right)).copied()
    }

    /// Facts mentioning `t` on either side.
    pub fn touching(&self, t: TermId) -> Vec<FactId> {
        let mut out: Vec<FactId> = vec![];
        for ids in [self.by_left.get(&t), self.by_right.get(&t)].into_iter().flatten() {
            for id in ids {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }

    fn insert(&mut self, fact: Fact) -> FactId {
        let id = self.len;
        self.len += 1;
        self.facts.insert(id, fact);
        self.by_left.entry(fact.left).or_default().push_back(id);
        self.by_right.entry(fact.right).or_default().push_back(id);
        self.index.insert((fact.op, fact.left, fact.right), id);
        id
    }

    fn mark_unused(&mut self, id: FactId) {
        if let Some(fact) = self.facts.get_mut(&id) {
            fact.unused = true;
        }
    }

    /// Are both tables the very same snapshot (not just equal contents)?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.facts.ptr_eq(&other.facts)
            && self.by_left.ptr_eq(&other.by_left)
            && self.by_right.ptr_eq(&other.by_right)
            && self.index.ptr_eq(&other.index)
    }
}

#[derive(Clone, Debug)]
struct Frame {
    tables: FactTables,
    asserted: Vec<TermId>,
}

/// Transitive reasoner with a LIFO scope stack.
#[derive(Clone, Debug, Default)]
pub struct TransitiveReasoner {
    tables: FactTables,
    /// Source terms of every processed fact, in assertion order.
    asserted: Vec<TermId>,
    /// Facts queued for the next push.
    pending: Vec<TermId>,
    stack: Vec<Frame>,
    /// Tables computed for a given set of asserted facts.
    memo: HashMap<Vec<TermId>, FactTables>,
    memo_hits: usize,
}

impl TransitiveReasoner {
    pub fn tables(&self) -> &FactTables {
        &self.tables
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn memo_hits(&self) -> usize {
        self.memo_hits
    }

    /// Queues a fact to be processed at the next [`TransitiveReasoner::push`].
    pub fn add_pending(&mut self, term: TermId) {
        if !self.pending.contains(&term) && !self.asserted.contains(&term) {
            self.pending.push(term);
        }
    }

    /// Processes every pending fact.
    pub fn flush(&mut self, table: &mut TermTable) -> Result<(), Contradiction> {
        for term in std::mem::take(&mut self.pending) {
            self.process_env_term(table, term)?;
        }
        Ok(())
    }

    /// Flushes pending facts and opens a scope. A fact set that was already
    /// processed before reuses the memoized tables.
    pub fn push(&mut self, table: &mut TermTable) -> Result<(), Contradiction> {
        let result = if self.pending.is_empty() {
            Ok(())
        } else {
            let mut key: Vec<TermId> = self.asserted.iter().chain(&self.pending).copied().collect();
            key.sort();
            key.dedup();
            if let Some(tables) = self.memo.get(&key) {
                log::trace!("reusing tables for {} facts", key.len());
                self.memo_hits += 1;
                self.tables = tables.clone();
                let pending = std::mem::take(&mut self.pending);
                self.asserted.extend(pending);
                Ok(())
            } else {
                let result = self.flush(table);
                if result.is_ok() {
                    self.memo.insert(key, self.tables.clone());
                }
                result
            }
        };
        self.stack.push(Frame {
            tables: self.tables.clone(),
            asserted: self.asserted.clone(),
        });
        result
    }

    /// Restores the tables saved by the matching push. Returns false, leaving
    /// the state alone, when there is no open scope.
    pub fn pop(&mut self) -> bool {
        match self.stack.pop() {
            Some(frame) => {
                self.tables = frame.tables;
                self.asserted = frame.asserted;
                self.pending.clear();
                true
            }
            None => {
                log::warn!("transitive scope pop without a matching push");
                false
            }
        }
    }

    /// Adds the fact expressed by `term` and everything that follows from it.
    /// Returns whether any new fact was recorded; terms that are not
    /// relational facts are ignored.
    pub fn process_env_term(
        &mut self,
        table: &mut TermTable,
        term: TermId,
    ) -> Result<bool, Contradiction> {
        let Some((op, left, right)) = RelOp::from_term(table, term) else {
            return Ok(false);
        };
        if !self.asserted.contains(&term) {
            self.asserted.push(term);
        }
        self.close(table, Fact::asserted(op, left, right, term))
    }

    fn canonical(table: &TermTable, mut fact: Fact) -> Fact {
        if fact.op.is_symmetric() && table.compare(fact.left, fact.right).is_lt() {
            std::mem::swap(&mut fact.left, &mut fact.right);
        }
        fact
    }

    fn close(&mut self, table: &mut TermTable, first: Fact) -> Result<bool, Contradiction> {
        let mut added = false;
        let mut work = VecDeque::from([first]);
        while let Some(fact) = work.pop_front() {
            let fact = Self::canonical(table, fact);
            match evaluate(table, fact.op, fact.left, fact.right) {
                Some(true) => continue,
                Some(false) => return Err(self.contradiction(&[&fact])),
                None => {}
            }
            if self.tables.lookup(fact.op, fact.left, fact.right).is_some() {
                continue;
            }
            if self.implied(&fact) {
                continue;
            }
            let id = self.tables.insert(fact);
            added = true;
            log::debug!(
                "fact {} {:?} {}",
                table.display(fact.left),
                fact.op,
                table.display(fact.right)
            );
            self.add_const_comparison(table, id, &mut work);
            self.reduce_unions(table, id, &mut work);
            let mut neighbours = self.tables.touching(fact.left);
            for other in self.tables.touching(fact.right) {
                if !neighbours.contains(&other) {
                    neighbours.push(other);
                }
            }
            for other_id in neighbours {
                if other_id == id || self.tables.get(other_id).unused {
                    continue;
                }
                let other = *self.tables.get(other_id);
                if supersedes(&fact, &other) {
                    self.tables.mark_unused(other_id);
                    continue;
                }
                match combine_operands(&fact, &other) {
                    Combination::Derived { op, left, right } => {
                        work.push_back(Fact::derived(op, left, right, (id, other_id)));
                    }
                    Combination::False => return Err(self.contradiction(&[&fact, &other])),
                    Combination::NoCombination => {}
                }
            }
        }
        Ok(added)
    }

    /// Is `fact` already a consequence of a recorded fact on the same terms?
    fn implied(&self, fact: &Fact) -> bool {
        self.tables.touching(fact.left).into_iter().any(|id| {
            let known = self.tables.get(id);
            supersedes(known, fact)
        })
    }

    /// A fact bounding a term by a numeric constant, next to another fact on
    /// the same term with a different constant: the ordering between the two
    /// constants is chained through both, so `x < 3` yields `x < 5` once
    /// `x <= 5` is known, whichever came first.
    fn add_const_comparison(&mut self, table: &TermTable, id: FactId, work: &mut VecDeque<Fact>) {
        let fact = *self.tables.get(id);
        let Some((x, c)) = numeric_bound(table, &fact) else {
            return;
        };
        for other_id in self.tables.touching(x) {
            let other = *self.tables.get(other_id);
            if other_id == id || other.unused {
                continue;
            }
            let Some((y, d)) = numeric_bound(table, &other) else {
                continue;
            };
            if y != x || c == d {
                continue;
            }
            for (from_id, from, to) in [(id, &fact, d), (other_id, &other, c)] {
                let Some(link) = constant_order(table, from, to) else {
                    continue;
                };
                if let Combination::Derived { op, left, right } = combine_operands(from, &link) {
                    log::trace!("constant bound {} carried to {}", from_id, table.display(to));
                    work.push_back(Fact::derived(op, left, right, (from_id, from_id)));
                }
            }
        }
    }

    /// `x subset union(.., s, ..)` together with `separate(x, s)` gives
    /// `x subset union(..)` without `s`.
    fn reduce_unions(&mut self, table: &mut TermTable, id: FactId, work: &mut VecDeque<Fact>) {
        let fact = *self.tables.get(id);
        let mut candidates = vec![];
        match fact.op {
            RelOp::Epo => {
                if table.app_of(fact.right, *UNION).is_some() {
                    for other_id in self.tables.touching(fact.left) {
                        let other = self.tables.get(other_id);
                        if other.op == RelOp::Separate {
                            let s = if other.left == fact.left { other.right } else { other.left };
                            candidates.push((id, other_id, fact.left, fact.right, s));
                        }
                    }
                }
            }
            RelOp::Separate => {
                for (x, s) in fact.orientations() {
                    for other_id in self.tables.touching(x) {
                        let other = self.tables.get(other_id);
                        if other.op == RelOp::Epo
                            && other.left == x
                            && table.app_of(other.right, *UNION).is_some()
                        {
                            candidates.push((other_id, id, x, other.right, s));
                        }
                    }
                }
            }
            _ => {}
        }
        for (subset_id, separate_id, x, union, s) in candidates {
            let Some(parts) = table.app_of(union, *UNION) else {
                continue;
            };
            if !parts.contains(&s) {
                continue;
            }
            let rest: Vec<TermId> = parts.iter().copied().filter(|p| *p != s).collect();
            let reduced = match rest.len() {
                0 => table.app(*SET, vec![]),
                1 => rest[0],
                _ => table.app(*UNION, rest),
            };
            work.push_back(Fact::derived(RelOp::Epo, x, reduced, (subset_id, separate_id)));
        }
    }

    /// Decides `left op right` from the recorded facts, if possible.
    pub fn decide(&self, table: &TermTable, op: RelOp, left: TermId, right: TermId) -> Option<bool> {
        if left == right {
            return match op {
                RelOp::Eq | RelOp::Epo | RelOp::Eto => Some(true),
                RelOp::Ne | RelOp::Po | RelOp::To => Some(false),
                RelOp::Separate => None,
            };
        }
        if let Some(b) = evaluate(table, op, left, right) {
            return Some(b);
        }
        let query = Fact::unsourced(op, left, right);
        let verdict = |known: &Fact| {
            if known.op == op && known.orientations().contains(&(left, right)) {
                return Some(true);
            }
            if supersedes(known, &query) {
                return Some(true);
            }
            if combine_operands(known, &query) == Combination::False {
                return Some(false);
            }
            None
        };
        for id in self.tables.touching(left) {
            let known = self.tables.get(id);
            if !(known.left == right || known.right == right) {
                continue;
            }
            if let Some(b) = verdict(known) {
                return Some(b);
            }
        }
        // a constant bound on one side, carried to a number on the other
        for (x, k) in [(left, right), (right, left)] {
            if table.as_number(k).is_none() {
                continue;
            }
            for id in self.tables.touching(x) {
                let known = self.tables.get(id);
                if numeric_bound(table, known).map(|(y, _)| y) != Some(x) {
                    continue;
                }
                let Some(link) = constant_order(table, known, k) else {
                    continue;
                };
                if let Combination::Derived { op, left, right } = combine_operands(known, &link) {
                    if let Some(b) = verdict(&Fact::unsourced(op, left, right)) {
                        return Some(b);
                    }
                }
            }
        }
        None
    }

    /// Asserted source terms behind a fact.
    pub fn explain(&self, id: FactId) -> Vec<TermId> {
        let mut out = vec![];
        let mut stack = vec![id];
        let mut seen = vec![];
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            let fact = self.tables.get(id);
            if let Some(s) = fact.source {
                if !out.contains(&s) {
                    out.push(s);
                }
            }
            stack.extend(fact.child1);
            stack.extend(fact.child2);
        }
        out
    }

    fn contradiction(&self, facts: &[&Fact]) -> Contradiction {
        let mut explanation = vec![];
        for fact in facts {
            let mut sources: Vec<TermId> = fact.source.into_iter().collect();
            for child in [fact.child1, fact.child2].into_iter().flatten() {
                sources.extend(self.explain(child));
            }
            for s in sources {
                if !explanation.contains(&s) {
                    explanation.push(s);
                }
            }
        }
        log::debug!("transitive contradiction from {} facts", explanation.len());
        Contradiction { explanation }
    }
}

/// The facts that follow from `p` having truth value `value`, looking
/// through negations, conjunctions of true facts and disjunctions of false
/// ones. Only relational facts are of interest to the reasoner, but every
/// leaf is returned.
pub fn relational_facts(table: &mut TermTable, p: TermId, value: bool) -> Vec<TermId> {
    let mut out = vec![];
    let mut stack = vec![(p, value)];
    while let Some((p, value)) = stack.pop() {
        if let Some(&[q]) = table.app_of(p, *NOT) {
            stack.push((q, !value));
            continue;
        }
        let junction = if value { *AND } else { *OR };
        if let Some(args) = table.app_of(p, junction) {
            stack.extend(args.iter().rev().map(|a| (*a, value)));
            continue;
        }
        if value {
            out.push(p);
        } else {
            out.push(table.app(*NOT, vec![p]));
        }
    }
    out
}

/// `(term, constant)` when `fact` relates a non-numeric term to a number.
fn numeric_bound(table: &TermTable, fact: &Fact) -> Option<(TermId, TermId)> {
    if !matches!(fact.op, RelOp::Eq | RelOp::Ne | RelOp::To | RelOp::Eto) {
        return None;
    }
    match (table.as_number(fact.left), table.as_number(fact.right)) {
        (None, Some(_)) => Some((fact.left, fact.right)),
        (Some(_), None) => Some((fact.right, fact.left)),
        _ => None,
    }
}

/// The strict order between the constant bounding `from` and the number `to`.
fn constant_order(table: &TermTable, from: &Fact, to: TermId) -> Option<Fact> {
    let (_, c) = numeric_bound(table, from)?;
    let (a, b) = (table.as_number(c)?, table.as_number(to)?);
    match a.cmp(&b) {
        std::cmp::Ordering::Less => Some(Fact::unsourced(RelOp::To, c, to)),
        std::cmp::Ordering::Greater => Some(Fact::unsourced(RelOp::To, to, c)),
        std::cmp::Ordering::Equal => None,
    }
}

/// Evaluates a relation between two constants.
fn evaluate(table: &TermTable, op: RelOp, left: TermId, right: TermId) -> Option<bool> {
    if let (Some(x), Some(y)) = (table.as_number(left), table.as_number(right)) {
        return match op {
            RelOp::Eq => Some(x == y),
            RelOp::Ne => Some(x != y),
            RelOp::To => Some(x < y),
            RelOp::Eto => Some(x <= y),
            RelOp::Po | RelOp::Epo | RelOp::Separate => None,
        };
    }
    if table.is_constant(left) && table.is_constant(right) {
        return match op {
            RelOp::Eq => Some(left == right),
            RelOp::Ne => Some(left != right),
            _ => None,
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_term;

    fn fact(op: RelOp, l: TermId, r: TermId) -> Fact {
        Fact {
            op,
            left: l,
            right: r,
            source: None,
            child1: None,
            child2: None,
            unused: false,
        }
    }

    #[test]
    fn combination_table_is_complete() {
        let mut t = TermTable::default();
        let a = t.var("a");
        let b = t.var("b");
        let mut cases = 0;
        for k1 in RelOp::ORDER_KINDS {
            for k2 in RelOp::ORDER_KINDS {
                for (alignment, second) in [
                    (Alignment::Same, fact(k2, a, b)),
                    (Alignment::Swapped, fact(k2, b, a)),
                ] {
                    cases += 1;
                    let outcome = combination_outcome(k1, k2, alignment);
                    let combined = combine_operands(&fact(k1, a, b), &second);
                    match outcome {
                        Keep(op) => assert!(matches!(
                            combined,
                            Combination::Derived { op: o, .. } if o == op
                        )),
                        Flip(op) => assert_eq!(
                            combined,
                            Combination::Derived {
                                op,
                                left: b,
                                right: a
                            }
                        ),
                        Contra => assert_eq!(combined, Combination::False),
                        Nothing => assert_eq!(combined, Combination::NoCombination),
                    }
                    // a symmetric pair of kinds must agree in both argument orders
                    if alignment == Alignment::Same {
                        let flipped = combination_outcome(k2, k1, alignment);
                        let contra = |o: Outcome| o == Contra;
                        assert_eq!(contra(outcome), contra(flipped), "{k1:?} {k2:?}");
                    }
                }
            }
        }
        assert_eq!(cases, 72);

        // documented entries
        use RelOp::{Eq as EqOp, Eto, Ne, To};
        assert_eq!(combination_outcome(EqOp, Ne, Alignment::Same), Contra);
        assert_eq!(combination_outcome(EqOp, EqOp, Alignment::Same), Keep(EqOp));
        assert_eq!(combination_outcome(To, Eto, Alignment::Same), Keep(To));
        assert_eq!(combination_outcome(EqOp, To, Alignment::Chain), Keep(To));
        assert_eq!(combination_outcome(To, To, Alignment::Swapped), Contra);
        assert_eq!(combination_outcome(Ne, To, Alignment::Chain), Nothing);
        assert_eq!(combination_outcome(RelOp::Separate, EqOp, Alignment::Same), Nothing);
    }

    #[test]
    fn transitive_chain_derives_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut t = TermTable::default();
        let mut r = TransitiveReasoner::default();
        let ab = parse_term(&mut t, "(= a b)").unwrap();
        let bc = parse_term(&mut t, "(< b c)").unwrap();
        let (a, c) = (t.var("a"), t.var("c"));
        assert!(r.process_env_term(&mut t, ab).unwrap());
        assert!(r.process_env_term(&mut t, bc).unwrap());
        assert_eq!(r.decide(&t, RelOp::To, a, c), Some(true));
        assert_eq!(r.decide(&t, RelOp::To, c, a), Some(false));
        let n = r.tables().len();
        assert!(!r.process_env_term(&mut t, bc).unwrap());
        assert!(!r.process_env_term(&mut t, ab).unwrap());
        assert_eq!(r.tables().len(), n);
    }

    #[test]
    fn cycles_and_constants_contradict() {
        let mut t = TermTable::default();
        let mut r = TransitiveReasoner::default();
        for s in ["(< x y)", "(<= y z)"] {
            let f = parse_term(&mut t, s).unwrap();
            r.process_env_term(&mut t, f).unwrap();
        }
        let zx = parse_term(&mut t, "(<= z x)").unwrap();
        let err = r.process_env_term(&mut t, zx).unwrap_err();
        assert!(err.explanation.contains(&zx));
        assert_eq!(err.explanation.len(), 3);

        let mut r = TransitiveReasoner::default();
        let x3 = parse_term(&mut t, "(= x 3)").unwrap();
        let x5 = parse_term(&mut t, "(= x 5)").unwrap();
        r.process_env_term(&mut t, x3).unwrap();
        assert!(r.process_env_term(&mut t, x5).is_err());
    }

    #[test]
    fn constant_bounds_chain_in_any_order() {
        let facts = ["(<= x 5)", "(< x 3)", "(<= y x)"];
        for order in [[0, 1, 2], [1, 0, 2], [2, 1, 0], [2, 0, 1]] {
            let mut t = TermTable::default();
            let mut r = TransitiveReasoner::default();
            let ids: Vec<TermId> = facts.iter().map(|s| parse_term(&mut t, s).unwrap()).collect();
            for i in order {
                r.process_env_term(&mut t, ids[i]).unwrap();
            }
            let (x, y) = (t.var("x"), t.var("y"));
            let (four, five) = (t.int(4), t.int(5));
            assert_eq!(r.decide(&t, RelOp::To, x, five), Some(true), "{order:?}");
            assert_eq!(r.decide(&t, RelOp::Eto, x, five), Some(true), "{order:?}");
            assert_eq!(r.decide(&t, RelOp::To, x, four), Some(true), "{order:?}");
            assert_eq!(r.decide(&t, RelOp::Eto, five, x), Some(false), "{order:?}");
            assert_eq!(r.decide(&t, RelOp::To, y, five), Some(true), "{order:?}");
            assert_eq!(r.decide(&t, RelOp::Eto, y, four), Some(true), "{order:?}");

            // the asserted weaker bound is superseded, and the carried one is
            // explained by the tighter bound alone
            let weak = r.tables().iter().find(|(_, f)| f.source == Some(ids[0])).unwrap();
            assert!(weak.1.unused, "{order:?}");
            let carried = r.tables().lookup(RelOp::To, x, five).unwrap();
            assert_eq!(r.explain(carried), vec![ids[1]], "{order:?}");
        }
    }

    #[test]
    fn opposite_constant_bounds_contradict() {
        let mut t = TermTable::default();
        let mut r = TransitiveReasoner::default();
        let below = parse_term(&mut t, "(< x 3)").unwrap();
        let above = parse_term(&mut t, "(> x 5)").unwrap();
        r.process_env_term(&mut t, below).unwrap();
        let err = r.process_env_term(&mut t, above).unwrap_err();
        let mut why = err.explanation;
        why.sort();
        let mut expected = vec![below, above];
        expected.sort();
        assert_eq!(why, expected);

        // a lower and an upper bound that leave room are fine
        let mut r = TransitiveReasoner::default();
        let above = parse_term(&mut t, "(>= x 1)").unwrap();
        r.process_env_term(&mut t, below).unwrap();
        r.process_env_term(&mut t, above).unwrap();
        let (x, zero, three) = (t.var("x"), t.int(0), t.int(3));
        assert_eq!(r.decide(&t, RelOp::To, zero, x), Some(true));
        assert_eq!(r.decide(&t, RelOp::Eq, x, three), Some(false));
    }

    #[test]
    fn separation_shrinks_unions() {
        let mut t = TermTable::default();
        let mut r = TransitiveReasoner::default();
        let sub = parse_term(&mut t, "(subset x (union a b))").unwrap();
        let sep = parse_term(&mut t, "(separate x a)").unwrap();
        r.process_env_term(&mut t, sub).unwrap();
        r.process_env_term(&mut t, sep).unwrap();
        let (x, b) = (t.var("x"), t.var("b"));
        assert_eq!(r.decide(&t, RelOp::Epo, x, b), Some(true));
        let reduced = r.tables().lookup(RelOp::Epo, x, b).unwrap();
        let mut why = r.explain(reduced);
        why.sort();
        let mut expected = vec![sub, sep];
        expected.sort();
        assert_eq!(why, expected);
    }

    #[test]
    fn scopes_restore_exact_snapshots() {
        let mut t = TermTable::default();
        let mut r = TransitiveReasoner::default();
        let base = parse_term(&mut t, "(< a b)").unwrap();
        r.process_env_term(&mut t, base).unwrap();
        let before = r.tables().clone();

        r.push(&mut t).unwrap();
        for s in ["(< b c)", "(= c d)", "(!= d e)"] {
            let f = parse_term(&mut t, s).unwrap();
            r.process_env_term(&mut t, f).unwrap();
        }
        assert_ne!(r.tables(), &before);
        assert!(r.pop());
        assert!(r.tables().ptr_eq(&before));
        assert_eq!(r.tables(), &before);

        // an extra pop is refused and changes nothing
        assert!(!r.pop());
        assert!(r.tables().ptr_eq(&before));
    }

    #[test]
    fn pushing_the_same_facts_hits_the_memo() {
        let mut t = TermTable::default();
        let mut r = TransitiveReasoner::default();
        let f = parse_term(&mut t, "(< p q)").unwrap();
        r.push(&mut t).unwrap();
        r.add_pending(f);
        r.push(&mut t).unwrap();
        let first = r.tables().clone();
        assert_eq!(r.memo_hits(), 0);
        r.pop();
        r.pop();
        assert!(r.tables().is_empty());

        // the same fact set on the same base comes back from the memo
        r.push(&mut t).unwrap();
        r.add_pending(f);
        r.push(&mut t).unwrap();
        assert_eq!(r.memo_hits(), 1);
        assert!(r.tables().ptr_eq(&first));
        assert_eq!(r.depth(), 2);
    }
}
