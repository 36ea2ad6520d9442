//! # rwkernel
//! rwkernel is the reasoning kernel of an interactive theorem prover. It
//! rewrites hash-consed first-order terms with builtin simplification,
//! user rules, congruence closure and transitive reasoning over relational
//! facts, and drives pattern-directed normalization and best-first proof
//! search on top of them.
//!
//! # Documentation
//! The [`Engine`] is the entry point. Scripts in the small command language
//! understood by [`Engine::parse_and_run_program`] are documented at
//! [`script::Command`].
pub mod builtin;
#[cfg(feature = "bin")]
mod cli;
pub mod congruence;
pub mod env;
pub mod matching;
pub mod normalize;
pub mod parse;
pub mod rewrite;
pub mod script;
pub mod search;
mod serialize;
pub mod symbols;
pub mod term;
pub mod transitive;
pub mod util;

use std::fmt::{self, Display};

use thiserror::Error;

#[cfg(feature = "bin")]
pub use cli::bin::*;
pub use congruence::CongruenceClosure;
pub use env::{Constructor, Env, Rule, TypeDef};
pub use normalize::MatchComparison;
pub use parse::ParseError;
pub use rewrite::Rewriter;
pub use search::{Goals, NodeId, NodeState, SearchNode, SearchReport, SearchSession, Successor};
pub use serialize::SerializeConfig;
pub use term::{QuantKind, Term, TermId, TermTable};
pub use transitive::{RelOp, TransitiveReasoner};

use util::{ListDisplay, SymbolGen};

pub type Symbol = symbol_table::GlobalSymbol;

/// A set of facts that cannot hold together. `explanation` lists the
/// asserted terms involved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contradiction {
    pub explanation: Vec<TermId>,
}

impl Contradiction {
    pub fn display<'a>(&'a self, table: &'a TermTable) -> impl Display + 'a {
        ContradictionDisplay(self, table)
    }
}

struct ContradictionDisplay<'a>(&'a Contradiction, &'a TermTable);

impl Display for ContradictionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ContradictionDisplay(c, table) = self;
        write!(f, "contradiction from {{{}}}", table.display_list(&c.explanation))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Contradiction(String),
    #[error("rule left-hand side must be an application: {0}")]
    BadRule(String),
    #[error("variable {0} is not bound by the left-hand side")]
    UnboundVariable(Symbol),
    #[error("type {0} is already defined")]
    TypeAlreadyDefined(Symbol),
    #[error("no datatype known for {0}")]
    UnknownType(Symbol),
    #[error("no subterm at path [{}]", ListDisplay(.0, " "))]
    InvalidPath(Vec<usize>),
    #[error("tried to pop too much")]
    ScopeUnderflow,
    #[error("check failed: expected {expected}, got {actual}")]
    CheckFailed { expected: String, actual: String },
    #[error("IO error: {0}: {1}")]
    Io(std::path::PathBuf, std::io::Error),
}

/// Tunables of the [`Engine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Merge the operands of an asserted conjunction, the branches of a
    /// decided `ite` and similar consequences into the congruence classes.
    pub do_implications: bool,
    pub max_rewrite_steps: usize,
    pub max_normalize_steps: usize,
    pub max_search_nodes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            do_implications: true,
            max_rewrite_steps: 256,
            max_normalize_steps: 64,
            max_search_nodes: 512,
        }
    }
}

/// Everything a scope push saves: congruence classes and relational facts.
#[derive(Clone, Debug)]
pub struct ReasoningScope {
    pub cc: CongruenceClosure,
    pub trans: TransitiveReasoner,
}

impl ReasoningScope {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cc: CongruenceClosure::new(config.do_implications),
            trans: TransitiveReasoner::default(),
        }
    }

    /// Records `p` as true (or false) in both reasoners.
    pub fn assume(
        &mut self,
        table: &mut TermTable,
        env: &Env,
        p: TermId,
        value: bool,
    ) -> Result<(), Contradiction> {
        if value {
            self.cc.assert_predicate(table, env, p)?;
        } else {
            self.cc.deny_predicate(table, env, p)?;
        }
        for fact in transitive::relational_facts(table, p, value) {
            self.trans.process_env_term(table, fact)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Frame {
    cc: CongruenceClosure,
    env: Env,
}

#[derive(Clone)]
pub struct Engine {
    pub terms: TermTable,
    pub env: Env,
    scope: ReasoningScope,
    stack: Vec<Frame>,
    pub config: EngineConfig,
    gen: SymbolGen,
    session: SearchSession,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            terms: TermTable::default(),
            env: Env::default(),
            scope: ReasoningScope::new(&config),
            stack: vec![],
            config,
            gen: SymbolGen::default(),
            session: SearchSession::default(),
        }
    }

    pub fn scope(&self) -> &ReasoningScope {
        &self.scope
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn parse(&mut self, input: &str) -> Result<TermId, Error> {
        Ok(parse::parse_term(&mut self.terms, input)?)
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), Error> {
        self.env.add_rule(&self.terms, rule)
    }

    pub(crate) fn rewriter(&mut self) -> Rewriter<'_> {
        Rewriter::new(&mut self.terms, &self.env, &mut self.scope, &self.config)
    }

    /// Rewrites `t` to a fixpoint of builtin simplification, congruence,
    /// transitive facts and the rules of the environment.
    pub fn rewrite(&mut self, t: TermId) -> TermId {
        self.rewriter().rewrite(t)
    }

    /// Alternative rewrites of the subterm at `[position_index] ++ path`,
    /// each returned as the whole term with that subterm replaced.
    pub fn special_rewrite(
        &mut self,
        t: TermId,
        position_index: usize,
        path: &[usize],
    ) -> Result<Vec<TermId>, Error> {
        self.rewriter().special_rewrite(t, position_index, path)
    }

    pub fn assert_predicate(&mut self, p: TermId) -> Result<(), Contradiction> {
        self.scope.assume(&mut self.terms, &self.env, p, true)
    }

    pub fn deny_predicate(&mut self, p: TermId) -> Result<(), Contradiction> {
        self.scope.assume(&mut self.terms, &self.env, p, false)
    }

    /// Rewrites `t` towards an instance of `pattern`, whose marked
    /// variables are wildcards. The flag reports whether it matches.
    pub fn normalize(&mut self, pattern: TermId, t: TermId) -> (TermId, bool) {
        let mut rw = self.rewriter();
        normalize::normalize(&mut rw, pattern, t)
    }

    /// One case per constructor of `var`'s datatype: the term with `var`
    /// replaced and the equation `(= var C(..))` that justifies it. A
    /// non-empty `bound_path` locates the quantifier binding `var`.
    pub fn expand_variable(
        &mut self,
        t: TermId,
        var: Symbol,
        bound_path: &[usize],
    ) -> Result<Vec<(TermId, TermId)>, Error> {
        rewrite::expand_variable(
            &mut self.terms,
            &mut self.env,
            &mut self.gen,
            t,
            var,
            bound_path,
        )
    }

    pub fn find_search_node(&self, goals: &Goals) -> Option<NodeId> {
        self.session.find_search_node(goals)
    }

    pub fn add_successor(&mut self, parent: Option<NodeId>, goals: Goals) -> Successor {
        let cost = goals.cost(&self.terms);
        self.session.add_successor(parent, goals, cost, NodeState::Normalize)
    }

    pub fn close_node(&mut self, id: NodeId) {
        self.session.close_node(id)
    }

    /// Best-first search for a proof of `goal` under the current scope.
    /// Each call starts a fresh session.
    pub fn prove(&mut self, goal: TermId) -> SearchReport {
        let goals = Goals::new(vec![], vec![goal]);
        let mut session = SearchSession::default();
        let report = session.prove(self, goals);
        self.session = session;
        report
    }

    /// Opens a scope. Facts asserted since the last push are flushed into
    /// the transitive tables first.
    pub fn trans_push(&mut self) -> Result<(), Contradiction> {
        self.stack.push(Frame {
            cc: self.scope.cc.clone(),
            env: self.env.clone(),
        });
        self.scope.trans.push(&mut self.terms)
    }

    /// Restores the state saved by the matching [`Engine::trans_push`].
    pub fn trans_pop(&mut self) -> Result<(), Error> {
        let Some(frame) = self.stack.pop() else {
            log::warn!("pop without a matching push");
            return Err(Error::ScopeUnderflow);
        };
        self.scope.cc = frame.cc;
        self.env = frame.env;
        self.scope.trans.pop();
        Ok(())
    }

    /// Runs `f` in a scope that is popped again afterwards. Types given to
    /// fresh variables inside survive, since the variables may escape in
    /// the result.
    pub(crate) fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let frame = Frame {
            cc: self.scope.cc.clone(),
            env: self.env.clone(),
        };
        let trans = self.scope.trans.clone();
        let result = f(self);
        let inner = std::mem::replace(&mut self.env, frame.env);
        self.env.keep_var_types(&inner);
        self.scope.cc = frame.cc;
        self.scope.trans = trans;
        result
    }

    /// Knuth-Bendix critical pairs between every two rules of the
    /// environment, oriented as new rules. Nothing is added.
    pub fn critical_pairs(&mut self) -> Vec<Rule> {
        let rules: Vec<Rule> = self.env.rules().copied().collect();
        let mut out: Vec<Rule> = vec![];
        for rule in &rules {
            for new in builtin::kb_set(&mut self.terms, rule, &rules) {
                let lhs = self.rewrite(new.lhs);
                let rhs = self.rewrite(new.rhs);
                if lhs == rhs {
                    continue;
                }
                let new = match self.terms.compare(lhs, rhs) {
                    std::cmp::Ordering::Less => Rule::new(rhs, lhs),
                    _ => Rule::new(lhs, rhs),
                };
                if !out.contains(&new) {
                    out.push(new);
                }
            }
        }
        out
    }

    pub fn contradiction_error(&self, c: &Contradiction) -> Error {
        Error::Contradiction(c.display(&self.terms).to_string())
    }
}
