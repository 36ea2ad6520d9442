//! Best-first proof search.
//!
//! A search node holds a goal state: hypotheses and the goals still to be
//! shown, all of which must hold. Nodes are created open, keyed by their
//! goal state, and move to the closed table exactly once when they are
//! expanded. A goal state that has been closed is never added again.

use std::fmt::{self, Display, Formatter};

use instant::{Duration, Instant};

use crate::{
    symbols::*,
    term::{QuantKind, Subst, Term, TermId, TermTable},
    util::{HashMap, IndexMap},
    Engine, Symbol,
};

pub type NodeId = usize;

/// Hypotheses and the conjunction of goals to prove from them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Goals {
    pub hyps: Vec<TermId>,
    pub goals: Vec<TermId>,
}

impl Goals {
    pub fn new(hyps: Vec<TermId>, goals: Vec<TermId>) -> Self {
        Self { hyps, goals }
    }

    /// Total size of the goals; smaller states are expanded first.
    pub fn cost(&self, table: &TermTable) -> usize {
        self.goals.iter().map(|g| table.size(*g)).sum()
    }

    pub fn display<'a>(&'a self, table: &'a TermTable) -> impl Display + 'a {
        GoalsDisplay(self, table)
    }
}

struct GoalsDisplay<'a>(&'a Goals, &'a TermTable);

impl Display for GoalsDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let GoalsDisplay(g, table) = self;
        write!(
            f,
            "[{}] |- [{}]",
            table.display_list(&g.hyps),
            table.display_list(&g.goals)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Closed,
    /// Open, reached by rewriting its parent's goals.
    Normalize,
    /// Open, reached by splitting its parent's first goal.
    Branch,
}

#[derive(Clone, Debug)]
pub struct SearchNode {
    pub goals: Goals,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: usize,
    pub cost: usize,
    pub state: NodeState,
}

/// Result of [`SearchSession::add_successor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Successor {
    Added(NodeId),
    /// The goal state is already open under this node.
    Open(NodeId),
    /// The goal state was closed before.
    Rejected(NodeId),
}

#[derive(Clone, Debug, Default)]
pub struct SearchSession {
    nodes: Vec<SearchNode>,
    open: IndexMap<Goals, NodeId>,
    closed: HashMap<Goals, NodeId>,
}

#[derive(Clone, Debug, Default)]
pub struct SearchReport {
    pub proved: bool,
    /// The node whose goals were all discharged.
    pub proof: Option<NodeId>,
    pub expanded: usize,
    pub nodes: usize,
    pub elapsed: Duration,
}

impl Display for SearchReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after expanding {} of {} nodes in {:.3}s",
            if self.proved { "proved" } else { "not proved" },
            self.expanded,
            self.nodes,
            self.elapsed.as_secs_f64()
        )
    }
}

enum Expansion {
    Proved,
    Dead,
    Successors(Vec<(Goals, NodeState)>),
}

impl SearchSession {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id]
    }

    pub fn num_open(&self) -> usize {
        self.open.len()
    }

    pub fn num_closed(&self) -> usize {
        self.closed.len()
    }

    /// The node holding exactly this goal state, open or closed.
    pub fn find_search_node(&self, goals: &Goals) -> Option<NodeId> {
        self.open
            .get(goals)
            .or_else(|| self.closed.get(goals))
            .copied()
    }

    pub fn add_successor(
        &mut self,
        parent: Option<NodeId>,
        goals: Goals,
        cost: usize,
        state: NodeState,
    ) -> Successor {
        if let Some(id) = self.closed.get(&goals) {
            return Successor::Rejected(*id);
        }
        if let Some(id) = self.open.get(&goals) {
            return Successor::Open(*id);
        }
        let id = self.nodes.len();
        let depth = parent.map_or(0, |p| self.nodes[p].depth + 1);
        self.nodes.push(SearchNode {
            goals: goals.clone(),
            parent,
            children: vec![],
            depth,
            cost: cost + depth,
            state,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        self.open.insert(goals, id);
        Successor::Added(id)
    }

    /// Moves a node from the open to the closed table. Closing a closed
    /// node does nothing.
    pub fn close_node(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        if node.state == NodeState::Closed {
            return;
        }
        node.state = NodeState::Closed;
        self.open.swap_remove(&node.goals);
        self.closed.insert(node.goals.clone(), id);
    }

    /// The cheapest open node, oldest first on ties.
    pub fn pop_best(&self) -> Option<NodeId> {
        self.open
            .values()
            .copied()
            .min_by_key(|id| (self.nodes[*id].cost, *id))
    }

    /// Expands nodes cheapest first until one has no goals left, the open
    /// table runs dry or the node limit is hit.
    pub fn prove(&mut self, engine: &mut Engine, goals: Goals) -> SearchReport {
        let start = Instant::now();
        let mut report = SearchReport::default();
        let cost = goals.cost(&engine.terms);
        if let Successor::Rejected(_) = self.add_successor(None, goals, cost, NodeState::Normalize) {
            return report;
        }
        while let Some(id) = self.pop_best() {
            if report.expanded >= engine.config.max_search_nodes {
                log::warn!("search stopped after {} nodes", report.expanded);
                break;
            }
            report.expanded += 1;
            self.close_node(id);
            let goals = self.nodes[id].goals.clone();
            log::debug!("expanding {}", goals.display(&engine.terms));
            match engine.scoped(|e| expand(e, &goals)) {
                Expansion::Proved => {
                    report.proved = true;
                    report.proof = Some(id);
                    break;
                }
                Expansion::Dead => {}
                Expansion::Successors(next) => {
                    for (goals, state) in next {
                        let cost = goals.cost(&engine.terms);
                        if let Successor::Rejected(old) =
                            self.add_successor(Some(id), goals, cost, state)
                        {
                            log::trace!("goal state of node {old} was closed before");
                        }
                    }
                }
            }
        }
        report.nodes = self.nodes.len();
        report.elapsed = start.elapsed();
        log::info!("{report}");
        report
    }
}

fn expand(e: &mut Engine, goals: &Goals) -> Expansion {
    for h in &goals.hyps {
        if let Err(c) = e.assert_predicate(*h) {
            log::debug!("hypotheses are inconsistent: {}", c.display(&e.terms));
            return Expansion::Proved;
        }
    }
    let mut remaining = vec![];
    for g in &goals.goals {
        let r = e.rewrite(*g);
        if e.terms.is_true(r) {
            continue;
        }
        if e.terms.is_false(r) {
            return Expansion::Dead;
        }
        if !remaining.contains(&r) {
            remaining.push(r);
        }
    }
    let Some((&first, rest)) = remaining.split_first() else {
        return Expansion::Proved;
    };
    if remaining != goals.goals {
        let next = Goals::new(goals.hyps.clone(), remaining.clone());
        return Expansion::Successors(vec![(next, NodeState::Normalize)]);
    }
    let with_goals = |front: Vec<TermId>| {
        let mut g = front;
        g.extend_from_slice(rest);
        g
    };
    if let Some(args) = e.terms.app_of(first, *AND) {
        let next = Goals::new(goals.hyps.clone(), with_goals(args.to_vec()));
        return Expansion::Successors(vec![(next, NodeState::Branch)]);
    }
    if let Some(&[a, b]) = e.terms.app_of(first, *IMPLIES) {
        let mut hyps = goals.hyps.clone();
        hyps.push(a);
        let next = Goals::new(hyps, with_goals(vec![b]));
        return Expansion::Successors(vec![(next, NodeState::Branch)]);
    }
    if let Term::Quant {
        kind: QuantKind::All,
        vars,
        body,
        cond,
    } = e.terms.get(first).clone()
    {
        let goal = instantiate(e, &vars, body, cond);
        let next = Goals::new(goals.hyps.clone(), with_goals(vec![goal]));
        return Expansion::Successors(vec![(next, NodeState::Branch)]);
    }
    for v in e.terms.free_vars(first) {
        if e.env.var_type(v).and_then(|ty| e.env.type_definition(ty)).is_none() {
            continue;
        }
        let Ok(cases) = e.expand_variable(first, v, &[]) else {
            continue;
        };
        let split = cases
            .into_iter()
            .map(|(case, witness)| e.terms.app(*IMPLIES, vec![witness, case]))
            .collect();
        let next = Goals::new(goals.hyps.clone(), with_goals(split));
        return Expansion::Successors(vec![(next, NodeState::Branch)]);
    }
    Expansion::Dead
}

/// Replaces the bound variables of a universal goal by fresh free ones,
/// keeping their declared types.
fn instantiate(e: &mut Engine, vars: &[Symbol], body: TermId, cond: TermId) -> TermId {
    let mut subst = Subst::default();
    for v in vars {
        let fresh = Symbol::from(e.gen.fresh(v.as_str()).as_str());
        if let Some(ty) = e.env.var_type(*v) {
            e.env.declare_var(fresh, ty);
        }
        let (old, new) = (e.terms.var(*v), e.terms.var(fresh));
        subst.insert(old, new);
    }
    let body = e.terms.substitute(body, &subst);
    let cond = e.terms.substitute(cond, &subst);
    if e.terms.is_true(cond) {
        body
    } else {
        e.terms.app(*IMPLIES, vec![cond, body])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Constructor, Rule, TypeDef};

    fn goals(e: &mut Engine, hyps: &[&str], gs: &[&str]) -> Goals {
        let hyps = hyps.iter().map(|h| e.parse(h).unwrap()).collect();
        let gs = gs.iter().map(|g| e.parse(g).unwrap()).collect();
        Goals::new(hyps, gs)
    }

    #[test]
    fn open_and_closed_tables() {
        let mut e = Engine::default();
        let g = goals(&mut e, &[], &["(p a)"]);
        let h = goals(&mut e, &["(q a)"], &["(p a)"]);
        let root = match e.add_successor(None, g.clone()) {
            Successor::Added(id) => id,
            other => panic!("{other:?}"),
        };
        assert_eq!(e.add_successor(None, g.clone()), Successor::Open(root));
        assert_eq!(e.find_search_node(&g), Some(root));
        let Successor::Added(child) = e.add_successor(Some(root), h.clone()) else {
            panic!()
        };
        assert_eq!(e.session().node(root).children, vec![child]);
        assert_eq!(e.session().node(child).depth, 1);

        e.close_node(root);
        e.close_node(root);
        assert_eq!(e.session().num_closed(), 1);
        assert_eq!(e.session().num_open(), 1);
        assert_eq!(e.session().node(root).state, NodeState::Closed);
        assert_eq!(e.add_successor(None, g.clone()), Successor::Rejected(root));
        assert_eq!(e.find_search_node(&g), Some(root));
        assert_eq!(e.session().pop_best(), Some(child));
    }

    #[test]
    fn proves_transitive_implication() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut e = Engine::default();
        let goal = e.parse("(=> (and (< a b) (< b c)) (< a c))").unwrap();
        let report = e.prove(goal);
        assert!(report.proved, "{report}");
        // the search leaves the engine's scope alone
        let a = e.parse("a").unwrap();
        assert!(!e.scope().cc.is_registered(a));
    }

    #[test]
    fn proves_universal_goal() {
        let mut e = Engine::default();
        let lhs = e.parse("(double x)").unwrap();
        let rhs = e.parse("(+ x x)").unwrap();
        e.add_rule(Rule::new(lhs, rhs)).unwrap();
        let goal = e.parse("(all (n) (= (double n) (+ n n)))").unwrap();
        assert!(e.prove(goal).proved);
    }

    #[test]
    fn case_split_over_constructors() {
        let mut e = Engine::default();
        e.env
            .add_type(TypeDef {
                name: "color".into(),
                constructors: vec![
                    Constructor {
                        name: "red".into(),
                        args: vec![],
                    },
                    Constructor {
                        name: "green".into(),
                        args: vec![],
                    },
                ],
            })
            .unwrap();
        e.env.declare_var("c".into(), "color".into());
        for (l, r) in [("(flip (red))", "(green)"), ("(flip (green))", "(red)")] {
            let (l, r) = (e.parse(l).unwrap(), e.parse(r).unwrap());
            e.add_rule(Rule::new(l, r)).unwrap();
        }
        let goal = e.parse("(= (flip (flip c)) c)").unwrap();
        let report = e.prove(goal);
        assert!(report.proved, "{report}");
        assert!(report.expanded >= 2);
    }

    #[test]
    fn unprovable_goal_runs_dry() {
        let mut e = Engine::default();
        let goal = e.parse("(p a)").unwrap();
        let report = e.prove(goal);
        assert!(!report.proved);
        assert_eq!(report.expanded, 1);

        let goal = e.parse("(= 1 2)").unwrap();
        assert!(!e.prove(goal).proved);
    }
}
