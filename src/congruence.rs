//! Congruence closure with explanations.
//!
//! Every registered term is a node with a union-find parent (`find`), a
//! proof-forest edge (`expl`) and, for class roots, the applications that
//! use a member of the class as an argument. All state lives in persistent
//! maps, so cloning a [`CongruenceClosure`] is a constant time snapshot.

use std::collections::VecDeque;

use crate::{
    builtin::{self, is_predicate},
    env::Env,
    symbols::*,
    term::{Term, TermId, TermTable},
    util::{HashMap, HashSet, PMap},
    Contradiction, Symbol,
};

/// Why two nodes were merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expl {
    /// An asserted or denied predicate.
    Asserted(TermId),
    /// Two applications with pairwise equal arguments.
    Congruence(TermId, TermId),
    /// `term` with its arguments replaced by their roots (`sig`) simplified
    /// to the other side.
    Simplified { term: TermId, sig: TermId },
    /// A consequence of `by` being equal to the boolean constant `value`.
    Implied { by: TermId, value: TermId },
    /// Arguments of two equal applications of the same constructor.
    Injective(TermId, TermId),
}

#[derive(Clone, Debug, PartialEq)]
struct Node {
    /// Union-find parent, `None` for roots.
    find: Option<TermId>,
    /// Proof forest edge.
    expl: Option<(TermId, Expl)>,
    /// Applications with an argument in this class. Only kept up to date on
    /// roots.
    used_in: im_rc::Vector<TermId>,
    /// Class members, on roots.
    members: im_rc::Vector<TermId>,
    /// Some constructor application in the class, on roots.
    ctor: Option<TermId>,
}

impl Node {
    fn new(t: TermId) -> Self {
        Node {
            find: None,
            expl: None,
            used_in: im_rc::Vector::new(),
            members: im_rc::Vector::unit(t),
            ctor: None,
        }
    }
}

#[derive(Debug)]
enum Task {
    Merge(TermId, TermId, Expl),
    UpdateSig(TermId),
    Implications(TermId, TermId),
}

/// Congruence closure state.
#[derive(Clone, Debug)]
pub struct CongruenceClosure {
    nodes: PMap<TermId, Node>,
    /// Signature (an application over class roots) to a node carrying it.
    sigs: PMap<TermId, TermId>,
    /// Registration order, for deterministic iteration.
    order: im_rc::Vector<TermId>,
    pub do_implications: bool,
}

impl Default for CongruenceClosure {
    fn default() -> Self {
        CongruenceClosure {
            nodes: Default::default(),
            sigs: Default::default(),
            order: Default::default(),
            do_implications: true,
        }
    }
}

impl PartialEq for CongruenceClosure {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.sigs == other.sigs && self.order == other.order
    }
}

/// Merge context: the queue and the flags of one top level call.
struct Merger<'a> {
    table: &'a mut TermTable,
    env: &'a Env,
    tasks: VecDeque<Task>,
    disallow_const: bool,
}

impl Merger<'_> {
    /// Merges `target` with the boolean `holds`, because `by` is in the
    /// class of the boolean constant `by_value`.
    fn imply(&mut self, by: TermId, by_value: TermId, target: TermId, holds: bool) {
        let target_value = self.table.bool_term(holds);
        self.tasks.push_back(Task::Merge(
            target,
            target_value,
            Expl::Implied {
                by,
                value: by_value,
            },
        ));
    }
}

impl CongruenceClosure {
    pub fn new(do_implications: bool) -> Self {
        CongruenceClosure {
            do_implications,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_registered(&self, t: TermId) -> bool {
        self.nodes.contains_key(&t)
    }

    /// Registered terms in registration order.
    pub fn terms(&self) -> impl Iterator<Item = TermId> + '_ {
        self.order.iter().copied()
    }

    fn node(&self, t: TermId) -> &Node {
        self.nodes
            .get(&t)
            .unwrap_or_else(|| panic!("term {t} is not registered"))
    }

    fn node_mut(&mut self, t: TermId) -> &mut Node {
        self.nodes
            .get_mut(&t)
            .unwrap_or_else(|| panic!("term {t} is not registered"))
    }

    /// Root of the class of `t`. Unregistered terms are their own root.
    pub fn find(&self, t: TermId) -> TermId {
        let mut i = t;
        let mut steps = 0;
        while let Some(parent) = self.nodes.get(&i).and_then(|n| n.find) {
            i = parent;
            steps += 1;
            if steps > self.nodes.len() {
                panic!("cycle in the union-find forest at {t}");
            }
        }
        i
    }

    pub fn are_equal(&self, a: TermId, b: TermId) -> bool {
        a == b || self.find(a) == self.find(b)
    }

    /// Members of the class of `t`, root included.
    pub fn members(&self, t: TermId) -> Vec<TermId> {
        let root = self.find(t);
        match self.nodes.get(&root) {
            Some(node) => node.members.iter().copied().collect(),
            None => vec![t],
        }
    }

    /// Registers `t` and its subterms. A new subterm may be congruent to a
    /// known one, so registering can merge classes and fail.
    pub fn add(
        &mut self,
        table: &mut TermTable,
        env: &Env,
        t: TermId,
    ) -> Result<TermId, Contradiction> {
        let mut m = Merger {
            table,
            env,
            tasks: VecDeque::new(),
            disallow_const: true,
        };
        self.register(&mut m, t);
        self.run(&mut m)?;
        Ok(self.find(t))
    }

    fn register(&mut self, m: &mut Merger<'_>, t: TermId) {
        if self.nodes.contains_key(&t) {
            return;
        }
        let mut node = Node::new(t);
        if m.env.is_constructor_app(m.table, t) {
            node.ctor = Some(t);
        }
        self.nodes.insert(t, node);
        self.order.push_back(t);
        if let Term::App(_, args) = m.table.get(t) {
            let args = args.clone();
            for a in args {
                self.register(m, a);
                let root = self.find(a);
                let used_in = &mut self.node_mut(root).used_in;
                if !used_in.contains(&t) {
                    used_in.push_back(t);
                }
            }
            m.tasks.push_back(Task::UpdateSig(t));
        }
    }

    /// Merges the classes of `left` and `right` and closes under congruence.
    /// With `disallow_const`, merging two distinct constants (or two distinct
    /// constructors of one datatype) is a contradiction. Nothing is rolled
    /// back on failure.
    pub fn merge(
        &mut self,
        table: &mut TermTable,
        env: &Env,
        left: TermId,
        right: TermId,
        expl: Expl,
        disallow_const: bool,
    ) -> Result<(), Contradiction> {
        let mut m = Merger {
            table,
            env,
            tasks: VecDeque::new(),
            disallow_const,
        };
        self.register(&mut m, left);
        self.register(&mut m, right);
        m.tasks.push_front(Task::Merge(left, right, expl));
        self.run(&mut m)
    }

    fn run(&mut self, m: &mut Merger<'_>) -> Result<(), Contradiction> {
        while let Some(task) = m.tasks.pop_front() {
            match task {
                Task::UpdateSig(t) => self.update_sig(m, t),
                Task::Merge(a, b, expl) => self.merge_classes(m, a, b, expl)?,
                Task::Implications(t, value) => self.add_implications(m, t, value),
            }
        }
        Ok(())
    }

    fn update_sig(&mut self, m: &mut Merger<'_>, t: TermId) {
        let Term::App(f, args) = m.table.get(t).clone() else {
            return;
        };
        let roots: Vec<TermId> = args.iter().map(|a| self.find(*a)).collect();
        let sig = m.table.app(f, roots);
        let simplified = builtin::simplify_deep(m.env, m.table, sig);
        if simplified != sig && simplified != t {
            self.register(m, simplified);
            if self.find(simplified) != self.find(t) {
                log::trace!(
                    "{} simplifies to {}",
                    m.table.display(t),
                    m.table.display(simplified)
                );
                m.tasks
                    .push_back(Task::Merge(t, simplified, Expl::Simplified { term: t, sig }));
            }
        }
        match self.sigs.get(&sig) {
            Some(&other) if other != t => {
                if self.find(other) != self.find(t) {
                    m.tasks
                        .push_front(Task::Merge(t, other, Expl::Congruence(t, other)));
                }
            }
            Some(_) => {}
            None => {
                self.sigs.insert(sig, t);
            }
        }
    }

    fn merge_classes(
        &mut self,
        m: &mut Merger<'_>,
        a: TermId,
        b: TermId,
        expl: Expl,
    ) -> Result<(), Contradiction> {
        self.register(m, a);
        self.register(m, b);
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Ok(());
        }
        self.reroot_at(a);
        self.node_mut(a).expl = Some((b, expl));

        if m.disallow_const && m.table.is_constant(ra) && m.table.is_constant(rb) {
            let explanation = self.explain(m.table, ra, rb);
            log::debug!(
                "contradiction: {} = {}",
                m.table.display(ra),
                m.table.display(rb)
            );
            return Err(Contradiction { explanation });
        }

        let (winner, loser) = if m.table.compare(ra, rb).is_lt() {
            (ra, rb)
        } else {
            (rb, ra)
        };
        log::debug!(
            "merge {} into {}",
            m.table.display(loser),
            m.table.display(winner)
        );
        for start in [a, b] {
            let mut n = start;
            while n != winner {
                let next = self.node(n).find;
                self.node_mut(n).find = Some(winner);
                match next {
                    Some(p) => n = p,
                    None => break,
                }
            }
        }

        let loser_node = self.node(loser).clone();
        for parent in loser_node.used_in.iter() {
            m.tasks.push_back(Task::UpdateSig(*parent));
        }
        let winner_ctor = self.node(winner).ctor;
        {
            let w = self.node_mut(winner);
            for p in loser_node.used_in.iter() {
                if !w.used_in.contains(p) {
                    w.used_in.push_back(*p);
                }
            }
            w.members.append(loser_node.members.clone());
            w.ctor = winner_ctor.or(loser_node.ctor);
        }
        {
            let l = self.node_mut(loser);
            l.used_in = im_rc::Vector::new();
            l.members = im_rc::Vector::new();
        }

        if let (Some(c1), Some(c2)) = (winner_ctor, loser_node.ctor) {
            self.constructor_clash(m, c1, c2)?;
        }

        if self.do_implications && m.table.is_bool_constant(winner) {
            for t in loser_node.members.iter() {
                m.tasks.push_back(Task::Implications(*t, winner));
            }
        }
        Ok(())
    }

    fn constructor_clash(
        &mut self,
        m: &mut Merger<'_>,
        c1: TermId,
        c2: TermId,
    ) -> Result<(), Contradiction> {
        let (Term::App(f, xs), Term::App(g, ys)) = (m.table.get(c1).clone(), m.table.get(c2).clone())
        else {
            return Ok(());
        };
        if f == g && xs.len() == ys.len() {
            for (x, y) in xs.into_iter().zip(ys) {
                m.tasks
                    .push_back(Task::Merge(x, y, Expl::Injective(c1, c2)));
            }
            Ok(())
        } else if m.disallow_const && m.env.constructor_type(f) == m.env.constructor_type(g) {
            let explanation = self.explain(m.table, c1, c2);
            log::debug!(
                "contradiction: constructors {} and {}",
                m.table.display(c1),
                m.table.display(c2)
            );
            Err(Contradiction { explanation })
        } else {
            Ok(())
        }
    }

    fn registered(&self, table: &TermTable, f: Symbol, args: &[TermId]) -> Option<TermId> {
        table
            .lookup(&Term::App(f, args.to_vec()))
            .filter(|t| self.is_registered(*t))
    }

    /// Quick consequences of `t` becoming equal to the boolean `value`.
    fn add_implications(&mut self, m: &mut Merger<'_>, t: TermId, value: TermId) {
        let holds = m.table.is_true(value);
        let Term::App(f, args) = m.table.get(t).clone() else {
            return;
        };
        match args[..] {
            [p] if f == *NOT => m.imply(t, value, p, !holds),
            [a, b] if f == *EQUAL && holds => {
                m.tasks
                    .push_back(Task::Merge(a, b, Expl::Implied { by: t, value }));
                for (rel, related) in [(*LESS, false), (*LESS_EQ, true)] {
                    for pair in [[a, b], [b, a]] {
                        if let Some(r) = self.registered(m.table, rel, &pair) {
                            m.imply(t, value, r, related);
                        }
                    }
                }
            }
            [a, b] if f == *LESS => {
                if holds {
                    if let Some(r) = self.registered(m.table, *LESS_EQ, &[a, b]) {
                        m.imply(t, value, r, true);
                    }
                    if let Some(r) = self.registered(m.table, *LESS, &[b, a]) {
                        m.imply(t, value, r, false);
                    }
                    for pair in [[a, b], [b, a]] {
                        if let Some(r) = self.registered(m.table, *EQUAL, &pair) {
                            m.imply(t, value, r, false);
                        }
                    }
                } else if let Some(r) = self.registered(m.table, *LESS_EQ, &[b, a]) {
                    m.imply(t, value, r, true);
                }
            }
            [a, b] if f == *LESS_EQ && !holds => {
                if let Some(r) = self.registered(m.table, *LESS, &[b, a]) {
                    m.imply(t, value, r, true);
                }
            }
            _ if f == *AND && holds => {
                for &p in &args {
                    m.imply(t, value, p, true);
                }
            }
            _ if f == *OR && !holds => {
                for &p in &args {
                    m.imply(t, value, p, false);
                }
            }
            _ => {}
        }
    }

    /// Re-roots the proof forest at `i`.
    fn reroot_at(&mut self, mut i: TermId) {
        let mut prev: Option<(TermId, Expl)> = None;
        loop {
            let node = self.node_mut(i);
            match node.expl {
                None => {
                    node.expl = prev;
                    return;
                }
                Some((j, e)) => {
                    node.expl = prev;
                    prev = Some((i, e));
                    i = j;
                }
            }
        }
    }

    fn common_ancestor(&self, a: TermId, b: TermId) -> Option<TermId> {
        let mut on_path = HashSet::default();
        let mut i = a;
        loop {
            on_path.insert(i);
            match self.node(i).expl {
                Some((j, _)) => i = j,
                None => break,
            }
        }
        let mut i = b;
        loop {
            if on_path.contains(&i) {
                return Some(i);
            }
            match self.node(i).expl {
                Some((j, _)) => i = j,
                None => return None,
            }
        }
    }

    /// Asserted predicates that justify `a = b`, by walking the proof
    /// forest. Panics if the terms are not known to be equal.
    pub fn explain(&self, table: &TermTable, a: TermId, b: TermId) -> Vec<TermId> {
        let mut out = vec![];
        let mut todo = vec![(a, b)];
        let mut done: HashSet<(TermId, TermId)> = HashSet::default();
        while let Some((a, b)) = todo.pop() {
            if a == b || !done.insert((a, b)) {
                continue;
            }
            let Some(middle) = self.common_ancestor(a, b) else {
                panic!("explaining {a} = {b}, which are not in one class");
            };
            for start in [a, b] {
                let mut i = start;
                while i != middle {
                    let Some((j, e)) = self.node(i).expl else {
                        break;
                    };
                    match e {
                        Expl::Asserted(p) => {
                            if !out.contains(&p) {
                                out.push(p);
                            }
                        }
                        Expl::Congruence(x, y) => {
                            todo.extend(table.args(x).iter().copied().zip(table.args(y).iter().copied()));
                        }
                        Expl::Simplified { term, sig } => {
                            todo.extend(
                                table.args(term).iter().copied().zip(table.args(sig).iter().copied()),
                            );
                        }
                        Expl::Implied { by, value } => todo.push((by, value)),
                        Expl::Injective(c1, c2) => todo.push((c1, c2)),
                    }
                    i = j;
                }
            }
        }
        out
    }

    /// Rewrites `t` bottom-up, replacing every registered subterm by the
    /// root of its class. Applications whose signature is known take the
    /// root of the matching class.
    pub fn canonical(&self, table: &mut TermTable, t: TermId) -> TermId {
        let mut cache = HashMap::default();
        self.canonical_rec(table, t, &mut cache)
    }

    fn canonical_rec(
        &self,
        table: &mut TermTable,
        t: TermId,
        cache: &mut HashMap<TermId, TermId>,
    ) -> TermId {
        if let Some(done) = cache.get(&t) {
            return *done;
        }
        let result = if self.is_registered(t) {
            self.find(t)
        } else {
            match table.get(t).clone() {
                Term::App(f, args) => {
                    let args: Vec<TermId> = args
                        .into_iter()
                        .map(|a| self.canonical_rec(table, a, cache))
                        .collect();
                    let sig = table.app(f, args);
                    match self.sigs.get(&sig) {
                        Some(node) => self.find(*node),
                        None => sig,
                    }
                }
                _ => t,
            }
        };
        cache.insert(t, result);
        result
    }

    /// Asserts `p`: it is merged with `True` (or with `False` when `value`
    /// is false). `source` is the term reported in explanations.
    fn assert_value(
        &mut self,
        table: &mut TermTable,
        env: &Env,
        p: TermId,
        value: bool,
        source: TermId,
    ) -> Result<(), Contradiction> {
        let p = builtin::simplify_deep(env, table, p);
        if table.is_bool_constant(p) {
            return if table.is_true(p) == value {
                Ok(())
            } else {
                Err(Contradiction {
                    explanation: vec![source],
                })
            };
        }
        if let Some(&[q]) = table.app_of(p, *NOT) {
            return self.assert_value(table, env, q, !value, source);
        }
        if let Some(&[x, c]) = table.app_of(p, *EQUAL) {
            if table.is_bool_constant(c) {
                let v = table.is_true(c);
                return self.assert_value(table, env, x, v == value, source);
            }
            if value {
                self.merge(table, env, x, c, Expl::Asserted(source), true)?;
            }
        }
        let target = table.bool_term(value);
        self.merge(table, env, p, target, Expl::Asserted(source), true)?;
        self.check_cycle_rless(table)
    }

    pub fn assert_predicate(
        &mut self,
        table: &mut TermTable,
        env: &Env,
        p: TermId,
    ) -> Result<(), Contradiction> {
        self.assert_value(table, env, p, true, p)
    }

    pub fn deny_predicate(
        &mut self,
        table: &mut TermTable,
        env: &Env,
        p: TermId,
    ) -> Result<(), Contradiction> {
        let source = table.app(*NOT, vec![p]);
        self.assert_value(table, env, p, false, source)
    }

    /// Looks for a cycle through at least one strict edge in the graph of
    /// known `<` and `<=` facts between class roots.
    pub fn check_cycle_rless(&self, table: &TermTable) -> Result<(), Contradiction> {
        // (from, to, strict, fact)
        let mut edges: Vec<(TermId, TermId, bool, TermId)> = vec![];
        for t in self.terms() {
            let root = self.find(t);
            if !table.is_bool_constant(root) || !is_predicate(table, t) {
                continue;
            }
            let holds = table.is_true(root);
            let Term::App(f, args) = table.get(t) else {
                continue;
            };
            let &[a, b] = &args[..] else {
                continue;
            };
            let (a, b) = (self.find(a), self.find(b));
            let edge = match (*f, holds) {
                (f, true) if f == *LESS => (a, b, true),
                (f, true) if f == *LESS_EQ => (a, b, false),
                (f, false) if f == *LESS => (b, a, false),
                (f, false) if f == *LESS_EQ => (b, a, true),
                _ => continue,
            };
            edges.push((edge.0, edge.1, edge.2, t));
        }
        let mut succ: HashMap<TermId, Vec<usize>> = HashMap::default();
        for (i, (from, ..)) in edges.iter().enumerate() {
            succ.entry(*from).or_default().push(i);
        }
        for (i, &(from, to, strict, _)) in edges.iter().enumerate() {
            if !strict {
                continue;
            }
            // search a path back from `to` to `from`
            let mut via: HashMap<TermId, usize> = HashMap::default();
            let mut queue = VecDeque::from([to]);
            let mut seen = HashSet::default();
            seen.insert(to);
            while let Some(n) = queue.pop_front() {
                if n == from {
                    let mut cycle = vec![i];
                    let mut cur = from;
                    while cur != to {
                        let e = via[&cur];
                        cycle.push(e);
                        cur = edges[e].0;
                    }
                    let mut explanation = vec![];
                    for e in cycle {
                        let fact = edges[e].3;
                        for s in self.explain(table, fact, self.find(fact)) {
                            if !explanation.contains(&s) {
                                explanation.push(s);
                            }
                        }
                    }
                    log::debug!("cycle through a strict order over {} facts", explanation.len());
                    return Err(Contradiction { explanation });
                }
                for &e in succ.get(&n).into_iter().flatten() {
                    let next = edges[e].1;
                    if seen.insert(next) {
                        via.insert(next, e);
                        queue.push_back(next);
                    }
                }
            }
        }
        Ok(())
    }

    /// Every class, each listed root first.
    pub fn classes(&self) -> Vec<Vec<TermId>> {
        self.terms()
            .filter(|t| self.node(*t).find.is_none())
            .map(|root| self.members(root))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Constructor, TypeDef};
    use crate::parse::parse_term;

    fn setup() -> (TermTable, Env, CongruenceClosure) {
        (TermTable::default(), Env::default(), CongruenceClosure::default())
    }

    fn asserted(t: &mut TermTable, s: &str) -> (TermId, Expl) {
        let p = parse_term(t, s).unwrap();
        (p, Expl::Asserted(p))
    }

    #[test]
    fn congruence_is_sound_and_transitive() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut t, env, mut cc) = setup();
        let fa = parse_term(&mut t, "(f a)").unwrap();
        let fc = parse_term(&mut t, "(f c)").unwrap();
        cc.add(&mut t, &env, fa).unwrap();
        cc.add(&mut t, &env, fc).unwrap();
        let (a, b, c) = (t.var("a"), t.var("b"), t.var("c"));
        let (_, e1) = asserted(&mut t, "(= a b)");
        let (_, e2) = asserted(&mut t, "(= b c)");
        cc.merge(&mut t, &env, a, b, e1, true).unwrap();
        cc.merge(&mut t, &env, b, c, e2, true).unwrap();
        assert_eq!(cc.find(a), cc.find(c));
        assert!(cc.are_equal(fa, fc));
        let mut why = cc.explain(&t, fa, fc);
        why.sort();
        let Expl::Asserted(p1) = e1 else { unreachable!() };
        let Expl::Asserted(p2) = e2 else { unreachable!() };
        let mut expected = vec![p1, p2];
        expected.sort();
        assert_eq!(why, expected);
    }

    #[test]
    fn merge_direction_is_canonical() {
        let (mut t, env, _) = setup();
        let x = t.var("x");
        let gx = parse_term(&mut t, "(g x)").unwrap();
        let three = t.int(3);
        let e = Expl::Asserted(x);
        for order in [[x, gx, three], [three, gx, x], [gx, three, x]] {
            let mut cc = CongruenceClosure::default();
            cc.merge(&mut t, &env, order[0], order[1], e, true).unwrap();
            cc.merge(&mut t, &env, order[1], order[2], e, true).unwrap();
            assert_eq!(cc.find(x), three);
            assert_eq!(cc.find(gx), three);
        }
        let mut c1 = CongruenceClosure::default();
        let mut c2 = CongruenceClosure::default();
        c1.merge(&mut t, &env, x, gx, e, true).unwrap();
        c2.merge(&mut t, &env, gx, x, e, true).unwrap();
        assert_eq!(c1.find(gx), c2.find(gx));
        assert_eq!(c1.find(x), x);
    }

    #[test]
    fn distinct_constants_contradict() {
        let (mut t, env, mut cc) = setup();
        let (p1, e1) = asserted(&mut t, "(= x 1)");
        let (p2, e2) = asserted(&mut t, "(= y 2)");
        let (p3, e3) = asserted(&mut t, "(= x y)");
        let (x, y, one, two) = (t.var("x"), t.var("y"), t.int(1), t.int(2));
        cc.merge(&mut t, &env, x, one, e1, true).unwrap();
        cc.merge(&mut t, &env, y, two, e2, true).unwrap();
        let err = cc.merge(&mut t, &env, x, y, e3, true).unwrap_err();
        let mut why = err.explanation;
        why.sort();
        let mut expected = vec![p1, p2, p3];
        expected.sort();
        assert_eq!(why, expected);

        // without the flag constants may meet
        let mut cc = CongruenceClosure::default();
        assert!(cc.merge(&mut t, &env, one, two, e1, false).is_ok());
    }

    #[test]
    fn assert_and_deny_are_symmetric() {
        let (mut t, env, _) = setup();
        for s in ["(= a b)", "(< a b)", "(p x)", "(and p q)", "(= (f a) (f b))"] {
            let p = parse_term(&mut t, s).unwrap();
            let mut first = CongruenceClosure::default();
            first.assert_predicate(&mut t, &env, p).unwrap();
            let r1 = first.deny_predicate(&mut t, &env, p).is_err();
            let mut second = CongruenceClosure::default();
            second.deny_predicate(&mut t, &env, p).unwrap();
            let r2 = second.assert_predicate(&mut t, &env, p).is_err();
            assert!(r1, "{s}");
            assert_eq!(r1, r2, "{s}");
        }
    }

    #[test]
    fn equalities_propagate_into_predicates() {
        let (mut t, env, mut cc) = setup();
        let fa = parse_term(&mut t, "(p (f a))").unwrap();
        let ab = parse_term(&mut t, "(= a b)").unwrap();
        let fb = parse_term(&mut t, "(p (f b))").unwrap();
        cc.assert_predicate(&mut t, &env, fa).unwrap();
        cc.assert_predicate(&mut t, &env, ab).unwrap();
        let canon = cc.canonical(&mut t, fb);
        assert!(t.is_true(canon));
        assert!(cc.deny_predicate(&mut t, &env, fb).is_err());
    }

    #[test]
    fn implications_split_conjunctions() {
        let (mut t, env, mut cc) = setup();
        let pq = parse_term(&mut t, "(and (p x) (q x))").unwrap();
        let qx = parse_term(&mut t, "(q x)").unwrap();
        cc.assert_predicate(&mut t, &env, pq).unwrap();
        assert!(t.is_true(cc.find(qx)));

        let mut off = CongruenceClosure::new(false);
        off.assert_predicate(&mut t, &env, pq).unwrap();
        assert!(!off.is_registered(qx) || !t.is_true(off.find(qx)));
    }

    #[test]
    fn constructors_are_injective_and_distinct() {
        let (mut t, mut env, mut cc) = setup();
        env.add_type(TypeDef {
            name: "List".into(),
            constructors: vec![
                Constructor {
                    name: "nil".into(),
                    args: vec![],
                },
                Constructor {
                    name: "cons".into(),
                    args: vec!["Int".into(), "List".into()],
                },
            ],
        })
        .unwrap();
        let (p1, _) = asserted(&mut t, "(= l (cons h r))");
        let (p2, _) = asserted(&mut t, "(= l (cons 1 (nil)))");
        cc.assert_predicate(&mut t, &env, p1).unwrap();
        cc.assert_predicate(&mut t, &env, p2).unwrap();
        let (h, one) = (t.var("h"), t.int(1));
        assert_eq!(cc.find(h), one);

        let (p3, _) = asserted(&mut t, "(= r (cons 2 (nil)))");
        let err = cc.assert_predicate(&mut t, &env, p3).unwrap_err();
        assert!(err.explanation.contains(&p3));
    }

    #[test]
    fn strict_cycles_are_contradictions() {
        let (mut t, env, mut cc) = setup();
        for s in ["(< a b)", "(<= b c)"] {
            let p = parse_term(&mut t, s).unwrap();
            cc.assert_predicate(&mut t, &env, p).unwrap();
        }
        let closing = parse_term(&mut t, "(<= c a)").unwrap();
        let err = cc.assert_predicate(&mut t, &env, closing).unwrap_err();
        assert_eq!(err.explanation.len(), 3);

        let (mut t, env, mut cc) = setup();
        for s in ["(<= a b)", "(<= b a)"] {
            let p = parse_term(&mut t, s).unwrap();
            cc.assert_predicate(&mut t, &env, p).unwrap();
        }
    }

    #[test]
    fn implied_merges_are_explained() {
        let (mut t, env, mut cc) = setup();
        let conj = parse_term(&mut t, "(and (not p) q)").unwrap();
        cc.assert_predicate(&mut t, &env, conj).unwrap();
        let p = t.var("p");
        let no = t.false_term();
        assert_eq!(cc.find(p), no);
        assert_eq!(cc.explain(&t, p, no), vec![conj]);

        // a strict order denies its converse, and the cycle check has to
        // explain through that denial
        let (mut t, env, mut cc) = setup();
        for s in ["(or (< b a) q)", "(< b c)", "(< c a)"] {
            let p = parse_term(&mut t, s).unwrap();
            cc.assert_predicate(&mut t, &env, p).unwrap();
        }
        let closing = parse_term(&mut t, "(< a b)").unwrap();
        let err = cc.assert_predicate(&mut t, &env, closing).unwrap_err();
        assert!(err.explanation.contains(&closing), "{:?}", err.explanation);
    }

    #[test]
    fn registering_joins_congruent_classes() {
        let (mut t, env, mut cc) = setup();
        let fa = parse_term(&mut t, "(f a)").unwrap();
        let fb = parse_term(&mut t, "(f b)").unwrap();
        let (a, b, one) = (t.var("a"), t.var("b"), t.int(1));
        let (_, e) = asserted(&mut t, "(= a b)");
        let (_, e1) = asserted(&mut t, "(= (f a) 1)");
        cc.merge(&mut t, &env, fa, one, e1, true).unwrap();
        cc.merge(&mut t, &env, a, b, e, true).unwrap();
        assert!(!cc.is_registered(fb));
        assert_eq!(cc.add(&mut t, &env, fb), Ok(one));
        assert!(cc.are_equal(fa, fb));
    }

    #[test]
    fn snapshots_are_cheap_clones() {
        let (mut t, env, mut cc) = setup();
        let p = parse_term(&mut t, "(p a)").unwrap();
        cc.assert_predicate(&mut t, &env, p).unwrap();
        let saved = cc.clone();
        let q = parse_term(&mut t, "(= a b)").unwrap();
        cc.assert_predicate(&mut t, &env, q).unwrap();
        assert!(cc != saved);
        cc = saved.clone();
        assert!(cc == saved);
        let b = t.var("b");
        assert!(!cc.is_registered(b));
    }
}
