//! Hash-consed terms.
//!
//! Every [`Term`] is interned in a [`TermTable`] and referred to by its
//! [`TermId`]. Two structurally equal terms always receive the same id, so
//! id equality is term equality everywhere in the kernel.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use num::{BigInt, BigRational, One};

use crate::{
    symbols,
    util::{HashMap, HashSet, ListDisplay, INTERNAL_SYMBOL_PREFIX},
    Symbol,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TermId(u32);

impl TermId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum QuantKind {
    All,
    Exists,
    SetQ,
    Lambda,
}

impl QuantKind {
    pub fn name(self) -> &'static str {
        match self {
            QuantKind::All => "all",
            QuantKind::Exists => "exists",
            QuantKind::SetQ => "setq",
            QuantKind::Lambda => "lambda",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(QuantKind::All),
            "exists" => Some(QuantKind::Exists),
            "setq" => Some(QuantKind::SetQ),
            "lambda" => Some(QuantKind::Lambda),
            _ => None,
        }
    }
}

/// Coarse classification of a term, mostly useful for reflection builtins.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum TermKind {
    Integer,
    Rational,
    String,
    Application,
    Variable,
    MarkedVariable,
    Case,
    Quantifier,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Term {
    App(Symbol, Vec<TermId>),
    Quant {
        kind: QuantKind,
        vars: Vec<Symbol>,
        body: TermId,
        cond: TermId,
    },
    /// `arms` holds `(pattern, result)` pairs flattened, so its length is even.
    Case {
        disc: TermId,
        arms: Vec<TermId>,
    },
    Int(BigInt),
    Rational(BigRational),
    Str(Symbol),
    Var(Symbol),
    Marked(Symbol),
}

impl Term {
    pub fn kind(&self) -> TermKind {
        match self {
            Term::Int(_) => TermKind::Integer,
            Term::Rational(_) => TermKind::Rational,
            Term::Str(_) => TermKind::String,
            Term::App(..) => TermKind::Application,
            Term::Var(_) => TermKind::Variable,
            Term::Marked(_) => TermKind::MarkedVariable,
            Term::Case { .. } => TermKind::Case,
            Term::Quant { .. } => TermKind::Quantifier,
        }
    }
}

/// A substitution from variable terms (either [`Term::Var`] or
/// [`Term::Marked`]) to their replacements.
pub type Subst = HashMap<TermId, TermId>;

#[derive(Clone, Debug, Default)]
pub struct TermTable {
    nodes: Vec<Term>,
    sizes: Vec<u32>,
    hashcons: HashMap<Term, TermId>,
}

impl TermTable {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Interns `term`, returning the id of the unique node with its shape.
    pub fn add(&mut self, term: Term) -> TermId {
        if let Some(id) = self.hashcons.get(&term) {
            return *id;
        }
        let id = TermId(
            u32::try_from(self.nodes.len()).expect("reached max size for the term table"),
        );
        let size = 1 + self
            .children_of(&term)
            .iter()
            .map(|c| self.sizes[c.index()])
            .sum::<u32>();
        self.nodes.push(term.clone());
        self.sizes.push(size);
        self.hashcons.insert(term, id);
        id
    }

    /// Looks a term up without interning it.
    pub fn lookup(&self, term: &Term) -> Option<TermId> {
        self.hashcons.get(term).copied()
    }

    pub fn get(&self, id: TermId) -> &Term {
        &self.nodes[id.index()]
    }

    /// Number of nodes in the tree rooted at `id` (shared subterms counted
    /// once per occurrence).
    pub fn size(&self, id: TermId) -> usize {
        self.sizes[id.index()] as usize
    }

    pub fn app(&mut self, functor: Symbol, args: Vec<TermId>) -> TermId {
        self.add(Term::App(functor, args))
    }

    pub fn constant(&mut self, functor: Symbol) -> TermId {
        self.add(Term::App(functor, vec![]))
    }

    pub fn int(&mut self, i: impl Into<BigInt>) -> TermId {
        self.add(Term::Int(i.into()))
    }

    /// Rationals with denominator one are stored as integers so that each
    /// number has exactly one representation.
    pub fn rational(&mut self, r: BigRational) -> TermId {
        if r.denom().is_one() {
            self.add(Term::Int(r.to_integer()))
        } else {
            self.add(Term::Rational(r))
        }
    }

    pub fn string(&mut self, s: impl Into<Symbol>) -> TermId {
        self.add(Term::Str(s.into()))
    }

    pub fn var(&mut self, name: impl Into<Symbol>) -> TermId {
        self.add(Term::Var(name.into()))
    }

    pub fn marked(&mut self, name: impl Into<Symbol>) -> TermId {
        self.add(Term::Marked(name.into()))
    }

    pub fn quant(
        &mut self,
        kind: QuantKind,
        vars: Vec<Symbol>,
        body: TermId,
        cond: TermId,
    ) -> TermId {
        self.add(Term::Quant {
            kind,
            vars,
            body,
            cond,
        })
    }

    pub fn case(&mut self, disc: TermId, arms: Vec<TermId>) -> TermId {
        assert!(arms.len() % 2 == 0, "case arms must come in pairs");
        self.add(Term::Case { disc, arms })
    }

    pub fn true_term(&mut self) -> TermId {
        self.constant(*symbols::TRUE)
    }

    pub fn false_term(&mut self) -> TermId {
        self.constant(*symbols::FALSE)
    }

    pub fn bool_term(&mut self, b: bool) -> TermId {
        if b {
            self.true_term()
        } else {
            self.false_term()
        }
    }

    pub fn is_true(&self, id: TermId) -> bool {
        matches!(self.get(id), Term::App(f, args) if *f == *symbols::TRUE && args.is_empty())
    }

    pub fn is_false(&self, id: TermId) -> bool {
        matches!(self.get(id), Term::App(f, args) if *f == *symbols::FALSE && args.is_empty())
    }

    pub fn is_bool_constant(&self, id: TermId) -> bool {
        self.is_true(id) || self.is_false(id)
    }

    pub fn functor(&self, id: TermId) -> Option<Symbol> {
        match self.get(id) {
            Term::App(f, _) => Some(*f),
            _ => None,
        }
    }

    /// Arguments of an application, empty for every other kind of term.
    pub fn args(&self, id: TermId) -> &[TermId] {
        match self.get(id) {
            Term::App(_, args) => args,
            _ => &[],
        }
    }

    /// Returns the arguments if `id` is an application of `functor`.
    pub fn app_of(&self, id: TermId, functor: Symbol) -> Option<&[TermId]> {
        match self.get(id) {
            Term::App(f, args) if *f == functor => Some(args),
            _ => None,
        }
    }

    pub fn is_literal(&self, id: TermId) -> bool {
        matches!(self.get(id), Term::Int(_) | Term::Rational(_) | Term::Str(_))
    }

    /// Literals and the two boolean constants: terms that can never be
    /// equal to a different constant.
    pub fn is_constant(&self, id: TermId) -> bool {
        self.is_literal(id) || self.is_bool_constant(id)
    }

    pub fn is_variable(&self, id: TermId) -> bool {
        matches!(self.get(id), Term::Var(_) | Term::Marked(_))
    }

    pub fn as_number(&self, id: TermId) -> Option<BigRational> {
        match self.get(id) {
            Term::Int(i) => Some(BigRational::from_integer(i.clone())),
            Term::Rational(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_int(&self, id: TermId) -> Option<&BigInt> {
        match self.get(id) {
            Term::Int(i) => Some(i),
            _ => None,
        }
    }

    fn children_of(&self, term: &Term) -> Vec<TermId> {
        match term {
            Term::App(_, args) => args.clone(),
            Term::Quant { body, cond, .. } => vec![*body, *cond],
            Term::Case { disc, arms } => {
                let mut children = Vec::with_capacity(arms.len() + 1);
                children.push(*disc);
                children.extend(arms.iter().copied());
                children
            }
            Term::Int(_) | Term::Rational(_) | Term::Str(_) | Term::Var(_) | Term::Marked(_) => {
                vec![]
            }
        }
    }

    /// Immediate subterms: application arguments, quantifier body and
    /// condition, case discriminant followed by the flattened arms.
    pub fn children(&self, id: TermId) -> Vec<TermId> {
        self.children_of(self.get(id))
    }

    /// Rebuilds `id` with new immediate subterms, in the order returned by
    /// [`TermTable::children`].
    pub fn with_children(&mut self, id: TermId, children: Vec<TermId>) -> TermId {
        let term = match self.get(id).clone() {
            Term::App(f, _) => Term::App(f, children),
            Term::Quant { kind, vars, .. } => Term::Quant {
                kind,
                vars,
                body: children[0],
                cond: children[1],
            },
            Term::Case { .. } => Term::Case {
                disc: children[0],
                arms: children[1..].to_vec(),
            },
            leaf => {
                debug_assert!(children.is_empty());
                leaf
            }
        };
        self.add(term)
    }

    /// Follows `path` (indices into [`TermTable::children`]) down from `id`.
    pub fn subterm_at(&self, id: TermId, path: &[usize]) -> Option<TermId> {
        let mut current = id;
        for &i in path {
            current = *self.children(current).get(i)?;
        }
        Some(current)
    }

    /// Replaces the subterm at `path` with `replacement`.
    pub fn replace_at(
        &mut self,
        id: TermId,
        path: &[usize],
        replacement: TermId,
    ) -> Option<TermId> {
        match path.split_first() {
            None => Some(replacement),
            Some((&i, rest)) => {
                let mut children = self.children(id);
                let child = *children.get(i)?;
                children[i] = self.replace_at(child, rest, replacement)?;
                Some(self.with_children(id, children))
            }
        }
    }

    /// Is `needle` a (not necessarily proper) subterm of `hay`?
    pub fn subterm_member(&self, needle: TermId, hay: TermId) -> bool {
        if self.size(needle) > self.size(hay) {
            return false;
        }
        let mut stack = vec![hay];
        let mut seen = HashSet::default();
        while let Some(t) = stack.pop() {
            if t == needle {
                return true;
            }
            if self.size(t) > self.size(needle) && seen.insert(t) {
                stack.extend(self.children(t));
            }
        }
        false
    }

    /// Free variables of `id` in order of first occurrence.
    pub fn free_vars(&self, id: TermId) -> Vec<Symbol> {
        let mut out = vec![];
        self.collect_free_vars(id, &mut vec![], &mut out);
        out
    }

    fn collect_free_vars(&self, id: TermId, bound: &mut Vec<Symbol>, out: &mut Vec<Symbol>) {
        match self.get(id) {
            Term::Var(v) => {
                if !bound.contains(v) && !out.contains(v) {
                    out.push(*v);
                }
            }
            Term::Quant {
                vars, body, cond, ..
            } => {
                let depth = bound.len();
                bound.extend(vars.iter().copied());
                self.collect_free_vars(*body, bound, out);
                self.collect_free_vars(*cond, bound, out);
                bound.truncate(depth);
            }
            _ => {
                for c in self.children(id) {
                    self.collect_free_vars(c, bound, out);
                }
            }
        }
    }

    /// Marked variables occurring in `id`, in order of first occurrence.
    pub fn marked_vars(&self, id: TermId) -> Vec<TermId> {
        let mut out = vec![];
        let mut stack = vec![id];
        while let Some(t) = stack.pop() {
            match self.get(t) {
                Term::Marked(_) => {
                    if !out.contains(&t) {
                        out.push(t);
                    }
                }
                _ => stack.extend(self.children(t).into_iter().rev()),
            }
        }
        out
    }

    pub fn occurs_free(&self, var: Symbol, id: TermId) -> bool {
        self.free_vars(id).contains(&var)
    }

    /// Applies `subst` to `id`. Variables bound by an enclosing quantifier
    /// are left alone, and a binder that would capture a free variable of an
    /// inserted term is renamed first.
    pub fn substitute(&mut self, id: TermId, subst: &Subst) -> TermId {
        if subst.is_empty() {
            return id;
        }
        let mut cache = HashMap::default();
        self.substitute_rec(id, subst, &[], &mut cache)
    }

    fn substitute_rec(
        &mut self,
        id: TermId,
        subst: &Subst,
        bound: &[Symbol],
        cache: &mut HashMap<TermId, TermId>,
    ) -> TermId {
        if bound.is_empty() {
            if let Some(done) = cache.get(&id) {
                return *done;
            }
        }
        let result = match self.get(id).clone() {
            Term::Var(v) if bound.contains(&v) => id,
            Term::Var(_) | Term::Marked(_) => subst.get(&id).copied().unwrap_or(id),
            Term::Quant {
                kind,
                mut vars,
                mut body,
                mut cond,
            } => {
                let captured = self.captured_binders(&vars, body, cond, subst, bound);
                for v in captured {
                    let fresh = self.fresh_binder(v, &vars, body, cond, subst);
                    let mut rename = Subst::default();
                    let (old, new) = (self.var(v), self.var(fresh));
                    rename.insert(old, new);
                    body = self.substitute(body, &rename);
                    cond = self.substitute(cond, &rename);
                    for w in vars.iter_mut().filter(|w| **w == v) {
                        *w = fresh;
                    }
                }
                let mut inner = bound.to_vec();
                inner.extend(vars.iter().copied());
                let body = self.substitute_rec(body, subst, &inner, cache);
                let cond = self.substitute_rec(cond, subst, &inner, cache);
                self.quant(kind, vars, body, cond)
            }
            Term::Int(_) | Term::Rational(_) | Term::Str(_) => id,
            _ => {
                let children = self
                    .children(id)
                    .into_iter()
                    .map(|c| self.substitute_rec(c, subst, bound, cache))
                    .collect();
                self.with_children(id, children)
            }
        };
        if bound.is_empty() {
            cache.insert(id, result);
        }
        result
    }

    /// Binders among `vars` that occur free in a term `subst` would insert
    /// into `body` or `cond`.
    fn captured_binders(
        &self,
        vars: &[Symbol],
        body: TermId,
        cond: TermId,
        subst: &Subst,
        bound: &[Symbol],
    ) -> Vec<Symbol> {
        let mut free = self.free_vars(body);
        free.extend(self.free_vars(cond));
        let mut marked = self.marked_vars(body);
        marked.extend(self.marked_vars(cond));
        let mut inserted = vec![];
        for (key, value) in subst {
            let live = match self.get(*key) {
                Term::Var(k) => free.contains(k) && !vars.contains(k) && !bound.contains(k),
                Term::Marked(_) => marked.contains(key),
                _ => false,
            };
            if live {
                inserted.extend(self.free_vars(*value));
            }
        }
        let mut out: Vec<Symbol> = vars.iter().copied().filter(|v| inserted.contains(v)).collect();
        out.dedup();
        out
    }

    fn fresh_binder(
        &self,
        v: Symbol,
        vars: &[Symbol],
        body: TermId,
        cond: TermId,
        subst: &Subst,
    ) -> Symbol {
        let mut taken = self.free_vars(body);
        taken.extend(self.free_vars(cond));
        for value in subst.values() {
            taken.extend(self.free_vars(*value));
        }
        let mut n = 0;
        loop {
            let candidate = Symbol::from(format!("{}{INTERNAL_SYMBOL_PREFIX}{n}", v.as_str()));
            if !taken.contains(&candidate) && !vars.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn rank(&self, id: TermId) -> u8 {
        match self.get(id) {
            Term::Int(_) | Term::Rational(_) => 0,
            Term::Str(_) => 1,
            Term::App(..) => 2,
            Term::Var(_) => 3,
            Term::Marked(_) => 4,
            Term::Case { .. } => 5,
            Term::Quant { .. } => 6,
        }
    }

    /// Total order on terms. Constants come first, then smaller terms, then
    /// a structural comparison. Union-find roots are always the minimum of
    /// their class under this order, which makes merging independent of the
    /// order of the arguments.
    pub fn compare(&self, a: TermId, b: TermId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.is_constant(b)
            .cmp(&self.is_constant(a))
            .then_with(|| self.size(a).cmp(&self.size(b)))
            .then_with(|| self.rank(a).cmp(&self.rank(b)))
            .then_with(|| self.compare_same_rank(a, b))
    }

    fn compare_same_rank(&self, a: TermId, b: TermId) -> Ordering {
        match (self.get(a), self.get(b)) {
            (Term::Int(_) | Term::Rational(_), Term::Int(_) | Term::Rational(_)) => {
                self.as_number(a).cmp(&self.as_number(b))
            }
            (Term::Str(x), Term::Str(y)) | (Term::Var(x), Term::Var(y)) => {
                x.as_str().cmp(y.as_str())
            }
            (Term::Marked(x), Term::Marked(y)) => x.as_str().cmp(y.as_str()),
            (Term::App(f, xs), Term::App(g, ys)) => f
                .as_str()
                .cmp(g.as_str())
                .then_with(|| xs.len().cmp(&ys.len()))
                .then_with(|| self.compare_lists(xs, ys)),
            (Term::Case { disc: d1, arms: a1 }, Term::Case { disc: d2, arms: a2 }) => self
                .compare(*d1, *d2)
                .then_with(|| a1.len().cmp(&a2.len()))
                .then_with(|| self.compare_lists(a1, a2)),
            (
                Term::Quant {
                    kind: k1,
                    vars: v1,
                    body: b1,
                    cond: c1,
                },
                Term::Quant {
                    kind: k2,
                    vars: v2,
                    body: b2,
                    cond: c2,
                },
            ) => k1
                .cmp(k2)
                .then_with(|| {
                    let n1: Vec<&str> = v1.iter().map(|v| v.as_str()).collect();
                    let n2: Vec<&str> = v2.iter().map(|v| v.as_str()).collect();
                    n1.cmp(&n2)
                })
                .then_with(|| self.compare(*b1, *b2))
                .then_with(|| self.compare(*c1, *c2)),
            _ => unreachable!("terms of equal rank have the same shape"),
        }
    }

    fn compare_lists(&self, xs: &[TermId], ys: &[TermId]) -> Ordering {
        xs.iter()
            .zip(ys)
            .map(|(x, y)| self.compare(*x, *y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    pub fn display(&self, id: TermId) -> TermDisplay<'_> {
        TermDisplay { table: self, id }
    }

    pub fn display_list<'a>(&'a self, ids: &'a [TermId]) -> impl Display + 'a {
        ListDisplay(ids.iter().map(move |id| self.display(*id)), " ")
    }
}

/// Prints a term in the s-expression syntax accepted by [`crate::parse`].
pub struct TermDisplay<'a> {
    table: &'a TermTable,
    id: TermId,
}

impl<'a> TermDisplay<'a> {
    fn child(&self, id: TermId) -> TermDisplay<'a> {
        TermDisplay {
            table: self.table,
            id,
        }
    }
}

impl Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table.get(self.id) {
            Term::App(name, args) if args.is_empty() => {
                if self.table.is_bool_constant(self.id) {
                    write!(f, "{name}")
                } else {
                    write!(f, "({name})")
                }
            }
            Term::App(name, args) => {
                write!(f, "({name}")?;
                for a in args {
                    write!(f, " {}", self.child(*a))?;
                }
                write!(f, ")")
            }
            Term::Quant {
                kind,
                vars,
                body,
                cond,
            } => {
                write!(
                    f,
                    "({} ({}) {}",
                    kind.name(),
                    ListDisplay(vars, " "),
                    self.child(*body)
                )?;
                if !self.table.is_true(*cond) {
                    write!(f, " {}", self.child(*cond))?;
                }
                write!(f, ")")
            }
            Term::Case { disc, arms } => {
                write!(f, "(case {}", self.child(*disc))?;
                for pair in arms.chunks(2) {
                    write!(f, " ({} {})", self.child(pair[0]), self.child(pair[1]))?;
                }
                write!(f, ")")
            }
            Term::Int(i) => write!(f, "{i}"),
            Term::Rational(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Term::Str(s) => write!(f, "{s:?}", s = s.as_str()),
            Term::Var(v) => write!(f, "{v}"),
            Term::Marked(v) => write!(f, "?{v}"),
        }
    }
}
