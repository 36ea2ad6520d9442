//! The rewrite driver.
//!
//! [`Rewriter::rewrite`] normalizes innermost-first: after the children of a
//! node are rewritten it tries, in order, builtin simplification, the class
//! root known to the congruence closure, a decision from the transitive
//! reasoner and finally the conditional rules of the environment. `ite`
//! branches and `=>` consequents are rewritten under the assumption of their
//! guard, inside a scope that is popped again afterwards.

use crate::{
    builtin::{self, RewriteResult},
    env::Env,
    matching::{matches, PatternVars},
    symbols::*,
    term::{Subst, Term, TermId, TermTable},
    transitive::{relational_facts, RelOp},
    util::{HashMap, IndexSet, SymbolGen},
    EngineConfig, Error, ReasoningScope, Symbol,
};

/// Rule conditions may themselves need conditional rules, up to this depth.
const MAX_CONDITION_DEPTH: usize = 8;

pub struct Rewriter<'a> {
    pub table: &'a mut TermTable,
    pub env: &'a Env,
    pub scope: &'a mut ReasoningScope,
    config: &'a EngineConfig,
    steps: usize,
    /// Number of quantifiers around the current position. Bound variables
    /// must not be confused with free ones, so context is ignored below a
    /// binder.
    binders: usize,
    conditions: usize,
    memo: HashMap<TermId, TermId>,
    warned: bool,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        table: &'a mut TermTable,
        env: &'a Env,
        scope: &'a mut ReasoningScope,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            table,
            env,
            scope,
            config,
            steps: 0,
            binders: 0,
            conditions: 0,
            memo: HashMap::default(),
            warned: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Number of top-level rewrite steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn exhausted(&mut self) -> bool {
        if self.steps < self.config.max_rewrite_steps {
            return false;
        }
        if !self.warned {
            log::warn!(
                "giving up rewriting after {} steps",
                self.config.max_rewrite_steps
            );
            self.warned = true;
        }
        true
    }

    pub fn rewrite(&mut self, t: TermId) -> TermId {
        let result = self.pass(t);
        log::trace!(
            "rewrote {} to {}",
            self.table.display(t),
            self.table.display(result)
        );
        result
    }

    fn pass(&mut self, t: TermId) -> TermId {
        if self.binders == 0 {
            if let Some(done) = self.memo.get(&t) {
                return *done;
            }
        }
        let result = match self.table.get(t).clone() {
            Term::App(f, args) if f == *ITE && args.len() == 3 && self.binders == 0 => {
                self.rewrite_ite(args[0], args[1], args[2])
            }
            Term::App(f, args) if f == *IMPLIES && args.len() == 2 && self.binders == 0 => {
                self.rewrite_implies(args[0], args[1])
            }
            Term::Quant {
                kind,
                vars,
                body,
                cond,
            } => {
                self.binders += 1;
                let cond = self.pass(cond);
                let body = self.pass(body);
                self.binders -= 1;
                let q = self.table.quant(kind, vars, body, cond);
                self.reduce(q)
            }
            _ => {
                let children: Vec<TermId> = self
                    .table
                    .children(t)
                    .into_iter()
                    .map(|c| self.pass(c))
                    .collect();
                let u = self.table.with_children(t, children);
                self.reduce(u)
            }
        };
        if self.binders == 0 {
            self.memo.insert(t, result);
        }
        result
    }

    /// Applies top-level steps to a term whose children are normal.
    fn reduce(&mut self, t: TermId) -> TermId {
        if self.exhausted() {
            return t;
        }
        match self.step(t) {
            Some(next) => {
                self.steps += 1;
                self.pass(next)
            }
            None => t,
        }
    }

    fn rewrite_ite(&mut self, c: TermId, x: TermId, y: TermId) -> TermId {
        let c = self.pass(c);
        if self.table.is_true(c) {
            return self.pass(x);
        }
        if self.table.is_false(c) {
            return self.pass(y);
        }
        let Some(x) = self.under(c, true, |rw| rw.pass(x)) else {
            return self.pass(y);
        };
        let Some(y) = self.under(c, false, |rw| rw.pass(y)) else {
            return x;
        };
        let u = self.table.app(*ITE, vec![c, x, y]);
        self.reduce(u)
    }

    fn rewrite_implies(&mut self, a: TermId, b: TermId) -> TermId {
        let a = self.pass(a);
        if self.table.is_true(a) {
            return self.pass(b);
        }
        if self.table.is_false(a) {
            return self.table.true_term();
        }
        let Some(b) = self.under(a, true, |rw| rw.pass(b)) else {
            return self.table.true_term();
        };
        let u = self.table.app(*IMPLIES, vec![a, b]);
        self.reduce(u)
    }

    /// Runs `f` with `guard` assumed to be `value`. Returns `None` without
    /// running `f` if the assumption is contradictory.
    pub fn under<R>(
        &mut self,
        guard: TermId,
        value: bool,
        f: impl FnOnce(&mut Self) -> R,
    ) -> Option<R> {
        let saved_cc = self.scope.cc.clone();
        let saved_memo = std::mem::take(&mut self.memo);
        let assumed = if value {
            self.scope.cc.assert_predicate(self.table, self.env, guard)
        } else {
            self.scope.cc.deny_predicate(self.table, self.env, guard)
        };
        for fact in relational_facts(self.table, guard, value) {
            self.scope.trans.add_pending(fact);
        }
        let pushed = self.scope.trans.push(self.table);
        let result = match (assumed, pushed) {
            (Ok(()), Ok(())) => Some(f(self)),
            (Err(c), _) | (_, Err(c)) => {
                log::trace!(
                    "assuming {} is {value} contradicts {}",
                    self.table.display(guard),
                    self.table.display_list(&c.explanation)
                );
                None
            }
        };
        self.scope.trans.pop();
        self.scope.cc = saved_cc;
        self.memo = saved_memo;
        result
    }

    /// One top-level step, if any applies.
    fn step(&mut self, t: TermId) -> Option<TermId> {
        if let RewriteResult::Rewritten(s) = builtin::simplify(self.env, self.table, t) {
            if s != t {
                return Some(s);
            }
        }
        if self.binders == 0 {
            let c = self.scope.cc.canonical(self.table, t);
            if c != t {
                return Some(c);
            }
            if let Some((op, l, r)) = RelOp::from_term(self.table, t) {
                if let Some(b) = self.scope.trans.decide(self.table, op, l, r) {
                    return Some(self.table.bool_term(b));
                }
            }
        }
        self.rule_instances(t, true).into_iter().find(|r| *r != t)
    }

    /// Right-hand sides of the rules whose left-hand side matches `t`. With
    /// `first`, stops at the first rule that fires.
    fn rule_instances(&mut self, t: TermId, first: bool) -> Vec<TermId> {
        let mut out = vec![];
        let Some(f) = self.table.functor(t) else {
            return out;
        };
        let env = self.env;
        for rule in env.rules_for(f) {
            let Some(subst) = matches(self.table, PatternVars::Free, rule.lhs, t) else {
                continue;
            };
            if let Some(cond) = rule.cond {
                let cond = self.table.substitute(cond, &subst);
                if !self.check_condition(cond) {
                    continue;
                }
            }
            let rhs = self.table.substitute(rule.rhs, &subst);
            if rhs != t {
                out.push(rhs);
                if first {
                    break;
                }
            }
        }
        out
    }

    fn check_condition(&mut self, cond: TermId) -> bool {
        if self.conditions >= MAX_CONDITION_DEPTH {
            return false;
        }
        self.conditions += 1;
        let r = self.pass(cond);
        self.conditions -= 1;
        self.table.is_true(r)
    }

    /// Every single-step alternative to `t` known to the kernel: builtin
    /// and rule rewrites, other members of its congruence class, terms it
    /// is recorded equal to, and its full rewrite.
    pub fn alternatives(&mut self, t: TermId) -> Vec<TermId> {
        let mut out: IndexSet<TermId> = IndexSet::default();
        if let RewriteResult::Rewritten(s) = builtin::simplify(self.env, self.table, t) {
            out.insert(s);
        }
        out.extend(self.rule_instances(t, false));
        if self.scope.cc.is_registered(t) {
            out.extend(self.scope.cc.members(t));
        }
        out.insert(self.scope.cc.canonical(self.table, t));
        let tables = self.scope.trans.tables();
        for id in tables.touching(t) {
            let fact = tables.get(id);
            if fact.op != RelOp::Eq || fact.unused {
                continue;
            }
            out.insert(if fact.left == t { fact.right } else { fact.left });
        }
        out.insert(self.rewrite(t));
        out.shift_remove(&t);
        out.into_iter().collect()
    }

    /// Alternatives for the subterm at `[position_index] ++ path`, each as
    /// the whole term with that subterm replaced.
    pub fn special_rewrite(
        &mut self,
        t: TermId,
        position_index: usize,
        path: &[usize],
    ) -> Result<Vec<TermId>, Error> {
        let mut full = vec![position_index];
        full.extend_from_slice(path);
        let sub = self
            .table
            .subterm_at(t, &full)
            .ok_or_else(|| Error::InvalidPath(full.clone()))?;
        let mut out = vec![];
        for alt in self.alternatives(sub) {
            if let Some(n) = self.table.replace_at(t, &full, alt) {
                if n != t && !out.contains(&n) {
                    out.push(n);
                }
            }
        }
        Ok(out)
    }
}

/// Splits `var` into one case per constructor of its declared datatype.
/// Each case is the rewritten term paired with the equation `(= var C(..))`
/// that justifies it. Arguments of the constructors become fresh variables
/// typed after the constructor's argument types.
///
/// With an empty `bound_path` `var` is free in `t`. Otherwise `bound_path`
/// leads to the quantifier that binds it, and the fresh variables are bound
/// there instead.
pub fn expand_variable(
    table: &mut TermTable,
    env: &mut Env,
    gen: &mut SymbolGen,
    t: TermId,
    var: Symbol,
    bound_path: &[usize],
) -> Result<Vec<(TermId, TermId)>, Error> {
    let ty = env.var_type(var).ok_or(Error::UnknownType(var))?;
    let def = env
        .type_definition(ty)
        .cloned()
        .ok_or(Error::UnknownType(ty))?;
    let binder = if bound_path.is_empty() {
        None
    } else {
        let q = table
            .subterm_at(t, bound_path)
            .ok_or_else(|| Error::InvalidPath(bound_path.to_vec()))?;
        match table.get(q).clone() {
            Term::Quant {
                kind,
                vars,
                body,
                cond,
            } if vars.contains(&var) => Some((kind, vars, body, cond)),
            _ => return Err(Error::InvalidPath(bound_path.to_vec())),
        }
    };
    let var_term = table.var(var);
    let mut cases = vec![];
    for ctor in &def.constructors {
        let mut fresh = vec![];
        for arg_ty in &ctor.args {
            let name = Symbol::from(gen.fresh(var.as_str()).as_str());
            env.declare_var(name, *arg_ty);
            fresh.push(name);
        }
        let args = fresh.iter().map(|v| table.var(*v)).collect();
        let instance = table.app(ctor.name, args);
        let witness = table.app(*EQUAL, vec![var_term, instance]);
        let mut subst = Subst::default();
        subst.insert(var_term, instance);
        let case = match &binder {
            None => table.substitute(t, &subst),
            Some((kind, vars, body, cond)) => {
                let body = table.substitute(*body, &subst);
                let cond = table.substitute(*cond, &subst);
                let mut vars: Vec<Symbol> = vars.iter().copied().filter(|v| *v != var).collect();
                vars.extend(fresh);
                let q = if vars.is_empty() && table.is_true(cond) {
                    body
                } else if vars.is_empty() {
                    table.app(*IMPLIES, vec![cond, body])
                } else {
                    table.quant(*kind, vars, body, cond)
                };
                table
                    .replace_at(t, bound_path, q)
                    .ok_or_else(|| Error::InvalidPath(bound_path.to_vec()))?
            }
        };
        log::debug!(
            "case {} gives {}",
            table.display(witness),
            table.display(case)
        );
        cases.push((case, witness));
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{Constructor, Rule, TypeDef},
        parse::parse_term,
        Engine,
    };

    fn rule(e: &mut Engine, lhs: &str, rhs: &str, cond: Option<&str>) {
        let lhs = e.parse(lhs).unwrap();
        let rhs = e.parse(rhs).unwrap();
        let rule = match cond {
            Some(c) => Rule::with_cond(lhs, rhs, e.parse(c).unwrap()),
            None => Rule::new(lhs, rhs),
        };
        e.add_rule(rule).unwrap();
    }

    fn rewrite_str(e: &mut Engine, s: &str) -> String {
        let t = e.parse(s).unwrap();
        let r = e.rewrite(t);
        e.terms.display(r).to_string()
    }

    fn list_type(e: &mut Engine) {
        e.env
            .add_type(TypeDef {
                name: "list".into(),
                constructors: vec![
                    Constructor {
                        name: "nil".into(),
                        args: vec![],
                    },
                    Constructor {
                        name: "cons".into(),
                        args: vec!["Int".into(), "list".into()],
                    },
                ],
            })
            .unwrap();
        e.env.declare_var("l".into(), "list".into());
    }

    #[test]
    fn conditional_rules() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut e = Engine::default();
        rule(&mut e, "(f x)", "x", Some("(> x 0)"));
        assert_eq!(rewrite_str(&mut e, "(f 3)"), "3");
        assert_eq!(rewrite_str(&mut e, "(f 0)"), "(f 0)");
        assert_eq!(rewrite_str(&mut e, "(g (f (+ 1 1)))"), "(g 2)");
    }

    #[test]
    fn equalities_and_orders_are_used() {
        let mut e = Engine::default();
        let eq = e.parse("(= a b)").unwrap();
        e.assert_predicate(eq).unwrap();
        assert_eq!(rewrite_str(&mut e, "(g a)"), rewrite_str(&mut e, "(g b)"));

        for p in ["(< x y)", "(< y z)"] {
            let p = e.parse(p).unwrap();
            e.assert_predicate(p).unwrap();
        }
        assert_eq!(rewrite_str(&mut e, "(< x z)"), "True");
        assert_eq!(rewrite_str(&mut e, "(< z x)"), "False");
        assert_eq!(rewrite_str(&mut e, "(ite (< z x) p q)"), "q");
    }

    #[test]
    fn branches_see_their_guard() {
        let mut e = Engine::default();
        assert_eq!(
            rewrite_str(&mut e, "(ite (= x 1) (+ x 1) 0)"),
            "(ite (= x 1) 2 0)"
        );
        assert_eq!(rewrite_str(&mut e, "(=> (< a b) (< a b))"), "True");
        // nothing leaks out of the branch scopes
        let x = e.parse("x").unwrap();
        assert!(!e.scope().cc.is_registered(x));
        assert_eq!(e.scope().trans.depth(), 0);
        assert!(e.scope().trans.tables().is_empty());
    }

    #[test]
    fn contradictory_guards_drop_branches() {
        let mut e = Engine::default();
        for p in ["(= (f a) 1)", "(= (f b) 2)"] {
            let p = e.parse(p).unwrap();
            e.assert_predicate(p).unwrap();
        }
        // a = b would make 1 = 2 by congruence
        assert_eq!(rewrite_str(&mut e, "(=> (= a b) (g a))"), "True");
        assert_eq!(rewrite_str(&mut e, "(ite (= a b) p q)"), "q");
    }

    #[test]
    fn step_limit_stops_divergence() {
        let mut e = Engine::default();
        e.config.max_rewrite_steps = 10;
        rule(&mut e, "(f x)", "(f (s x))", None);
        let t = e.parse("(f 0)").unwrap();
        let r = e.rewrite(t);
        assert!(e.terms.size(r) > e.terms.size(t));
    }

    #[test]
    fn special_rewrite_offers_alternatives() {
        let mut e = Engine::default();
        rule(&mut e, "(f x)", "(g x)", None);
        let eq = e.parse("(= (f 1) c)").unwrap();
        e.assert_predicate(eq).unwrap();
        let t = e.parse("(h (f 1) 2)").unwrap();
        let alts: Vec<String> = e
            .special_rewrite(t, 0, &[])
            .unwrap()
            .into_iter()
            .map(|a| e.terms.display(a).to_string())
            .collect();
        assert!(alts.contains(&"(h (g 1) 2)".to_string()), "{alts:?}");
        assert!(alts.contains(&"(h c 2)".to_string()), "{alts:?}");
        assert!(!alts.contains(&"(h (f 1) 2)".to_string()));
        assert!(matches!(
            e.special_rewrite(t, 0, &[3]),
            Err(Error::InvalidPath(p)) if p == vec![0, 3]
        ));
    }

    #[test]
    fn expand_free_variable() {
        let mut e = Engine::default();
        list_type(&mut e);
        let t = e.parse("(len l)").unwrap();
        let l = Symbol::from("l");
        let cases = e.expand_variable(t, l, &[]).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(e.terms.display(cases[0].0).to_string(), "(len (nil))");
        assert_eq!(e.terms.display(cases[0].1).to_string(), "(= l (nil))");
        let cons_case = cases[1].0;
        let inner = e.terms.subterm_at(cons_case, &[0]).unwrap();
        assert_eq!(e.terms.functor(inner), Some("cons".into()));
        // fresh variables are typed
        let tail = e.terms.args(inner)[1];
        assert_eq!(e.env.type_of(&e.terms, tail), Some("list".into()));
    }

    #[test]
    fn expand_bound_variable() {
        let mut e = Engine::default();
        list_type(&mut e);
        let t = e.parse("(and (all (l) (p l)) q)").unwrap();
        let l = Symbol::from("l");
        let cases = e.expand_variable(t, l, &[0]).unwrap();
        assert_eq!(e.terms.display(cases[0].0).to_string(), "(and (p (nil)) q)");
        let q = e.terms.subterm_at(cases[1].0, &[0]).unwrap();
        assert!(matches!(e.terms.get(q), Term::Quant { vars, .. } if vars.len() == 2));

        assert!(matches!(
            e.expand_variable(t, l, &[1]),
            Err(Error::InvalidPath(_))
        ));
        let m = Symbol::from("m");
        assert!(matches!(
            e.expand_variable(t, m, &[]),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn rewriter_on_bare_parts() {
        let mut table = TermTable::default();
        let env = Env::default();
        let config = EngineConfig::default();
        let mut scope = ReasoningScope::new(&config);
        let t = parse_term(&mut table, "(all (x) (= x x))").unwrap();
        let mut rw = Rewriter::new(&mut table, &env, &mut scope, &config);
        let r = rw.rewrite(t);
        assert!(rw.steps() > 0);
        assert!(table.is_true(r));
    }
}
