//! One-way matching and syntactic unification over hash-consed terms.

use crate::{
    env::Rule,
    term::{Subst, Term, TermId, TermTable},
    util::SymbolGen,
};

/// Which kind of variable acts as a pattern variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternVars {
    /// Free variables of a rule's left-hand side.
    Free,
    /// Marked variables, the wildcards of normalization patterns.
    Marked,
}

impl PatternVars {
    fn is_var(self, term: &Term) -> bool {
        match self {
            PatternVars::Free => matches!(term, Term::Var(_)),
            PatternVars::Marked => matches!(term, Term::Marked(_)),
        }
    }
}

/// Matches `pattern` against `term`, extending `subst`. On failure `subst`
/// may contain partial bindings and should be discarded.
pub fn match_term(
    table: &TermTable,
    vars: PatternVars,
    pattern: TermId,
    term: TermId,
    subst: &mut Subst,
) -> bool {
    let mut stack = vec![(pattern, term)];
    while let Some((p, t)) = stack.pop() {
        if vars.is_var(table.get(p)) {
            match subst.get(&p) {
                Some(bound) if *bound != t => return false,
                Some(_) => {}
                None => {
                    subst.insert(p, t);
                }
            }
            continue;
        }
        if p == t {
            continue;
        }
        let same_head = match (table.get(p), table.get(t)) {
            (Term::App(f, xs), Term::App(g, ys)) => f == g && xs.len() == ys.len(),
            (Term::Quant { kind: k1, vars: v1, .. }, Term::Quant { kind: k2, vars: v2, .. }) => {
                k1 == k2 && v1 == v2
            }
            (Term::Case { arms: a1, .. }, Term::Case { arms: a2, .. }) => a1.len() == a2.len(),
            _ => false,
        };
        if !same_head {
            return false;
        }
        stack.extend(table.children(p).into_iter().zip(table.children(t)));
    }
    true
}

/// Convenience wrapper returning the substitution on success.
pub fn matches(
    table: &TermTable,
    vars: PatternVars,
    pattern: TermId,
    term: TermId,
) -> Option<Subst> {
    let mut subst = Subst::default();
    match_term(table, vars, pattern, term, &mut subst).then_some(subst)
}

fn walk(table: &TermTable, subst: &Subst, mut t: TermId) -> TermId {
    while matches!(table.get(t), Term::Var(_)) {
        match subst.get(&t) {
            Some(next) => t = *next,
            None => break,
        }
    }
    t
}

fn occurs(table: &TermTable, subst: &Subst, var: TermId, t: TermId) -> bool {
    let mut stack = vec![t];
    while let Some(t) = stack.pop() {
        let t = walk(table, subst, t);
        if t == var {
            return true;
        }
        stack.extend(table.children(t));
    }
    false
}

/// Syntactic unification treating free variables on both sides as
/// unknowns. The returned substitution is idempotent.
pub fn unify(table: &mut TermTable, a: TermId, b: TermId) -> Option<Subst> {
    let mut subst = Subst::default();
    let mut stack = vec![(a, b)];
    while let Some((x, y)) = stack.pop() {
        let x = walk(table, &subst, x);
        let y = walk(table, &subst, y);
        if x == y {
            continue;
        }
        match (table.get(x), table.get(y)) {
            (Term::Var(_), _) => {
                if occurs(table, &subst, x, y) {
                    return None;
                }
                subst.insert(x, y);
            }
            (_, Term::Var(_)) => {
                if occurs(table, &subst, y, x) {
                    return None;
                }
                subst.insert(y, x);
            }
            (Term::App(f, xs), Term::App(g, ys)) if f == g && xs.len() == ys.len() => {
                stack.extend(xs.iter().copied().zip(ys.iter().copied()));
            }
            _ => return None,
        }
    }
    // resolve the triangular substitution
    let keys: Vec<TermId> = subst.keys().copied().collect();
    let mut resolved = Subst::default();
    for k in keys {
        let mut v = subst[&k];
        loop {
            let next = table.substitute(v, &subst);
            if next == v {
                break;
            }
            v = next;
        }
        resolved.insert(k, v);
    }
    Some(resolved)
}

/// Renames every free variable of `rule` to a fresh name from `gen`.
pub fn rename_apart(table: &mut TermTable, rule: &Rule, gen: &mut SymbolGen) -> Rule {
    let mut vars = table.free_vars(rule.lhs);
    for v in table.free_vars(rule.rhs) {
        if !vars.contains(&v) {
            vars.push(v);
        }
    }
    if let Some(c) = rule.cond {
        for v in table.free_vars(c) {
            if !vars.contains(&v) {
                vars.push(v);
            }
        }
    }
    let mut subst = Subst::default();
    for v in vars {
        let fresh = table.var(gen.fresh(v.as_str()));
        let old = table.var(v);
        subst.insert(old, fresh);
    }
    Rule {
        lhs: table.substitute(rule.lhs, &subst),
        rhs: table.substitute(rule.rhs, &subst),
        cond: rule.cond.map(|c| table.substitute(c, &subst)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_term;

    #[test]
    fn matching_binds_consistently() {
        let mut t = TermTable::default();
        let p = parse_term(&mut t, "(f x x)").unwrap();
        let good = parse_term(&mut t, "(f (g 1) (g 1))").unwrap();
        let bad = parse_term(&mut t, "(f (g 1) (g 2))").unwrap();
        let s = matches(&t, PatternVars::Free, p, good).unwrap();
        let x = t.var("x");
        assert_eq!(t.display(s[&x]).to_string(), "(g 1)");
        assert!(matches(&t, PatternVars::Free, p, bad).is_none());
    }

    #[test]
    fn marked_patterns_treat_free_vars_as_constants() {
        let mut t = TermTable::default();
        let p = parse_term(&mut t, "(f ?a y)").unwrap();
        let ok = parse_term(&mut t, "(f 3 y)").unwrap();
        let no = parse_term(&mut t, "(f 3 z)").unwrap();
        assert!(matches(&t, PatternVars::Marked, p, ok).is_some());
        assert!(matches(&t, PatternVars::Marked, p, no).is_none());
    }

    #[test]
    fn unification_with_occurs_check() {
        let mut t = TermTable::default();
        let a = parse_term(&mut t, "(f x (g y))").unwrap();
        let b = parse_term(&mut t, "(f (g z) x)").unwrap();
        let s = unify(&mut t, a, b).unwrap();
        let a2 = t.substitute(a, &s);
        let b2 = t.substitute(b, &s);
        assert_eq!(a2, b2);

        let c = parse_term(&mut t, "x").unwrap();
        let d = parse_term(&mut t, "(g x)").unwrap();
        assert!(unify(&mut t, c, d).is_none());
    }

    #[test]
    fn renaming_keeps_shape() {
        let mut t = TermTable::default();
        let lhs = parse_term(&mut t, "(f (g x))").unwrap();
        let rhs = parse_term(&mut t, "x").unwrap();
        let mut gen = SymbolGen::default();
        let r = rename_apart(&mut t, &Rule::new(lhs, rhs), &mut gen);
        assert_ne!(r.lhs, lhs);
        assert_eq!(t.free_vars(r.lhs).len(), 1);
        assert_eq!(t.subterm_at(r.lhs, &[0, 0]), Some(r.rhs));
    }
}
