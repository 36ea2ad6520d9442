//! Pattern-directed normalization: rewriting a term until it is an
//! instance of a pattern whose marked variables (`?x`) are wildcards.
//!
//! Two kinds of steps are alternated. A top step works from the root down,
//! replacing a mismatching subterm by an alternative that matches the
//! pattern strictly better. A bottom step works on the subterms sitting
//! under wildcards that occur more than once, trying to make their
//! bindings agree. Plain rewriting is the fallback when neither helps.

use crate::{
    matching::{matches, PatternVars},
    rewrite::Rewriter,
    term::{Term, TermId, TermTable},
    util::{HashMap, HashSet},
};

/// How two candidate terms compare as instances of a pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchComparison {
    Better,
    Worse,
    Equal,
    /// Each is closer to the pattern in some argument position. Neither
    /// may be picked over the other.
    Incomparable,
}

fn same_head(table: &TermTable, p: TermId, t: TermId) -> bool {
    match (table.get(p), table.get(t)) {
        (Term::App(f, xs), Term::App(g, ys)) => f == g && xs.len() == ys.len(),
        (
            Term::Quant {
                kind: k1, vars: v1, ..
            },
            Term::Quant {
                kind: k2, vars: v2, ..
            },
        ) => k1 == k2 && v1 == v2,
        (Term::Case { arms: a1, .. }, Term::Case { arms: a2, .. }) => a1.len() == a2.len(),
        _ => false,
    }
}

/// Size of the parts of `t` that disagree with `pattern`, ignoring how
/// wildcards are bound.
pub fn distance(table: &TermTable, pattern: TermId, t: TermId) -> usize {
    if pattern == t || matches!(table.get(pattern), Term::Marked(_)) {
        return 0;
    }
    if !same_head(table, pattern, t) {
        return table.size(t);
    }
    table
        .children(pattern)
        .into_iter()
        .zip(table.children(t))
        .map(|(p, c)| distance(table, p, c))
        .sum()
}

/// Compares `a` against `b` as instances of `pattern`. When both share the
/// pattern's head the argument distances are compared pointwise, otherwise
/// the total distance decides.
pub fn compare_match(table: &TermTable, pattern: TermId, a: TermId, b: TermId) -> MatchComparison {
    if a == b {
        return MatchComparison::Equal;
    }
    let total = |t| distance(table, pattern, t);
    match (same_head(table, pattern, a), same_head(table, pattern, b)) {
        (true, false) => return MatchComparison::Better,
        (false, true) => return MatchComparison::Worse,
        (false, false) => {
            return match total(a).cmp(&total(b)) {
                std::cmp::Ordering::Less => MatchComparison::Better,
                std::cmp::Ordering::Greater => MatchComparison::Worse,
                std::cmp::Ordering::Equal => MatchComparison::Equal,
            }
        }
        (true, true) => {}
    }
    let (mut better, mut worse) = (false, false);
    let ps = table.children(pattern);
    for ((p, x), y) in ps.iter().zip(table.children(a)).zip(table.children(b)) {
        match distance(table, *p, x).cmp(&distance(table, *p, y)) {
            std::cmp::Ordering::Less => better = true,
            std::cmp::Ordering::Greater => worse = true,
            std::cmp::Ordering::Equal => {}
        }
    }
    match (better, worse) {
        (true, true) => MatchComparison::Incomparable,
        (true, false) => MatchComparison::Better,
        (false, true) => MatchComparison::Worse,
        (false, false) => MatchComparison::Equal,
    }
}

/// Counts the positions at which `t` fails to be an instance of `pattern`:
/// each mismatching head counts once, as does each wildcard occurrence
/// whose subterm differs from the first binding of that wildcard.
pub fn bad_term_count(table: &TermTable, pattern: TermId, t: TermId) -> usize {
    let mut bindings: HashMap<TermId, TermId> = HashMap::default();
    let mut count = 0;
    let mut stack = vec![(pattern, t)];
    while let Some((p, t)) = stack.pop() {
        if matches!(table.get(p), Term::Marked(_)) {
            match bindings.get(&p) {
                Some(bound) if *bound != t => count += 1,
                Some(_) => {}
                None => {
                    bindings.insert(p, t);
                }
            }
            continue;
        }
        if p == t {
            continue;
        }
        if !same_head(table, p, t) {
            count += 1;
            continue;
        }
        // reversed so bindings are made left to right
        let pairs: Vec<_> = table.children(p).into_iter().zip(table.children(t)).collect();
        stack.extend(pairs.into_iter().rev());
    }
    count
}

/// Positions (paths) in `t` under the wildcard occurrences of `pattern`,
/// grouped per wildcard in left-to-right order.
fn wildcard_positions(table: &TermTable, pattern: TermId, t: TermId) -> Vec<(TermId, Vec<usize>)> {
    let mut out = vec![];
    let mut stack = vec![(pattern, t, vec![])];
    while let Some((p, t, path)) = stack.pop() {
        if matches!(table.get(p), Term::Marked(_)) {
            out.push((p, path));
            continue;
        }
        if p == t || !same_head(table, p, t) {
            continue;
        }
        let pairs: Vec<_> = table.children(p).into_iter().zip(table.children(t)).collect();
        for (i, (pc, tc)) in pairs.into_iter().enumerate().rev() {
            let mut path = path.clone();
            path.push(i);
            stack.push((pc, tc, path));
        }
    }
    out
}

/// For an associative-commutative head shared by `pattern` and `t`,
/// reorders the arguments of `t` so each pattern argument faces the
/// closest remaining argument. Other terms are returned unchanged.
pub fn best_order(rw: &mut Rewriter<'_>, pattern: TermId, t: TermId) -> TermId {
    let (Some(f), Some(g)) = (rw.table.functor(pattern), rw.table.functor(t)) else {
        return t;
    };
    if f != g || !rw.env.is_ac(f) || rw.table.args(pattern).len() != rw.table.args(t).len() {
        return t;
    }
    let mut remaining = rw.table.args(t).to_vec();
    let mut ordered = Vec::with_capacity(remaining.len());
    for p in rw.table.args(pattern).to_vec() {
        let mut best = 0;
        for (i, a) in remaining.iter().enumerate() {
            if distance(rw.table, p, *a) < distance(rw.table, p, remaining[best]) {
                best = i;
            }
        }
        ordered.push(remaining.remove(best));
    }
    rw.table.app(g, ordered)
}

/// Picks the strictly best candidate. Returns `None` if no candidate beats
/// `current` or if the best ones are incomparable with each other.
fn pick_better(
    table: &TermTable,
    pattern: TermId,
    current: TermId,
    candidates: Vec<TermId>,
    visited: &HashSet<TermId>,
) -> Option<TermId> {
    let better: Vec<TermId> = candidates
        .into_iter()
        .filter(|c| !visited.contains(c))
        .filter(|c| compare_match(table, pattern, *c, current) == MatchComparison::Better)
        .collect();
    let mut best: Option<TermId> = None;
    for c in &better {
        best = match best {
            None => Some(*c),
            Some(b) => match compare_match(table, pattern, *c, b) {
                MatchComparison::Better => Some(*c),
                _ => Some(b),
            },
        };
    }
    let best = best?;
    let clash = better.iter().any(|c| {
        *c != best && compare_match(table, pattern, *c, best) == MatchComparison::Incomparable
    });
    if clash {
        log::trace!("incomparable candidates for {}", table.display(pattern));
        None
    } else {
        Some(best)
    }
}

/// Moves `t` closer to `pattern` from the root down. At a matching head
/// the first mismatching argument is worked on recursively; at a
/// mismatching head the alternatives of `t` itself are considered.
pub fn top_step(
    rw: &mut Rewriter<'_>,
    pattern: TermId,
    t: TermId,
    visited: &HashSet<TermId>,
) -> Option<TermId> {
    if distance(rw.table, pattern, t) == 0 {
        return None;
    }
    if same_head(rw.table, pattern, t) {
        let ps = rw.table.children(pattern);
        let mut children = rw.table.children(t);
        for (i, p) in ps.into_iter().enumerate() {
            if distance(rw.table, p, children[i]) == 0 {
                continue;
            }
            if let Some(c) = top_step(rw, p, children[i], &HashSet::default()) {
                children[i] = c;
                let next = rw.table.with_children(t, children);
                return (!visited.contains(&next)).then_some(next);
            }
        }
        return None;
    }
    let candidates = rw.alternatives(t);
    pick_better(rw.table, pattern, t, candidates, visited)
}

/// Tries to make the subterms bound to one wildcard agree, by replacing a
/// disagreeing occurrence with an alternative that lowers
/// [`bad_term_count`].
pub fn bottom_step(
    rw: &mut Rewriter<'_>,
    pattern: TermId,
    t: TermId,
    visited: &HashSet<TermId>,
) -> Option<TermId> {
    let current = bad_term_count(rw.table, pattern, t);
    if current == 0 {
        return None;
    }
    let positions = wildcard_positions(rw.table, pattern, t);
    let mut first: HashMap<TermId, TermId> = HashMap::default();
    for (w, path) in positions {
        let sub = rw.table.subterm_at(t, &path)?;
        let bound = *first.entry(w).or_insert(sub);
        if bound == sub {
            continue;
        }
        // both the earlier binding and this occurrence may move
        for alt in rw.alternatives(sub) {
            let next = rw.table.replace_at(t, &path, alt)?;
            if !visited.contains(&next) && bad_term_count(rw.table, pattern, next) < current {
                return Some(next);
            }
        }
        for alt in rw.alternatives(bound) {
            if alt == sub {
                let mut next = t;
                for (w2, p2) in wildcard_positions(rw.table, pattern, t) {
                    if w2 == w && rw.table.subterm_at(t, &p2) == Some(bound) {
                        next = rw.table.replace_at(next, &p2, sub)?;
                    }
                }
                if !visited.contains(&next) {
                    return Some(next);
                }
            }
        }
    }
    None
}

/// Rewrites `t` towards an instance of `pattern`. Returns the final term
/// and whether it matches. Never revisits a term, and gives up after the
/// configured number of steps.
pub fn normalize(rw: &mut Rewriter<'_>, pattern: TermId, t: TermId) -> (TermId, bool) {
    let mut visited: HashSet<TermId> = HashSet::default();
    let mut current = t;
    let ac = rw.table.functor(pattern).is_some_and(|f| rw.env.is_ac(f));
    for _ in 0..rw.config().max_normalize_steps {
        if matches(rw.table, PatternVars::Marked, pattern, current).is_some() {
            return (current, true);
        }
        visited.insert(current);
        if ac {
            let reordered = best_order(rw, pattern, current);
            if reordered != current && !visited.contains(&reordered) {
                current = reordered;
                continue;
            }
        }
        if let Some(next) = top_step(rw, pattern, current, &visited) {
            log::trace!("top step to {}", rw.table.display(next));
            current = next;
            continue;
        }
        if let Some(next) = bottom_step(rw, pattern, current, &visited) {
            log::trace!("bottom step to {}", rw.table.display(next));
            current = next;
            continue;
        }
        let next = rw.rewrite(current);
        if next != current && !visited.contains(&next) {
            current = next;
            continue;
        }
        break;
    }
    let complete = matches(rw.table, PatternVars::Marked, pattern, current).is_some();
    log::debug!(
        "normalized to {} ({})",
        rw.table.display(current),
        if complete { "matches" } else { "no match" }
    );
    (current, complete)
}
