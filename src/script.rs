//! The command language used by test scripts and the binary.
//!
//! A program is a sequence of s-expressions, each one a [`Command`].
//! Terms inside commands use the syntax of [`crate::parse`].

use std::fmt::{self, Display, Formatter};

use crate::{
    parse::{parse_sexps, term_from_sexp, ParseError, Sexp, Span},
    util::ListDisplay,
    Constructor, Engine, Error, Rule, SearchReport, Symbol, TermId, TypeDef,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Adds a rewrite rule, optionally guarded by a condition that must
    /// rewrite to `True` before the rule fires.
    /// ```text
    /// (rule (len (cons x l)) (+ 1 (len l)))
    /// (rule (abs x) x (>= x 0))
    /// ```
    Rule(Span, Rule),
    /// Declares a datatype by its constructors. Nullary constructors are
    /// written as atoms or empty lists, and their terms as `(nil)`.
    /// ```text
    /// (datatype list nil (cons Int list))
    /// ```
    Datatype(Span, TypeDef),
    /// Gives a variable a type, which case splits use.
    Declare(Span, Symbol, Symbol),
    /// Marks a functor associative-commutative for normalization.
    Ac(Span, Symbol),
    Assert(Span, TermId),
    Deny(Span, TermId),
    /// Prints the rewritten term.
    Rewrite(Span, TermId),
    /// Fails unless the term rewrites to the expected one (`True` when
    /// omitted).
    /// ```text
    /// (check (+ 1 2) 3)
    /// (check (< a c))
    /// ```
    Check(Span, TermId, Option<TermId>),
    /// Fails unless assuming all the given predicates is contradictory.
    /// The current scope is left untouched.
    CheckContradiction(Span, Vec<TermId>),
    /// Normalizes a term towards a pattern whose `?x` variables are
    /// wildcards.
    /// ```text
    /// (normalize (f ?x ?x) (f (k a) b))
    /// ```
    Normalize(Span, TermId, TermId),
    /// Case split on a typed variable. The optional path leads to the
    /// quantifier binding it.
    /// ```text
    /// (expand (len l) l)
    /// (expand (and (all (l) (p l)) q) l 0)
    /// ```
    Expand(Span, TermId, Symbol, Vec<usize>),
    /// Fails unless the best-first search proves the goal.
    Prove(Span, TermId),
    /// Adds the critical pairs between the current rules as new rules.
    Kb(Span),
    Push(Span),
    Pop(Span),
    /// Options:
    /// - `implications` (0 or 1, default 1)
    /// - `max_rewrite_steps` (default 256)
    /// - `max_normalize_steps` (default 64)
    /// - `max_search_nodes` (default 512)
    SetOption(Span, String, usize),
}

#[derive(Clone, Debug)]
pub enum CommandOutput {
    Term(String),
    Normalized { term: String, complete: bool },
    Cases(Vec<(String, String)>),
    Proof(SearchReport),
    Contradiction(String),
    Rules(Vec<String>),
}

impl Display for CommandOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Term(t) => write!(f, "{t}"),
            CommandOutput::Normalized { term, complete } => {
                write!(f, "{term}")?;
                if !complete {
                    write!(f, " (no match)")?;
                }
                Ok(())
            }
            CommandOutput::Cases(cases) => {
                let lines = cases.iter().map(|(t, w)| format!("{w}: {t}"));
                write!(f, "{}", ListDisplay(lines, "\n"))
            }
            CommandOutput::Proof(report) => write!(f, "{report}"),
            CommandOutput::Contradiction(c) => write!(f, "{c}"),
            CommandOutput::Rules(rules) => write!(f, "{}", ListDisplay(rules, "\n")),
        }
    }
}

fn bad(sexp: &Sexp, usage: &'static str) -> ParseError {
    ParseError::BadCommand(sexp.span().clone(), usage)
}

fn symbol(sexp: &Sexp) -> Result<Symbol, ParseError> {
    sexp.atom()
        .map(Symbol::from)
        .ok_or_else(|| ParseError::ExpectedAtom(sexp.span().clone()))
}

fn index(sexp: &Sexp, usage: &'static str) -> Result<usize, ParseError> {
    sexp.atom()
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| bad(sexp, usage))
}

fn constructor(sexp: &Sexp) -> Result<Constructor, ParseError> {
    match sexp {
        Sexp::Atom(name, _) => Ok(Constructor {
            name: name.as_str().into(),
            args: vec![],
        }),
        Sexp::List(items, _) => {
            let Some((name, args)) = items.split_first() else {
                return Err(bad(sexp, "(Ctor ArgType*)"));
            };
            Ok(Constructor {
                name: symbol(name)?,
                args: args.iter().map(symbol).collect::<Result<_, _>>()?,
            })
        }
        Sexp::Str(..) => Err(bad(sexp, "(Ctor ArgType*)")),
    }
}

impl Engine {
    fn term(&mut self, sexp: &Sexp) -> Result<TermId, ParseError> {
        term_from_sexp(&mut self.terms, sexp)
    }

    fn parse_command(&mut self, sexp: &Sexp) -> Result<Command, ParseError> {
        let span = sexp.span().clone();
        let Some((head, args)) = sexp.list().and_then(|l| l.split_first()) else {
            return Err(bad(sexp, "(command args...)"));
        };
        let name = head
            .atom()
            .ok_or_else(|| ParseError::ExpectedAtom(head.span().clone()))?;
        Ok(match (name, args) {
            ("rule", [lhs, rhs]) => Command::Rule(span, Rule::new(self.term(lhs)?, self.term(rhs)?)),
            ("rule", [lhs, rhs, cond]) => Command::Rule(
                span,
                Rule::with_cond(self.term(lhs)?, self.term(rhs)?, self.term(cond)?),
            ),
            ("rule", _) => return Err(bad(sexp, "(rule lhs rhs [cond])")),
            ("datatype", [name, ctors @ ..]) => Command::Datatype(
                span,
                TypeDef {
                    name: symbol(name)?,
                    constructors: ctors.iter().map(constructor).collect::<Result<_, _>>()?,
                },
            ),
            ("datatype", _) => return Err(bad(sexp, "(datatype T (Ctor ArgType*)*)")),
            ("declare", [var, ty]) => Command::Declare(span, symbol(var)?, symbol(ty)?),
            ("declare", _) => return Err(bad(sexp, "(declare var Type)")),
            ("ac", [f]) => Command::Ac(span, symbol(f)?),
            ("ac", _) => return Err(bad(sexp, "(ac functor)")),
            ("assert", [p]) => Command::Assert(span, self.term(p)?),
            ("deny", [p]) => Command::Deny(span, self.term(p)?),
            ("rewrite", [t]) => Command::Rewrite(span, self.term(t)?),
            ("check", [t]) => Command::Check(span, self.term(t)?, None),
            ("check", [t, expected]) => {
                Command::Check(span, self.term(t)?, Some(self.term(expected)?))
            }
            ("check", _) => return Err(bad(sexp, "(check term [expected])")),
            ("check-contradiction", ps) => Command::CheckContradiction(
                span,
                ps.iter().map(|p| self.term(p)).collect::<Result<_, _>>()?,
            ),
            ("normalize", [pattern, t]) => Command::Normalize(span, self.term(pattern)?, self.term(t)?),
            ("normalize", _) => return Err(bad(sexp, "(normalize pattern term)")),
            ("expand", [t, var, path @ ..]) => Command::Expand(
                span,
                self.term(t)?,
                symbol(var)?,
                path.iter()
                    .map(|i| index(i, "(expand term var index*)"))
                    .collect::<Result<_, _>>()?,
            ),
            ("expand", _) => return Err(bad(sexp, "(expand term var index*)")),
            ("prove", [goal]) => Command::Prove(span, self.term(goal)?),
            ("kb", []) => Command::Kb(span),
            ("push", []) => Command::Push(span),
            ("pop", []) => Command::Pop(span),
            ("set-option", [name, value]) => Command::SetOption(
                span,
                symbol(name)?.to_string(),
                index(value, "(set-option name number)")?,
            ),
            ("set-option", _) => return Err(bad(sexp, "(set-option name number)")),
            ("assert" | "deny" | "rewrite" | "prove", _) => {
                return Err(bad(sexp, "exactly one term"))
            }
            ("kb" | "push" | "pop", _) => return Err(bad(sexp, "no arguments")),
            (other, _) => return Err(ParseError::UnknownCommand(head.span().clone(), other.to_string())),
        })
    }

    pub fn parse_program(
        &mut self,
        filename: Option<String>,
        input: &str,
    ) -> Result<Vec<Command>, Error> {
        let sexps = parse_sexps(filename, input)?;
        let mut out = Vec::with_capacity(sexps.len());
        for sexp in &sexps {
            out.push(self.parse_command(sexp)?);
        }
        Ok(out)
    }

    pub fn run_command(&mut self, command: Command) -> Result<Option<CommandOutput>, Error> {
        let show = |e: &Self, t: TermId| e.terms.display(t).to_string();
        Ok(match command {
            Command::Rule(_, rule) => {
                self.add_rule(rule)?;
                None
            }
            Command::Datatype(_, def) => {
                self.env.add_type(def)?;
                None
            }
            Command::Declare(_, var, ty) => {
                self.env.declare_var(var, ty);
                None
            }
            Command::Ac(_, f) => {
                self.env.add_ac(f);
                None
            }
            Command::Assert(_, p) => {
                self.assert_predicate(p)
                    .map_err(|c| self.contradiction_error(&c))?;
                None
            }
            Command::Deny(_, p) => {
                self.deny_predicate(p)
                    .map_err(|c| self.contradiction_error(&c))?;
                None
            }
            Command::Rewrite(_, t) => {
                let r = self.rewrite(t);
                Some(CommandOutput::Term(show(self, r)))
            }
            Command::Check(span, t, expected) => {
                let r = self.rewrite(t);
                let expected = match expected {
                    Some(e) => self.rewrite(e),
                    None => self.terms.true_term(),
                };
                if r != expected {
                    log::error!("{span}");
                    return Err(Error::CheckFailed {
                        expected: show(self, expected),
                        actual: show(self, r),
                    });
                }
                None
            }
            Command::CheckContradiction(span, ps) => {
                let found = self.scoped(|e| {
                    for p in ps {
                        if let Err(c) = e.assert_predicate(p) {
                            return Some(c.display(&e.terms).to_string());
                        }
                    }
                    None
                });
                match found {
                    Some(c) => Some(CommandOutput::Contradiction(c)),
                    None => {
                        log::error!("{span}");
                        return Err(Error::CheckFailed {
                            expected: "a contradiction".into(),
                            actual: "consistent facts".into(),
                        });
                    }
                }
            }
            Command::Normalize(_, pattern, t) => {
                let (r, complete) = self.normalize(pattern, t);
                Some(CommandOutput::Normalized {
                    term: show(self, r),
                    complete,
                })
            }
            Command::Expand(_, t, var, path) => {
                let cases = self.expand_variable(t, var, &path)?;
                Some(CommandOutput::Cases(
                    cases
                        .into_iter()
                        .map(|(c, w)| (show(self, c), show(self, w)))
                        .collect(),
                ))
            }
            Command::Prove(span, goal) => {
                let report = self.prove(goal);
                if !report.proved {
                    log::error!("{span}");
                    return Err(Error::CheckFailed {
                        expected: format!("a proof of {}", show(self, goal)),
                        actual: report.to_string(),
                    });
                }
                Some(CommandOutput::Proof(report))
            }
            Command::Kb(_) => {
                let mut added = vec![];
                for rule in self.critical_pairs() {
                    match self.add_rule(rule) {
                        Ok(()) => added.push(format!(
                            "(rule {} {})",
                            show(self, rule.lhs),
                            show(self, rule.rhs)
                        )),
                        Err(err) => log::warn!("skipping critical pair: {err}"),
                    }
                }
                Some(CommandOutput::Rules(added))
            }
            Command::Push(_) => {
                self.trans_push()
                    .map_err(|c| self.contradiction_error(&c))?;
                None
            }
            Command::Pop(_) => {
                self.trans_pop()?;
                None
            }
            Command::SetOption(span, name, value) => {
                match name.as_str() {
                    "implications" => {
                        self.config.do_implications = value != 0;
                        self.scope.cc.do_implications = value != 0;
                    }
                    "max_rewrite_steps" => self.config.max_rewrite_steps = value,
                    "max_normalize_steps" => self.config.max_normalize_steps = value,
                    "max_search_nodes" => self.config.max_search_nodes = value,
                    _ => log::warn!("{span}\nunknown option {name}"),
                }
                None
            }
        })
    }

    pub fn run_program(&mut self, program: Vec<Command>) -> Result<Vec<CommandOutput>, Error> {
        let mut outputs = vec![];
        for command in program {
            outputs.extend(self.run_command(command)?);
        }
        log::logger().flush();
        Ok(outputs)
    }

    /// Parses and runs a program, returning the printed outputs.
    pub fn parse_and_run_program(
        &mut self,
        filename: Option<String>,
        input: &str,
    ) -> Result<Vec<String>, Error> {
        let program = self.parse_program(filename, input)?;
        Ok(self
            .run_program(program)?
            .into_iter()
            .map(|o| o.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(e: &mut Engine, program: &str) -> Result<Vec<String>, Error> {
        e.parse_and_run_program(None, program)
    }

    #[test]
    fn rewriting_and_checks() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut e = Engine::default();
        let out = run(
            &mut e,
            "(rule (double x) (+ x x))
             (rewrite (double 4))
             (check (double 1) 2)
             (assert (< a b))
             (check (<= a b))",
        )
        .unwrap();
        assert_eq!(out, vec!["8"]);
        assert!(matches!(
            run(&mut e, "(check (double 1) 3)"),
            Err(Error::CheckFailed { .. })
        ));
    }

    #[test]
    fn scopes_and_contradictions() {
        let mut e = Engine::default();
        run(&mut e, "(push) (assert (= a 1)) (check a 1) (pop)").unwrap();
        assert!(matches!(run(&mut e, "(check a 1)"), Err(Error::CheckFailed { .. })));
        assert!(matches!(run(&mut e, "(pop)"), Err(Error::ScopeUnderflow)));
        let out = run(&mut e, "(check-contradiction (< x y) (< y x))").unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            run(&mut e, "(check-contradiction (< x y))"),
            Err(Error::CheckFailed { .. })
        ));
        assert!(matches!(
            run(&mut e, "(assert (= 1 2))"),
            Err(Error::Contradiction(_))
        ));
    }

    #[test]
    fn datatypes_and_case_splits() {
        let mut e = Engine::default();
        let out = run(
            &mut e,
            "(datatype list nil (cons Int list))
             (declare l list)
             (expand (len l) l)",
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("(= l (nil)): (len (nil))"), "{}", out[0]);
    }

    #[test]
    fn parse_errors() {
        let mut e = Engine::default();
        assert!(matches!(
            run(&mut e, "(frobnicate x)"),
            Err(Error::Parse(ParseError::UnknownCommand(_, name))) if name == "frobnicate"
        ));
        assert!(matches!(
            run(&mut e, "(rule x)"),
            Err(Error::Parse(ParseError::BadCommand(..)))
        ));
        assert!(matches!(
            run(&mut e, "(push 1)"),
            Err(Error::Parse(ParseError::BadCommand(..)))
        ));
    }
}
