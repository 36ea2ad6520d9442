//! The environment the reasoning kernel works against: rewrite rules,
//! datatype definitions, declared variable types and the set of
//! associative-commutative functors.

use crate::{
    term::{Term, TermId, TermTable},
    util::{HashMap, HashSet, IndexMap},
    Error, Symbol,
};

/// A conditional rewrite rule `lhs -> rhs` that fires when `cond` rewrites
/// to `True`. Variables of `lhs` are pattern variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub lhs: TermId,
    pub rhs: TermId,
    pub cond: Option<TermId>,
}

impl Rule {
    pub fn new(lhs: TermId, rhs: TermId) -> Self {
        Self {
            lhs,
            rhs,
            cond: None,
        }
    }

    pub fn with_cond(lhs: TermId, rhs: TermId, cond: TermId) -> Self {
        Self {
            lhs,
            rhs,
            cond: Some(cond),
        }
    }

    /// Encodes the rule as a `(rule lhs rhs [cond])` term, the shape the
    /// `kb_rules` builtin consumes and produces.
    pub fn to_term(&self, table: &mut TermTable) -> TermId {
        let mut args = vec![self.lhs, self.rhs];
        args.extend(self.cond);
        table.app(*crate::symbols::RULE, args)
    }

    pub fn from_term(table: &TermTable, id: TermId) -> Option<Self> {
        match table.app_of(id, *crate::symbols::RULE)? {
            [lhs, rhs] => Some(Rule::new(*lhs, *rhs)),
            [lhs, rhs, cond] => Some(Rule::with_cond(*lhs, *rhs, *cond)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constructor {
    pub name: Symbol,
    /// Type names of the arguments.
    pub args: Vec<Symbol>,
}

/// Structural shape of a datatype, used for case splits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDef {
    pub name: Symbol,
    pub constructors: Vec<Constructor>,
}

#[derive(Clone, Debug, Default)]
pub struct Env {
    /// Rules indexed by the functor at the head of their left-hand side.
    /// Use an [`IndexMap`] so rule application order is deterministic.
    rules: IndexMap<Symbol, Vec<Rule>>,
    types: IndexMap<Symbol, TypeDef>,
    constructors: HashMap<Symbol, Symbol>,
    var_types: HashMap<Symbol, Symbol>,
    ac: HashSet<Symbol>,
}

impl Env {
    pub fn add_rule(&mut self, table: &TermTable, rule: Rule) -> Result<(), Error> {
        let head = table
            .functor(rule.lhs)
            .ok_or_else(|| Error::BadRule(table.display(rule.lhs).to_string()))?;
        let rhs_vars = table.free_vars(rule.rhs);
        let lhs_vars = table.free_vars(rule.lhs);
        if let Some(v) = rhs_vars.iter().find(|v| !lhs_vars.contains(v)) {
            return Err(Error::UnboundVariable(*v));
        }
        let rules = self.rules.entry(head).or_default();
        if !rules.contains(&rule) {
            log::debug!(
                "adding rule {} -> {}",
                table.display(rule.lhs),
                table.display(rule.rhs)
            );
            rules.push(rule);
        }
        Ok(())
    }

    pub fn rules_for(&self, functor: Symbol) -> &[Rule] {
        self.rules.get(&functor).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.values().flatten()
    }

    pub fn num_rules(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn add_type(&mut self, def: TypeDef) -> Result<(), Error> {
        if self.types.contains_key(&def.name) {
            return Err(Error::TypeAlreadyDefined(def.name));
        }
        for c in &def.constructors {
            self.constructors.insert(c.name, def.name);
        }
        self.types.insert(def.name, def);
        Ok(())
    }

    pub fn type_definition(&self, name: Symbol) -> Option<&TypeDef> {
        self.types.get(&name)
    }

    pub fn constructor_type(&self, functor: Symbol) -> Option<Symbol> {
        self.constructors.get(&functor).copied()
    }

    pub fn is_constructor(&self, functor: Symbol) -> bool {
        self.constructors.contains_key(&functor)
    }

    /// Is `id` an application of a datatype constructor?
    pub fn is_constructor_app(&self, table: &TermTable, id: TermId) -> bool {
        table.functor(id).is_some_and(|f| self.is_constructor(f))
    }

    /// Argument types of a constructor, if it is one.
    pub fn constructor(&self, functor: Symbol) -> Option<&Constructor> {
        let ty = self.constructor_type(functor)?;
        self.types[&ty]
            .constructors
            .iter()
            .find(|c| c.name == functor)
    }

    pub fn declare_var(&mut self, var: Symbol, ty: Symbol) {
        self.var_types.insert(var, ty);
    }

    pub fn var_type(&self, var: Symbol) -> Option<Symbol> {
        self.var_types.get(&var).copied()
    }

    /// Adds the variable types of `other` that are not declared here.
    pub(crate) fn keep_var_types(&mut self, other: &Env) {
        for (v, ty) in &other.var_types {
            self.var_types.entry(*v).or_insert(*ty);
        }
    }

    /// Type of a term when it can be read off without inference: declared
    /// variables and constructor applications.
    pub fn type_of(&self, table: &TermTable, id: TermId) -> Option<Symbol> {
        match table.get(id) {
            Term::Var(v) => self.var_type(*v),
            Term::App(f, _) => self.constructor_type(*f),
            _ => None,
        }
    }

    pub fn add_ac(&mut self, functor: Symbol) {
        self.ac.insert(functor);
    }

    pub fn is_ac(&self, functor: Symbol) -> bool {
        self.ac.contains(&functor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_are_indexed_by_head() {
        let mut table = TermTable::default();
        let mut env = Env::default();
        let x = table.var("x");
        let fx = table.app("f".into(), vec![x]);
        env.add_rule(&table, Rule::new(fx, x)).unwrap();
        env.add_rule(&table, Rule::new(fx, x)).unwrap();
        assert_eq!(env.rules_for("f".into()).len(), 1);
        assert!(env.rules_for("g".into()).is_empty());
        assert!(env.add_rule(&table, Rule::new(x, fx)).is_err());
    }

    #[test]
    fn rhs_variables_must_be_bound() {
        let mut table = TermTable::default();
        let mut env = Env::default();
        let x = table.var("x");
        let y = table.var("y");
        let fx = table.app("f".into(), vec![x]);
        assert!(matches!(
            env.add_rule(&table, Rule::new(fx, y)),
            Err(Error::UnboundVariable(_))
        ));
    }

    #[test]
    fn constructors_know_their_type() {
        let mut env = Env::default();
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
        assert_eq!(env.constructor_type("cons".into()), Some("List".into()));
        assert_eq!(env.constructor("cons".into()).unwrap().args.len(), 2);
        assert!(env.type_definition("List".into()).is_some());
        assert!(env
            .add_type(TypeDef {
                name: "List".into(),
                constructors: vec![],
            })
            .is_err());
    }
}
