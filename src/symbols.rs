//! Interned names of the functors the kernel knows about.
//!
//! Interning goes through [`symbol_table::GlobalSymbol`]: `Symbol::from(name)`
//! interns and `Symbol::as_str` decodes.

use crate::Symbol;

lazy_static::lazy_static! {
    pub static ref TRUE: Symbol = Symbol::from("True");
    pub static ref FALSE: Symbol = Symbol::from("False");

    // boolean connectives
    pub static ref AND: Symbol = Symbol::from("and");
    pub static ref NC_AND: Symbol = Symbol::from("nc_and");
    pub static ref OR: Symbol = Symbol::from("or");
    pub static ref NOT: Symbol = Symbol::from("not");
    pub static ref ITE: Symbol = Symbol::from("ite");
    pub static ref IMPLIES: Symbol = Symbol::from("=>");

    // relations
    pub static ref EQUAL: Symbol = Symbol::from("=");
    pub static ref NOT_EQUAL: Symbol = Symbol::from("!=");
    pub static ref LESS: Symbol = Symbol::from("<");
    pub static ref LESS_EQ: Symbol = Symbol::from("<=");
    pub static ref GREATER: Symbol = Symbol::from(">");
    pub static ref GREATER_EQ: Symbol = Symbol::from(">=");
    pub static ref SUBSET: Symbol = Symbol::from("subset");
    pub static ref PSUBSET: Symbol = Symbol::from("psubset");
    pub static ref SEPARATE: Symbol = Symbol::from("separate");

    // arithmetic
    pub static ref PLUS: Symbol = Symbol::from("+");
    pub static ref MINUS: Symbol = Symbol::from("-");
    pub static ref TIMES: Symbol = Symbol::from("*");
    pub static ref DIVIDE: Symbol = Symbol::from("/");
    pub static ref MOD: Symbol = Symbol::from("mod");

    // sets
    pub static ref SET: Symbol = Symbol::from("set");
    pub static ref UNION: Symbol = Symbol::from("union");
    pub static ref INTERSECT: Symbol = Symbol::from("intersect");
    pub static ref MEMBER: Symbol = Symbol::from("member");

    // reflection
    pub static ref IS_APPL: Symbol = Symbol::from("is_appl");
    pub static ref ARG_COUNT: Symbol = Symbol::from("arg_count");
    pub static ref FUNCTOR_ARGS: Symbol = Symbol::from("functor_args");
    pub static ref TYPE_OF: Symbol = Symbol::from("type_of");
    pub static ref ARGS: Symbol = Symbol::from("args");

    // rewriting meta predicates
    pub static ref PRECEQ: Symbol = Symbol::from("preceq");
    pub static ref KB_RULES: Symbol = Symbol::from("kb_rules");
    pub static ref RULE: Symbol = Symbol::from("rule");

    // type names produced by `type_of`
    pub static ref INT_TYPE: Symbol = Symbol::from("Int");
    pub static ref REAL_TYPE: Symbol = Symbol::from("Real");
    pub static ref STRING_TYPE: Symbol = Symbol::from("String");
    pub static ref BOOL_TYPE: Symbol = Symbol::from("Bool");
    pub static ref SET_TYPE: Symbol = Symbol::from("Set");
}
