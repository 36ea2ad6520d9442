use std::fmt::Display;

pub(crate) type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, BuildHasher>;
pub(crate) type HashSet<K> = hashbrown::HashSet<K, BuildHasher>;
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type IndexSet<K> = indexmap::IndexSet<K, BuildHasher>;

/// Persistent maps used for everything a scope push has to snapshot.
pub(crate) type PMap<K, V> = im_rc::HashMap<K, V, BuildHasher>;

pub const INTERNAL_SYMBOL_PREFIX: &str = "_";

/// Prints the items of an iterator separated by `sep`.
pub struct ListDisplay<'a, TS>(pub TS, pub &'a str);

impl<'a, TS> Display for ListDisplay<'a, TS>
where
    TS: Clone + IntoIterator,
    TS::Item: Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut did_something = false;
        for item in self.0.clone().into_iter() {
            if did_something {
                f.write_str(self.1)?;
            }
            Display::fmt(&item, f)?;
            did_something = true;
        }
        Ok(())
    }
}

/// Generates fresh variable names for internal use during case splits and
/// critical pair computation. Names carry a numeric suffix that is bumped
/// on every call, so two names from the same generator never collide.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolGen {
    count: usize,
}

impl SymbolGen {
    pub fn has_been_used(&self) -> bool {
        self.count > 0
    }

    pub fn fresh(&mut self, name_hint: &str) -> String {
        let s = format!("{name_hint}{INTERNAL_SYMBOL_PREFIX}{}", self.count);
        self.count += 1;
        s
    }
}
