//! Symbolic placeholders and the assignment table that binds them.

use std::collections::BTreeMap;
use std::fmt;

use primitive_types::U256;

/// A named symbolic placeholder. Printable as `$name` per the diagnostic
/// rendering convention described in spec.md §6/§9.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Variable {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The symbolic-to-concrete binding table populated during generation.
///
/// Values are never overwritten once set (spec.md §3): [`Assignment::bind`]
/// fails loudly (via `debug_assert!`) rather than silently clobbering a
/// prior binding, since that would violate the "pre-assigned entries are
/// never overwritten" invariant (spec.md §8 property 8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    values: BTreeMap<Variable, U256>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &Variable) -> Option<U256> {
        self.values.get(var).copied()
    }

    pub fn contains(&self, var: &Variable) -> bool {
        self.values.contains_key(var)
    }

    /// Bind `var` to `value`. Returns `false` (and leaves the table
    /// unchanged) if `var` is already bound to a *different* value;
    /// binding the same value twice is a no-op success, since several
    /// spec.md operations (e.g. `BindToSelfAddress` called twice) legally
    /// reuse an existing binding.
    #[must_use]
    pub fn bind(&mut self, var: Variable, value: U256) -> bool {
        match self.values.get(&var) {
            Some(existing) => *existing == value,
            None => {
                self.values.insert(var, value);
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &U256)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_dollar_prefixed() {
        assert_eq!(Variable::new("X").to_string(), "$X");
    }

    #[test]
    fn bind_rejects_conflicting_rebind() {
        let mut a = Assignment::new();
        assert!(a.bind(Variable::new("x"), U256::from(1)));
        assert!(a.bind(Variable::new("x"), U256::from(1)));
        assert!(!a.bind(Variable::new("x"), U256::from(2)));
        assert_eq!(a.get(&Variable::new("x")), Some(U256::from(1)));
    }
}
