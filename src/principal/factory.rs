use std::collections::HashMap;

use super::Principal;
use crate::compiler::CompilerOptions;
use crate::parser::Scanner;

pub type PrincipalId = usize;

/// Deduplicates principals by the canonical fingerprint of their compiler
/// options, so semantically-equivalent configs share one analysis context.
#[derive(Default)]
pub struct PrincipalFactory {
    principals: Vec<Principal>,
    by_fingerprint: HashMap<String, PrincipalId>,
}

impl PrincipalFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the principal for a compiler-options group.
    pub fn get_principal(&mut self, options: &CompilerOptions) -> PrincipalId {
        let fingerprint = options.fingerprint();
        if let Some(&id) = self.by_fingerprint.get(&fingerprint) {
            return id;
        }
        let id = self.principals.len();
        self.principals.push(Principal::new(
            fingerprint.clone(),
            Box::new(Scanner::new(options.clone())),
        ));
        self.by_fingerprint.insert(fingerprint, id);
        id
    }

    pub fn principal(&self, id: PrincipalId) -> &Principal {
        &self.principals[id]
    }

    pub fn principal_mut(&mut self, id: PrincipalId) -> &mut Principal {
        &mut self.principals[id]
    }

    pub fn ids(&self) -> impl Iterator<Item = PrincipalId> {
        0..self.principals.len()
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_identical_options_share_a_principal() {
        let mut factory = PrincipalFactory::new();
        let a = factory.get_principal(&CompilerOptions::default());
        let b = factory.get_principal(&CompilerOptions::default());
        assert_eq!(a, b);
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_distinct_options_get_distinct_principals() {
        let mut factory = PrincipalFactory::new();
        let a = factory.get_principal(&CompilerOptions::default());
        let with_base = CompilerOptions {
            base_url: Some(PathBuf::from("/repo/src")),
            ..CompilerOptions::default()
        };
        let b = factory.get_principal(&with_base);
        assert_ne!(a, b);
        assert_eq!(factory.len(), 2);
    }
}
