mod loader;

pub use loader::{Config, ResolvedWorkspaceConfig, WorkspaceConfig};

/// Strip the production marker (`!` suffix) from every pattern.
pub fn all_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.strip_suffix('!').unwrap_or(p).to_string())
        .collect()
}

/// Only the production-scoped patterns (`!` suffix), marker stripped.
pub fn production_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .filter_map(|p| p.strip_suffix('!').map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_markers() {
        let patterns = vec!["index.ts!".to_string(), "scripts/*.ts".to_string()];
        assert_eq!(all_patterns(&patterns), vec!["index.ts", "scripts/*.ts"]);
        assert_eq!(production_patterns(&patterns), vec!["index.ts"]);
    }
}
