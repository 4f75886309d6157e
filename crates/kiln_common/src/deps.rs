//! Splitting of dependency expressions such as `"zlib (>= 1.2) virtual/libc"`.

/// One entry of a dependency expression.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DepSpec {
    /// The dependency name.
    pub name: String,
    /// The version constraint, without its parentheses (e.g. `">= 1.2"`).
    pub constraint: Option<String>,
}

/// Splits a whitespace-separated dependency expression into names and
/// optional version constraints.
///
/// A parenthesised group directly following a name is that name's
/// constraint and may span several tokens. An unclosed group consumes the
/// rest of the expression; a group with no preceding name is dropped.
pub fn explode_dep_versions(expr: &str) -> Vec<DepSpec> {
    let mut out: Vec<DepSpec> = Vec::new();
    let mut group: Option<Vec<&str>> = None;

    for token in expr.split_whitespace() {
        if let Some(parts) = group.as_mut() {
            parts.push(token);
            if token.ends_with(')') {
                attach_constraint(&mut out, parts);
                group = None;
            }
            continue;
        }
        if token.starts_with('(') {
            if token.ends_with(')') {
                attach_constraint(&mut out, &[token]);
            } else {
                group = Some(vec![token]);
            }
            continue;
        }
        out.push(DepSpec {
            name: token.to_string(),
            constraint: None,
        });
    }

    if let Some(parts) = group {
        attach_constraint(&mut out, &parts);
    }
    out
}

/// Splits a dependency expression and keeps only the names.
pub fn explode_deps(expr: &str) -> Vec<String> {
    explode_dep_versions(expr)
        .into_iter()
        .map(|d| d.name)
        .collect()
}

fn attach_constraint(out: &mut [DepSpec], parts: &[&str]) {
    let joined = parts.join(" ");
    let inner = joined
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();
    if inner.is_empty() {
        return;
    }
    if let Some(last) = out.last_mut() {
        if last.constraint.is_none() {
            last.constraint = Some(inner.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names() {
        assert_eq!(explode_deps("zlib  openssl\tvirtual/libc"), vec![
            "zlib",
            "openssl",
            "virtual/libc"
        ]);
    }

    #[test]
    fn empty_expression() {
        assert!(explode_deps("").is_empty());
        assert!(explode_deps("   ").is_empty());
    }

    #[test]
    fn constraints_are_attached() {
        let deps = explode_dep_versions("zlib (>= 1.2.3) openssl (=3.0) bash");
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].constraint.as_deref(), Some(">= 1.2.3"));
        assert_eq!(deps[1].constraint.as_deref(), Some("=3.0"));
        assert_eq!(deps[2].name, "bash");
        assert!(deps[2].constraint.is_none());
    }

    #[test]
    fn constraints_are_dropped_by_explode_deps() {
        assert_eq!(explode_deps("a (>= 1) b (< 2) c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn unclosed_group_swallows_rest() {
        let deps = explode_dep_versions("a (>= 1 b c");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].constraint.as_deref(), Some(">= 1 b c"));
    }

    #[test]
    fn leading_group_is_dropped() {
        let deps = explode_dep_versions("(>= 1) a");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "a");
        assert!(deps[0].constraint.is_none());
    }
}
