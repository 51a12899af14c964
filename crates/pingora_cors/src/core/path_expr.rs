use regex::Regex;

use crate::error::RouteError;

/// Compiled form of a route path template such as `/users/{id}`.
///
/// The expression matches a path prefix and captures whatever is left over in
/// its final group, so `/users` matched against `/users/42/avatar` leaves
/// `/42/avatar`. The remainder is what lets a service hand the tail of a
/// request path down to its routes.
#[derive(Debug, Clone)]
pub struct PathExpression {
    template: String,
    matcher: Regex,
}

impl PathExpression {
    /// Compile a template. Supported segments are literals, `{name}` and a
    /// trailing catch-all `{*name}`.
    pub fn compile<S: Into<String>>(template: S) -> Result<Self, RouteError> {
        let template = template.into();
        let mut pattern = String::from("^");

        let mut segments = template.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = segments.next() {
            pattern.push('/');
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if name.starts_with('*') => {
                    if name.len() == 1 {
                        return Err(invalid(&template, "catch-all parameter needs a name"));
                    }
                    if segments.peek().is_some() {
                        return Err(invalid(&template, "catch-all must be the last segment"));
                    }
                    pattern.push_str("(.*)");
                }
                Some("") => return Err(invalid(&template, "empty parameter name")),
                Some(name) if name.contains(['{', '}']) => {
                    return Err(invalid(&template, "nested braces"));
                }
                Some(_) => pattern.push_str("([^/]+?)"),
                None if segment.contains(['{', '}']) => {
                    return Err(invalid(&template, "parameters must span a whole segment"));
                }
                None => pattern.push_str(&regex::escape(segment)),
            }
        }
        pattern.push_str("(/.*)?$");

        let matcher = Regex::new(&pattern).map_err(|source| RouteError::Regex {
            template: template.clone(),
            source,
        })?;
        Ok(Self { template, matcher })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.matcher.is_match(input)
    }

    /// Value of the final capture group, or `None` when `input` does not match.
    /// A group that did not participate in the match counts as empty.
    pub fn remainder<'a>(&self, input: &'a str) -> Option<&'a str> {
        let caps = self.matcher.captures(input)?;
        let last = caps.len() - 1;
        Some(caps.get(last).map_or("", |m| m.as_str()))
    }
}

fn invalid(template: &str, reason: &'static str) -> RouteError {
    RouteError::InvalidTemplate {
        template: template.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_template_leaves_tail() {
        let expr = PathExpression::compile("/users").unwrap();
        assert_eq!(expr.remainder("/users"), Some(""));
        assert_eq!(expr.remainder("/users/"), Some("/"));
        assert_eq!(expr.remainder("/users/42/avatar"), Some("/42/avatar"));
        assert_eq!(expr.remainder("/usersx"), None);
        assert_eq!(expr.remainder("/groups"), None);
    }

    #[test]
    fn empty_template_matches_any_rooted_path() {
        let expr = PathExpression::compile("").unwrap();
        assert_eq!(expr.remainder(""), Some(""));
        assert_eq!(expr.remainder("/users"), Some("/users"));
        assert!(!expr.is_match("users"));

        let slash = PathExpression::compile("/").unwrap();
        assert_eq!(slash.remainder("/users"), Some("/users"));
    }

    #[test]
    fn parameters_consume_one_segment() {
        let expr = PathExpression::compile("/users/{id}").unwrap();
        assert_eq!(expr.remainder("/users/42"), Some(""));
        assert_eq!(expr.remainder("/users/42/"), Some("/"));
        assert_eq!(expr.remainder("/users/42/posts"), Some("/posts"));
        assert_eq!(expr.remainder("/users"), None);
    }

    #[test]
    fn catch_all_swallows_rest() {
        let expr = PathExpression::compile("/files/{*path}").unwrap();
        assert_eq!(expr.remainder("/files/a/b/c.txt"), Some(""));
    }

    #[test]
    fn literals_are_escaped() {
        let expr = PathExpression::compile("/v1.0/items").unwrap();
        assert!(expr.is_match("/v1.0/items"));
        assert!(!expr.is_match("/v1x0/items"));
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["/users/{}", "/files/{*}", "/files/{*p}/x", "/u{id}", "/{a{b}}"] {
            assert!(
                matches!(
                    PathExpression::compile(bad),
                    Err(RouteError::InvalidTemplate { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }
}
