use crate::models::EnrichmentResult;

pub const FALLBACK_CATEGORY: &str = "其他";

/// The user-supplied fields an enrichment result is merged against.
#[derive(Debug, Clone)]
pub struct UserFields {
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MergedFields {
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// The single place the AI-result/user-data merge happens, shared by the
/// cache-hit path and the worker success path so they can never drift apart.
pub fn merge(user: &UserFields, ai: &EnrichmentResult) -> MergedFields {
    let name = ai
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| user.name.clone());

    let category = ai
        .category
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| {
            if user.category.trim().is_empty() {
                None
            } else {
                Some(user.category.clone())
            }
        })
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

    let tags = distinct_preserve_order(user.tags.clone(), ai.tags.clone());

    MergedFields {
        name,
        category,
        tags,
    }
}

/// Union of two tag lists, first-occurrence order preserved, no duplicates.
pub fn distinct_preserve_order(a: Vec<String>, b: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in a.into_iter().chain(b.into_iter()) {
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_name_wins_when_present() {
        let user = UserFields {
            name: "user-name".into(),
            category: "misc".into(),
            tags: vec![],
        };
        let ai = EnrichmentResult {
            name: Some("ai-name".into()),
            ..Default::default()
        };
        assert_eq!(merge(&user, &ai).name, "ai-name");
    }

    #[test]
    fn user_name_kept_when_ai_name_absent() {
        let user = UserFields {
            name: "user-name".into(),
            category: "misc".into(),
            tags: vec![],
        };
        let ai = EnrichmentResult::default();
        assert_eq!(merge(&user, &ai).name, "user-name");
    }

    #[test]
    fn category_falls_back_to_marker_when_both_empty() {
        let user = UserFields {
            name: "n".into(),
            category: String::new(),
            tags: vec![],
        };
        let ai = EnrichmentResult::default();
        assert_eq!(merge(&user, &ai).category, FALLBACK_CATEGORY);
    }

    #[test]
    fn tags_are_unioned_without_duplicates() {
        let a = vec!["cat".to_string(), "cute".to_string()];
        let b = vec!["cute".to_string(), "funny".to_string()];
        assert_eq!(
            distinct_preserve_order(a, b),
            vec!["cat".to_string(), "cute".to_string(), "funny".to_string()]
        );
    }
}
