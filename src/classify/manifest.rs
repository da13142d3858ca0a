use crate::config::FilterConfig;

/// Qualification predicate over a dependency manifest
///
/// A manifest qualifies when it contains every required marker and at least one of the
/// alternative markers. Matching is a case-insensitive substring test, so `PYTEST==7.0`
/// satisfies the `pytest` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFilter {
    required: Vec<String>,
    any_of: Vec<String>,
}

impl ManifestFilter {
    pub fn new<I, J, S, T>(required: I, any_of: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            required: normalize(required),
            any_of: normalize(any_of),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(&config.required_markers, &config.any_markers)
    }

    /// Applies the predicate to decoded manifest text
    pub fn qualifies(&self, manifest: &str) -> bool {
        let haystack = manifest.to_lowercase();
        self.required.iter().all(|m| haystack.contains(m.as_str()))
            && self.any_of.iter().any(|m| haystack.contains(m.as_str()))
    }
}

impl Default for ManifestFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

fn normalize<I, S>(markers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    markers
        .into_iter()
        .map(|m| m.as_ref().trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifies_case_insensitive() {
        let filter = ManifestFilter::default();
        assert!(filter.qualifies("PYTEST==7.0\nfastapi>=0.1\n"));
        assert!(filter.qualifies("pytest\nFast-API\n"));
    }

    #[test]
    fn test_web_framework_alone_does_not_qualify() {
        let filter = ManifestFilter::default();
        assert!(!filter.qualifies("fastapi\n"));
        assert!(!filter.qualifies("fastapi==0.100\nuvicorn\n"));
    }

    #[test]
    fn test_test_framework_alone_does_not_qualify() {
        let filter = ManifestFilter::default();
        assert!(!filter.qualifies("pytest==7.0\nflask\n"));
        assert!(!filter.qualifies(""));
    }

    #[test]
    fn test_substring_matching() {
        // pytest-asyncio contains pytest; this is the documented substring rule
        let filter = ManifestFilter::default();
        assert!(filter.qualifies("pytest-asyncio\nfastapi-users\n"));
    }

    #[test]
    fn test_custom_markers() {
        let filter = ManifestFilter::new(["Django", " "], ["pytest-django", "unittest"]);
        assert!(filter.qualifies("django==4.2\npytest-django\n"));
        assert!(!filter.qualifies("django==4.2\n"));
    }
}
