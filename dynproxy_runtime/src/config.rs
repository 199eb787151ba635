//! Runtime configuration for proxy factories.

use crate::inline_cache::MAX_RECEIVER_TYPES;

/// Configuration shared by every site of a proxy factory.
///
/// # Example
///
/// ```ignore
/// use dynproxy_runtime::ProxyConfig;
///
/// let config = ProxyConfig {
///     inline_cache_limit: 4,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Number of distinct receiver classes an inline cache specializes for
    /// before it goes megamorphic.
    ///
    /// A limit of 0 disables specialization: every call uses the endpoint.
    ///
    /// Default: 8
    pub inline_cache_limit: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            inline_cache_limit: MAX_RECEIVER_TYPES,
        }
    }
}

impl ProxyConfig {
    /// Environment variable overriding `inline_cache_limit`.
    pub const ENV_INLINE_CACHE_LIMIT: &'static str = "DYNPROXY_INLINE_CACHE_LIMIT";

    /// Default configuration with overrides from the environment.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_overrides(std::env::var(Self::ENV_INLINE_CACHE_LIMIT).ok())
    }

    /// Default configuration with a raw `inline_cache_limit` override applied.
    fn from_overrides(inline_cache_limit: Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(limit) = inline_cache_limit.as_deref().and_then(parse_usize) {
            config.inline_cache_limit = limit;
        }
        config
    }
}

#[inline]
fn parse_usize(raw: &str) -> Option<usize> {
    raw.trim().parse().ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        assert_eq!(ProxyConfig::default().inline_cache_limit, 8);
    }

    #[test]
    fn test_override_sets_limit() {
        let config = ProxyConfig::from_overrides(Some("3".to_string()));
        assert_eq!(config.inline_cache_limit, 3);
        let config = ProxyConfig::from_overrides(Some(" 0\n".to_string()));
        assert_eq!(config.inline_cache_limit, 0);
    }

    #[test]
    fn test_bad_override_keeps_default() {
        assert_eq!(ProxyConfig::from_overrides(None), ProxyConfig::default());
        for raw in ["", "eight", "-1", "2.5"] {
            assert_eq!(
                ProxyConfig::from_overrides(Some(raw.to_string())).inline_cache_limit,
                MAX_RECEIVER_TYPES
            );
        }
    }
}
