//! Layered lookup of individual settings outside of clap.

/// Resolve a setting for library users that do not parse a command line
///
/// Precedence: `explicit`, then the environment variable `env_key`, then `None`. Empty
/// values count as unset at every layer.
pub fn resolve_setting(explicit: Option<&str>, env_key: &str) -> Option<String> {
    resolve_setting_with(explicit, env_key, |key| std::env::var(key).ok())
}

/// [`resolve_setting`] with a custom environment lookup
pub fn resolve_setting_with(
    explicit: Option<&str>,
    env_key: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    explicit
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .or_else(|| env(env_key).filter(|v| !v.is_empty()))
}
