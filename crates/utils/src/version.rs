use std::sync::LazyLock;

/// Defines the application version.
///
/// Git details are absent when the crate is built outside a repository.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}-{}{}",
        env!("IMAGE_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        if option_env!("VERGEN_GIT_DIRTY") == Some("true") {
            "-dirty"
        } else {
            ""
        }
    )
});
