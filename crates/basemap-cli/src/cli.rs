use clap::Parser;

/// Read an environment variable, parsing it to the desired type.
///
/// Unset variables and values that fail to parse both yield `None`.
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Parse the process command line arguments
pub fn parse_args<T: Parser>() -> Result<T, clap::Error> {
    T::try_parse()
}
