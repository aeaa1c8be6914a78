//! Environment variable utilities
//!
//! Every runtime knob of xmig can be overridden from the environment
//! (`XMIG_*`). These helpers parse a variable or fall back to a default;
//! a malformed value is treated like an unset one.
//!
//! ```ignore
//! use xmig_core::env::{env_get, env_get_bool, env_get_size};
//!
//! let frames: usize = env_get("XMIG_MAX_FRAMES", 256);
//! let stack = env_get_size("XMIG_STACK_SIZE", 1024 * 1024); // accepts "512K", "2M"
//! let debug = env_get_bool("XMIG_DEBUG", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` if it is set and well-formed
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean variable
///
/// "1", "true", "yes" and "on" (any case) are true, anything else that is
/// set is false. Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Byte size with an optional binary suffix (`K`, `M`, `G`, case-insensitive)
#[inline]
pub fn env_get_size(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_size(&v))
        .unwrap_or(default)
}

/// String variable with a default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Whether `key` is set at all
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

/// Parse "4096", "64K", "1m", "2G" into bytes
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    let (digits, shift) = match s.as_bytes().last()? {
        b'k' | b'K' => (&s[..s.len() - 1], 10),
        b'm' | b'M' => (&s[..s.len() - 1], 20),
        b'g' | b'G' => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let base: usize = digits.trim().parse().ok()?;
    base.checked_mul(1usize << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNSET: &str = "__XMIG_TEST_UNSET_VAR__";

    #[test]
    fn test_unset_falls_back() {
        assert_eq!(env_get::<usize>(UNSET, 7), 7);
        assert_eq!(env_get_opt::<u64>(UNSET), None);
        assert!(env_get_bool(UNSET, true));
        assert_eq!(env_get_size(UNSET, 4096), 4096);
        assert_eq!(env_get_str(UNSET, "x"), "x");
        assert!(!env_is_set(UNSET));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("64K"), Some(64 * 1024));
        assert_eq!(parse_size(" 2m "), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("1G"), Some(1 << 30));
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("12Q"), None);
    }

    #[test]
    fn test_set_values() {
        std::env::set_var("__XMIG_TEST_FRAMES__", " 32 ");
        assert_eq!(env_get::<usize>("__XMIG_TEST_FRAMES__", 0), 32);
        std::env::set_var("__XMIG_TEST_FRAMES__", "many");
        assert_eq!(env_get::<usize>("__XMIG_TEST_FRAMES__", 9), 9);
        std::env::remove_var("__XMIG_TEST_FRAMES__");

        std::env::set_var("__XMIG_TEST_SIZE__", "128k");
        assert_eq!(env_get_size("__XMIG_TEST_SIZE__", 0), 128 * 1024);
        std::env::remove_var("__XMIG_TEST_SIZE__");
    }

    #[test]
    fn test_bool_spellings() {
        let key = "__XMIG_TEST_BOOL__";
        for v in ["1", "true", "YES", "On"] {
            std::env::set_var(key, v);
            assert!(env_get_bool(key, false), "{v}");
        }
        for v in ["0", "false", "off", "maybe"] {
            std::env::set_var(key, v);
            assert!(!env_get_bool(key, true), "{v}");
        }
        std::env::remove_var(key);
    }
}
