/// Builds a lock key by concatenating a prefix and a key with `:` as a separator.
///
/// The resulting format is `<prefix>:<key>`.
///
/// # Examples
///
/// ```rust
/// let key = relock::build_lock_key_with_prefix("stock", "1001");
///
/// assert_eq!("stock:1001", key);
/// ```
#[inline]
pub fn build_lock_key_with_prefix(prefix: impl AsRef<str>, key: impl AsRef<str>) -> String {
    let prefix = prefix.as_ref();
    let key = key.as_ref();

    format!("{prefix}:{key}")
}

/// Builds a lock key by joining multiple parts with `:` as a separator.
///
/// The resulting format is `<key_part_1>:<key_part_2>:...`.
///
/// # Examples
///
/// ```rust
/// let key = relock::build_lock_key_from_parts(["order", "1001"]);
///
/// assert_eq!("order:1001", key);
/// ```
pub fn build_lock_key_from_parts<S>(key_parts: impl IntoIterator<Item = S>) -> String
where
    S: AsRef<str>, {
    let mut s = String::new();

    for (i, part) in key_parts.into_iter().enumerate() {
        if i > 0 {
            s.push(':');
        }

        s.push_str(part.as_ref());
    }

    s
}

/// Builds a lock key by combining a prefix with multiple parts, using `:` as a separator.
///
/// The resulting format is `<prefix>:<key_part_1>:<key_part_2>:...`.
///
/// # Examples
///
/// ```rust
/// let key = relock::build_lock_key_from_parts_with_prefix("lock", ["stock", "1001"]);
///
/// assert_eq!("lock:stock:1001", key);
/// ```
pub fn build_lock_key_from_parts_with_prefix<S>(
    prefix: impl AsRef<str>,
    key_parts: impl IntoIterator<Item = S>,
) -> String
where
    S: AsRef<str>, {
    let mut s = String::from(prefix.as_ref());

    for part in key_parts {
        s.push(':');
        s.push_str(part.as_ref());
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_lock_key_with_prefix() {
        assert_eq!("stock:1001:a", build_lock_key_with_prefix("stock", "1001:a"))
    }

    #[test]
    fn test_build_lock_key_from_parts() {
        assert_eq!("stock:1001:a", build_lock_key_from_parts(["stock", "1001", "a"]));
        assert_eq!("", build_lock_key_from_parts(Vec::<&str>::new()));
    }

    #[test]
    fn test_build_lock_key_from_parts_with_prefix() {
        assert_eq!("stock:1001:a", build_lock_key_from_parts_with_prefix("stock", ["1001", "a"]));
        assert_eq!("stock", build_lock_key_from_parts_with_prefix("stock", Vec::<&str>::new()));
    }
}
