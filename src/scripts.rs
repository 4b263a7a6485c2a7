use once_cell::sync::Lazy;
use redis::Script;

pub(crate) static SCRIPT_COMPARE_AND_EXTEND: Lazy<Script> = Lazy::new(|| {
    // KEYS[1] = the lock key to renew
    // ARGV[1] = token of the lock owner
    // ARGV[2] = new TTL (milliseconds)
    Script::new(
        r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("PEXPIRE", KEYS[1], ARGV[2])
            else
                return 0
            end
        "#,
    )
});

pub(crate) static SCRIPT_COMPARE_AND_DELETE: Lazy<Script> = Lazy::new(|| {
    // KEYS[1] = the lock key to release
    // ARGV[1] = token of the lock owner
    Script::new(
        r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#,
    )
});
