//! Current OS user identity.
//!
//! On Unix the identity comes from the account database, never from the
//! environment: a cron job, `su` shell or bare ssh session of the same account
//! must resolve to the same user as the desktop session.

/// Get the name of the user running this process.
///
/// The result scopes the instance identifier, so it must be the same for every
/// process the user starts.
///
/// # Platform Behavior
/// - **Linux/macOS**: passwd entry for `getuid()`, then `uid-{getuid()}`
/// - **Windows**: `%USERNAME%`, then `user`
pub fn current_user_name() -> String {
    #[cfg(unix)]
    {
        let uid = current_uid();
        passwd_name(uid).unwrap_or_else(|| format!("uid-{}", uid))
    }

    #[cfg(windows)]
    {
        std::env::var("USERNAME")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "user".to_string())
    }

    #[cfg(not(any(unix, windows)))]
    {
        "user".to_string()
    }
}

/// Real user id of this process.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn current_uid() -> u32 {
    // SAFETY: getuid() takes no arguments, cannot fail, and touches no memory
    // owned by Rust.
    unsafe { libc::getuid() }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn passwd_name(uid: u32) -> Option<String> {
    const MAX_BUF: usize = 1 << 16;
    let mut buf: Vec<libc::c_char> = vec![0; 1024];

    loop {
        // SAFETY: passwd is a plain C struct of pointers and integers, for
        // which all-zero is a valid value.
        let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        // SAFETY: every pointer refers to live, writable memory owned by this
        // frame, and buf.len() is the true capacity of buf.
        let rc = unsafe {
            libc::getpwuid_r(uid, &mut entry, buf.as_mut_ptr(), buf.len(), &mut result)
        };

        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() || entry.pw_name.is_null() {
            return None;
        }

        // SAFETY: on success pw_name points at a NUL-terminated string inside
        // buf, which outlives this borrow.
        let name = unsafe { std::ffi::CStr::from_ptr(entry.pw_name) };
        let name = name.to_string_lossy().into_owned();
        return (!name.is_empty()).then_some(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_user_name_is_stable() {
        let first = current_user_name();
        assert!(!first.is_empty());
        assert_eq!(first, current_user_name());
    }

    #[cfg(unix)]
    #[test]
    fn test_current_user_name_ignores_environment() {
        let before = current_user_name();
        let saved = std::env::var_os("USER");

        std::env::set_var("USER", "someone-else-entirely");
        let after = current_user_name();

        match saved {
            Some(value) => std::env::set_var("USER", value),
            None => std::env::remove_var("USER"),
        }
        assert_eq!(before, after);
        assert_ne!(after, "someone-else-entirely");
    }
}
