//! Invoking-user resolution (spec §4.2).
//!
//! When run under a privilege-escalation wrapper that sets `SUDO_USER`,
//! returns the original identity rather than the effective (privileged)
//! one.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct InvokingUser {
    pub username: String,
    pub home_dir: PathBuf,
    /// True if resolved via the `SUDO_USER` escalation marker, i.e. the
    /// process is currently running privileged relative to this identity.
    pub privileged: bool,
}

pub fn resolve() -> InvokingUser {
    if let Ok(sudo_user) = std::env::var("SUDO_USER") {
        if !sudo_user.is_empty() {
            let home = std::env::var("SUDO_HOME").unwrap_or_else(|_| format!("/home/{sudo_user}"));
            return InvokingUser {
                username: sudo_user,
                home_dir: PathBuf::from(home),
                privileged: true,
            };
        }
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "root".to_string());
    let home = std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(format!("/home/{username}")));

    InvokingUser {
        username,
        home_dir: home,
        privileged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn sudo_user_wins_over_current_user() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("SUDO_USER", "ubuntu");
        std::env::set_var("SUDO_HOME", "/home/ubuntu");
        let u = resolve();
        assert_eq!(u.username, "ubuntu");
        assert_eq!(u.home_dir, PathBuf::from("/home/ubuntu"));
        assert!(u.privileged);
        std::env::remove_var("SUDO_USER");
        std::env::remove_var("SUDO_HOME");
    }

    #[test]
    fn falls_back_to_current_user() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::remove_var("SUDO_USER");
        std::env::set_var("USER", "root");
        std::env::set_var("HOME", "/root");
        let u = resolve();
        assert_eq!(u.username, "root");
        assert!(!u.privileged);
    }
}
