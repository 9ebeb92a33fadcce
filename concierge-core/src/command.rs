//! Immutable description of a subprocess invocation with optional privilege
//! drop (spec §4.1).

/// A subprocess invocation. `user`/`group` empty means "run as the current
/// process identity".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub executable: String,
    pub args: Vec<String>,
    pub user: String,
    pub group: String,
}

impl Command {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Command {
            executable: executable.into(),
            args,
            user: String::new(),
            group: String::new(),
        }
    }

    pub fn with_privilege_drop(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.user = user.into();
        self.group = group.into();
        self
    }

    /// Resolve `executable` against PATH; if unresolved, keep the
    /// unqualified name so the subprocess layer fails visibly instead of
    /// silently substituting something.
    fn resolved_executable(&self) -> String {
        which::which(&self.executable)
            .ok()
            .and_then(|p| p.to_str().map(str::to_string))
            .unwrap_or_else(|| self.executable.clone())
    }

    /// The literal argv the subprocess layer spawns, including an optional
    /// leading `sudo [-u user] [-g group]` privilege-drop wrapper.
    pub fn full_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 5);

        if (!self.user.is_empty() || !self.group.is_empty()) && self.user != "root" {
            argv.push("sudo".to_string());
            if !self.user.is_empty() {
                argv.push("-u".to_string());
                argv.push(self.user.clone());
            }
            if !self.group.is_empty() {
                argv.push("-g".to_string());
                argv.push(self.group.clone());
            }
        }

        argv.push(self.resolved_executable());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// `full_argv`, shell-quoted so it round-trips through a shell.
    pub fn command_string(&self) -> String {
        self.full_argv()
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Minimal POSIX shell quoting: wraps in single quotes, escaping embedded
/// single quotes as `'\''`. Bare words with no shell-meaningful characters
/// are left unquoted for readability in trace output.
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=@".contains(c)) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_user_never_wraps_with_sudo() {
        let cmd = Command::new("apt-get", vec!["update".into()]).with_privilege_drop("root", "");
        assert_ne!(cmd.full_argv()[0], "sudo");
    }

    #[test]
    fn non_root_user_wraps_with_sudo_and_dash_u() {
        let cmd = Command::new("juju", vec!["bootstrap".into()]).with_privilege_drop("ubuntu", "lxd");
        let argv = cmd.full_argv();
        assert_eq!(argv[0], "sudo");
        assert!(argv.windows(2).any(|w| w == ["-u", "ubuntu"]));
        assert!(argv.windows(2).any(|w| w == ["-g", "lxd"]));
    }

    #[test]
    fn empty_group_omits_dash_g() {
        let cmd = Command::new("juju", vec![]).with_privilege_drop("ubuntu", "");
        assert!(!cmd.full_argv().contains(&"-g".to_string()));
    }

    #[test]
    fn no_user_no_sudo() {
        let cmd = Command::new("echo", vec!["hi".into()]);
        assert_eq!(cmd.full_argv()[0], "echo");
    }

    #[test]
    fn group_alone_still_wraps_with_sudo() {
        let cmd = Command::new("juju", vec![]).with_privilege_drop("", "lxd");
        let argv = cmd.full_argv();
        assert_eq!(argv[0], "sudo");
        assert!(!argv.contains(&"-u".to_string()));
        assert!(argv.windows(2).any(|w| w == ["-g", "lxd"]));
    }

    #[test]
    fn command_string_quotes_spaces() {
        let cmd = Command::new("echo", vec!["hello world".into()]);
        assert_eq!(cmd.command_string(), "echo 'hello world'");
    }
}
