//! The command description handed to launchers

use async_process::Command as AsyncCommand;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;

/// Characters that never need quoting in a POSIX shell word
const SHELL_SAFE: &str = "-_./:@,+=%";

/// A program, its arguments, environment and stdin
///
/// Launchers take it by value. It is `Clone` so polling loops can issue the
/// same command again, and it renders to a single shell line for launchers
/// that run it remotely.
#[derive(Debug, Clone)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
    stdin: Option<Vec<u8>>,
}

impl Command {
    /// Run `program` with no arguments
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: BTreeMap::new(),
            stdin: None,
        }
    }

    /// Run `script` through `sh -c`
    pub fn shell(script: impl AsRef<str>) -> Self {
        let mut cmd = Self::new("sh");
        cmd.arg("-c").arg(script.as_ref());
        cmd
    }

    /// Append one argument
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append arguments in order
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Write `bytes` to the process' stdin, then close it
    pub fn stdin_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// The program
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments, in order
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Environment overrides
    pub fn get_envs(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Bytes destined for stdin
    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Move the stdin bytes out, so the rest can be spawned without them
    pub fn take_stdin(&mut self) -> Option<Vec<u8>> {
        self.stdin.take()
    }

    /// One shell line running this command, with env assignments in front
    pub fn to_shell_string(&self) -> String {
        let env = self.env.iter().map(|(key, val)| {
            format!(
                "{}={}",
                key.to_string_lossy(),
                shell_escape(&val.to_string_lossy())
            )
        });
        let words = std::iter::once(self.program.to_string_lossy().into_owned()).chain(
            self.args
                .iter()
                .map(|arg| shell_escape(&arg.to_string_lossy())),
        );
        env.chain(words).collect::<Vec<_>>().join(" ")
    }

    /// Process ready to spawn on this machine; stdin is the caller's concern
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

/// Quote `s` as one POSIX shell word
pub fn shell_escape(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SHELL_SAFE.contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
